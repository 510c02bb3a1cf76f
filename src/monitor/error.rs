//! Monitor error types.

use crate::broker::BrokerError;
use crate::storage::StorageError;

/// Monitor error type.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("monitor is already running")]
    AlreadyRunning,
    #[error("trading is blocked: {0}")]
    TradingBlocked(String),
    #[error("daily order limit reached: {0} orders placed")]
    OrderBudgetExhausted(u32),
    #[error("config error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}
