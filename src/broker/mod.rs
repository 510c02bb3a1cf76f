//! Brokerage account gateway: balance and position queries, order
//! cancellation, and market exit orders.
//!
//! The gateway is deliberately retry-free: every call is a single
//! timeout-bounded request, and the monitor treats a failure as "skip this
//! tick and try again on the next one".

mod client;
mod dhan;
pub mod parse;

pub use client::{ApiError, Client, ClientError};
pub use dhan::DhanBroker;

use crate::domain::Position;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Broker gateway errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Credential rejected by the broker (401/403).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Connection-level failure (timeout, DNS, refused).
    #[error("connection error: {0}")]
    Connection(String),

    /// The broker accepted the request but answered with an error.
    #[error("API error: {0}")]
    Api(String),

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Parse(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// BrokerGateway is the narrow surface the monitor needs from a brokerage
/// account. All methods are best-effort and single-shot.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Fetches the available account balance.
    /// Returns None on any failure (network, parse, auth) so the caller can
    /// simply skip the tick; the failure itself is logged here.
    async fn get_available_balance(&self) -> Option<Decimal>;

    /// Fetches all open positions, flat ones included.
    async fn get_open_positions(&self) -> Result<Vec<Position>>;

    /// Cancels every pending order. Best-effort sweep: per-order failures
    /// are logged and the sweep continues.
    /// Returns true when every cancel went through (or none were pending).
    async fn cancel_all_pending_orders(&self) -> bool;

    /// Submits a market order on the opposite side of the position, sized
    /// to flatten it. Returns true when the broker accepted the order.
    async fn place_market_exit_order(&self, position: &Position) -> bool;

    /// Unique identifier of this broker (e.g. "dhan").
    fn name(&self) -> &str;
}
