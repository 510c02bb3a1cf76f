//! Persistent state store: one durable record of the day's risk state.

mod sqlite;

pub use sqlite::{SqliteStore, SqliteStoreConfig};

use crate::domain::RiskState;
use async_trait::async_trait;

/// StateStore persists the single per-day risk state record.
///
/// `load` is deliberately infallible: a missing record yields a fresh
/// default for today, and an unreadable record yields a default shaped by
/// the store's corrupt-state policy. The monitor must always get a record
/// it can act on.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the last-saved record, or a safe default (see above).
    async fn load(&self) -> RiskState;

    /// Persists the full record as one atomic replace. A concurrent `load`
    /// sees either the old record or the new one, never a mix.
    async fn save(&self, state: &RiskState) -> Result<(), StorageError>;

    /// Closes the storage connection.
    async fn close(&self) -> Result<(), StorageError>;
}

/// StorageError represents errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
