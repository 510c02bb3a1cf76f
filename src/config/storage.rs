//! Storage configuration.

use serde::Deserialize;

/// Risk state persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file (default: "riskguard.db").
    pub path: Option<String>,
}
