//! Brokerage API configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Settings for the brokerage connection.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Whether the live broker connection should be used.
    #[serde(default)]
    pub enabled: bool,
    /// Override for the API base URL (defaults to the production endpoint).
    pub base_url: Option<String>,
    /// Client id (loaded from DHAN_CLIENT_ID env var).
    #[serde(skip)]
    pub client_id: String,
    /// Access token (loaded from DHAN_ACCESS_TOKEN env var).
    #[serde(skip)]
    pub access_token: String,
    /// Per-request timeout (default: 10s).
    #[serde(default, with = "duration")]
    pub timeout: Duration,
}
