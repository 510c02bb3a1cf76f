//! Monitor construction parameters.

use std::sync::Arc;

use crate::broker::BrokerGateway;
use crate::config::Config;
use crate::storage::StateStore;

/// Everything the monitor needs that is not in the YAML config:
/// the already-constructed broker gateway and state store, plus
/// build metadata for logs and notifications.
pub struct MonitorConfig {
    pub app_config: Config,
    pub version: String,
    pub broker: Arc<dyn BrokerGateway>,
    pub store: Arc<dyn StateStore>,
}
