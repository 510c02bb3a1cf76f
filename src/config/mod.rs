//! Configuration loading and validation for the risk guardrail.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for sensitive credentials.

mod app;
mod broker;
mod duration;
mod error;
mod notification;
mod risk;
mod storage;
mod time_of_day;

pub use app::AppConfig;
pub use broker::BrokerConfig;
pub use error::ConfigError;
pub use notification::{NotificationConfig, TelegramConfig};
pub use risk::{CorruptStatePolicy, RiskConfig};
pub use storage::StorageConfig;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::{env, fs};

/// Root configuration structure for the guardrail.
///
/// Required sections: app, broker, risk.
/// Optional sections: storage, notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Brokerage API connection settings.
    pub broker: BrokerConfig,
    /// Risk limits: trading window, loss cap, order budget, tick timing.
    pub risk: RiskConfig,
    /// Risk state persistence (optional).
    pub storage: Option<StorageConfig>,
    /// Alert channels like Telegram (optional).
    pub notification: Option<NotificationConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// - `DHAN_CLIENT_ID`, `DHAN_ACCESS_TOKEN`
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `TELEGRAM_ERROR_CHAT_ID`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore error if not found)
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        if self.broker.enabled {
            self.broker.client_id = env::var("DHAN_CLIENT_ID").unwrap_or_default();
            self.broker.access_token = env::var("DHAN_ACCESS_TOKEN").unwrap_or_default();
        }

        if let Some(ref mut notification) = self.notification {
            if let Some(ref mut telegram) = notification.telegram {
                if telegram.enabled {
                    telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
                    telegram.chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
                    telegram.error_chat_id = env::var("TELEGRAM_ERROR_CHAT_ID").unwrap_or_default();
                }
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.risk.trading_start >= self.risk.trading_end {
            return Err(ConfigError::Validation(
                "risk.trading_start must be before risk.trading_end".into(),
            ));
        }

        match Decimal::from_str(&self.risk.loss_limit_fraction) {
            Ok(f) if f > Decimal::ZERO && f <= Decimal::ONE => {}
            Ok(_) => {
                return Err(ConfigError::Validation(
                    "risk.loss_limit_fraction must be in (0, 1]".into(),
                ));
            }
            Err(_) => {
                return Err(ConfigError::Validation(format!(
                    "risk.loss_limit_fraction is not a valid decimal: {}",
                    self.risk.loss_limit_fraction
                )));
            }
        }

        if self.risk.max_orders_per_day == 0 {
            return Err(ConfigError::Validation(
                "risk.max_orders_per_day must be positive".into(),
            ));
        }

        // Only require credentials in production/staging
        let is_production = self.app.env != "development";
        if self.broker.enabled
            && is_production
            && (self.broker.client_id.is_empty() || self.broker.access_token.is_empty())
        {
            return Err(ConfigError::Validation(
                "broker: API credentials not found (set DHAN_CLIENT_ID and DHAN_ACCESS_TOKEN env vars)"
                    .into(),
            ));
        }

        Ok(())
    }
}
