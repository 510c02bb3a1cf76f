//! Risk limit configuration.

use chrono::NaiveTime;
use serde::Deserialize;
use std::time::Duration;

use super::{duration, time_of_day};

/// Default interval between monitor ticks.
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Default sleep after a failed tick before resuming the normal interval.
const DEFAULT_ERROR_COOLDOWN: Duration = Duration::from_secs(30);

/// Risk limit settings: the rules the monitor enforces.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Start of the trading window, e.g. "09:25".
    #[serde(with = "time_of_day")]
    pub trading_start: NaiveTime,
    /// End of the trading window, e.g. "15:00".
    #[serde(with = "time_of_day")]
    pub trading_end: NaiveTime,
    /// Fraction of the morning balance allowed to be lost before the
    /// emergency stop fires, as a decimal string (e.g. "0.20" for 20%).
    pub loss_limit_fraction: String,
    /// Maximum number of orders allowed per day.
    pub max_orders_per_day: u32,
    /// Interval between monitor ticks (default: 10s).
    #[serde(default, with = "duration")]
    pub check_interval: Duration,
    /// Sleep after a failed tick (default: 30s).
    #[serde(default, with = "duration")]
    pub error_cooldown: Duration,
    /// What to do when the persisted state is unreadable.
    #[serde(default)]
    pub on_corrupt_state: CorruptStatePolicy,
}

impl RiskConfig {
    pub fn check_interval(&self) -> Duration {
        if self.check_interval.is_zero() {
            DEFAULT_CHECK_INTERVAL
        } else {
            self.check_interval
        }
    }

    pub fn error_cooldown(&self) -> Duration {
        if self.error_cooldown.is_zero() {
            DEFAULT_ERROR_COOLDOWN
        } else {
            self.error_cooldown
        }
    }
}

/// Policy for reinitializing after an unreadable persisted record.
///
/// `Allow` favors availability: the day restarts with trading permitted,
/// which is what the original deployment did. `Block` favors safety: a
/// restart over corrupt state comes up already halted and needs a manual
/// reset before trading resumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptStatePolicy {
    #[default]
    Allow,
    Block,
}
