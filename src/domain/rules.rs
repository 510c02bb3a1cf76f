//! Pure rule evaluation: given the current state, the clock, and the most
//! recent balance, decide whether trading is permitted and why not.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use crate::config::{ConfigError, RiskConfig};
use crate::domain::RiskState;

/// Parsed, ready-to-evaluate risk limits.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Start of the trading window (inclusive).
    pub trading_start: NaiveTime,
    /// End of the trading window (inclusive).
    pub trading_end: NaiveTime,
    /// Fraction of the morning balance allowed to be lost.
    pub loss_limit_fraction: Decimal,
    /// Maximum orders per day.
    pub max_orders_per_day: u32,
}

impl RiskLimits {
    pub fn from_config(risk: &RiskConfig) -> Result<Self, ConfigError> {
        let loss_limit_fraction = Decimal::from_str(&risk.loss_limit_fraction).map_err(|_| {
            ConfigError::Validation(format!(
                "risk.loss_limit_fraction is not a valid decimal: {}",
                risk.loss_limit_fraction
            ))
        })?;

        Ok(Self {
            trading_start: risk.trading_start,
            trading_end: risk.trading_end,
            loss_limit_fraction,
            max_orders_per_day: risk.max_orders_per_day,
        })
    }

    /// True when the time of day is inside the trading window (inclusive
    /// on both ends).
    pub fn in_window(&self, now: NaiveTime) -> bool {
        self.trading_start <= now && now <= self.trading_end
    }

    /// Where the time of day sits relative to the trading window.
    pub fn window_position(&self, now: NaiveTime) -> WindowPosition {
        if now < self.trading_start {
            WindowPosition::BeforeOpen
        } else if now > self.trading_end {
            WindowPosition::AfterClose
        } else {
            WindowPosition::Open
        }
    }
}

/// Position of a time of day relative to the trading window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    BeforeOpen,
    Open,
    AfterClose,
}

/// A single violated rule, carrying enough detail for a useful message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The clock is outside the configured trading window.
    OutsideTradingHours { now: NaiveTime },
    /// Realized loss reached the frozen daily cap.
    LossLimit { loss: Decimal, limit: Decimal },
    /// The daily order budget is used up.
    OrderLimit { count: u32, max: u32 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::OutsideTradingHours { now } => {
                write!(f, "outside trading hours ({})", now.format("%H:%M"))
            }
            Violation::LossLimit { loss, limit } => {
                write!(f, "daily loss limit breached: lost {} (cap {})", loss, limit)
            }
            Violation::OrderLimit { count, max } => {
                write!(f, "daily order limit reached: {}/{} orders", count, max)
            }
        }
    }
}

/// Result of one rule evaluation: the set of violated rules, possibly empty.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub violations: Vec<Violation>,
}

impl Evaluation {
    /// True when no rule fired.
    pub fn all_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// The reason to record on the blocked state: the first violation,
    /// rendered for humans.
    pub fn primary_reason(&self) -> Option<String> {
        self.violations.first().map(|v| v.to_string())
    }
}

/// Evaluates every rule against the given state and observation.
///
/// Rules are independent; trading-hours is listed first by convention since
/// the monitor short-circuits reference capture on it. The loss rule only
/// applies once the morning balance has been captured; a balance gain clamps
/// the loss at zero.
pub fn evaluate(
    state: &RiskState,
    limits: &RiskLimits,
    now: NaiveTime,
    current_balance: Option<Decimal>,
) -> Evaluation {
    let mut violations = Vec::new();

    if !limits.in_window(now) {
        violations.push(Violation::OutsideTradingHours { now });
    }

    if let (Some(morning), Some(limit)) = (state.morning_balance, state.max_loss_amount) {
        if let Some(current) = current_balance.or(state.current_balance) {
            let loss = (morning - current).max(Decimal::ZERO);
            if loss >= limit {
                violations.push(Violation::LossLimit { loss, limit });
            }
        }
    }

    if state.order_count >= limits.max_orders_per_day {
        violations.push(Violation::OrderLimit {
            count: state.order_count,
            max: limits.max_orders_per_day,
        });
    }

    Evaluation { violations }
}
