//! Monitor phase derivation.
//!
//! The phase is not stored anywhere. It is derived on demand from the
//! persisted risk state, the configured limits and the current local time,
//! so status reports and the restart path agree by construction.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::{RiskLimits, RiskState, WindowPosition};

/// Where the monitor currently stands within the trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    /// Persisted state belongs to an earlier date; the next tick resets it.
    UninitializedDay,
    /// Today's state exists but the trading window has not opened yet.
    AwaitingTradingWindow,
    /// Window is open but no reference balance has been captured yet.
    AwaitingReferenceBalance,
    /// Reference captured, rules evaluated every tick.
    ActiveMonitoring,
    /// A rule fired; trading stays blocked until the day rolls over.
    Blocked,
}

impl std::fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MonitorPhase::UninitializedDay => "uninitialized day",
            MonitorPhase::AwaitingTradingWindow => "awaiting trading window",
            MonitorPhase::AwaitingReferenceBalance => "awaiting reference balance",
            MonitorPhase::ActiveMonitoring => "active monitoring",
            MonitorPhase::Blocked => "blocked",
        };
        write!(f, "{}", label)
    }
}

/// Derives the current phase from state, limits and local time.
pub fn derive_phase(state: &RiskState, limits: &RiskLimits, now: NaiveDateTime) -> MonitorPhase {
    if state.date != now.date() {
        return MonitorPhase::UninitializedDay;
    }
    if !state.trading_allowed {
        return MonitorPhase::Blocked;
    }
    match limits.window_position(now.time()) {
        WindowPosition::BeforeOpen => MonitorPhase::AwaitingTradingWindow,
        WindowPosition::Open | WindowPosition::AfterClose => {
            if state.morning_balance.is_none() {
                MonitorPhase::AwaitingReferenceBalance
            } else {
                MonitorPhase::ActiveMonitoring
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use rust_decimal::Decimal;

    use super::*;

    fn limits() -> RiskLimits {
        RiskLimits {
            trading_start: NaiveTime::from_hms_opt(9, 25, 0).unwrap(),
            trading_end: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            loss_limit_fraction: Decimal::new(20, 2),
            max_orders_per_day: 10,
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn stale_date_wins_over_everything() {
        let mut state = RiskState::new_for(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        state.block("daily loss limit breached");

        assert_eq!(
            derive_phase(&state, &limits(), at(10, 0)),
            MonitorPhase::UninitializedDay
        );
    }

    #[test]
    fn blocked_state_reports_blocked() {
        let mut state = RiskState::new_for(at(10, 0).date());
        state.block("daily order limit reached");

        assert_eq!(derive_phase(&state, &limits(), at(10, 0)), MonitorPhase::Blocked);
    }

    #[test]
    fn before_open_awaits_window() {
        let state = RiskState::new_for(at(8, 0).date());
        assert_eq!(
            derive_phase(&state, &limits(), at(8, 0)),
            MonitorPhase::AwaitingTradingWindow
        );
    }

    #[test]
    fn open_without_reference_awaits_reference() {
        let state = RiskState::new_for(at(9, 30).date());
        assert_eq!(
            derive_phase(&state, &limits(), at(9, 30)),
            MonitorPhase::AwaitingReferenceBalance
        );
    }

    #[test]
    fn open_with_reference_is_active() {
        let mut state = RiskState::new_for(at(11, 0).date());
        state.capture_reference(Decimal::new(100_000, 0), Decimal::new(20, 2));

        assert_eq!(
            derive_phase(&state, &limits(), at(11, 0)),
            MonitorPhase::ActiveMonitoring
        );
    }
}
