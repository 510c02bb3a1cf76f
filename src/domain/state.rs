//! The single per-day risk state record.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// RiskState is the one record the whole guardrail revolves around.
///
/// It is created fresh on every day rollover, mutated by the monitor loop
/// (balances, `last_check`) and by external order placements (`order_count`),
/// and replaced wholesale on reset. Blocking is monotonic within a day: once
/// `trading_allowed` goes false only a rollover or manual reset clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    /// Day this state applies to; a mismatch with "today" triggers a reset.
    pub date: NaiveDate,
    /// Reference balance captured once per day at the start of the trading
    /// window. None until captured.
    pub morning_balance: Option<Decimal>,
    /// Most recently observed balance.
    pub current_balance: Option<Decimal>,
    /// Frozen loss cap: `morning_balance * loss_limit_fraction` at the
    /// moment of capture. Never recomputed within the day.
    pub max_loss_amount: Option<Decimal>,
    /// Orders placed today, incremented by external callers only.
    pub order_count: u32,
    /// True unless a rule has fired.
    pub trading_allowed: bool,
    /// Human-readable cause of the block; empty while trading is allowed.
    pub blocked_reason: String,
    /// Last successful rule evaluation (observability only).
    pub last_check: Option<DateTime<Utc>>,
}

impl RiskState {
    /// All-default record for the given day: trading allowed, no reference
    /// balance, zero orders.
    pub fn new_for(date: NaiveDate) -> Self {
        Self {
            date,
            morning_balance: None,
            current_balance: None,
            max_loss_amount: None,
            order_count: 0,
            trading_allowed: true,
            blocked_reason: String::new(),
            last_check: None,
        }
    }

    /// Captures the morning reference balance and freezes the loss cap.
    /// A second call within the same day is a no-op.
    pub fn capture_reference(&mut self, balance: Decimal, loss_limit_fraction: Decimal) {
        if self.morning_balance.is_some() {
            return;
        }
        self.morning_balance = Some(balance);
        self.current_balance = Some(balance);
        self.max_loss_amount = Some(balance * loss_limit_fraction);
    }

    /// Marks trading as blocked. Monotonic: a later call with a different
    /// reason does not overwrite the first one.
    pub fn block(&mut self, reason: impl Into<String>) {
        if !self.trading_allowed {
            return;
        }
        self.trading_allowed = false;
        self.blocked_reason = reason.into();
    }

    /// Realized loss against the morning balance, clamped at zero when the
    /// account is up. None until both balances are known.
    pub fn realized_loss(&self) -> Option<Decimal> {
        let morning = self.morning_balance?;
        let current = self.current_balance?;
        Some((morning - current).max(Decimal::ZERO))
    }

    /// Realized loss as a percentage of the morning balance.
    pub fn loss_percent(&self) -> Option<Decimal> {
        let morning = self.morning_balance?;
        if morning.is_zero() {
            return None;
        }
        let loss = self.realized_loss()?;
        Some(loss / morning * Decimal::from(100))
    }

    /// Orders left in today's budget.
    pub fn remaining_orders(&self, max_orders_per_day: u32) -> u32 {
        max_orders_per_day.saturating_sub(self.order_count)
    }
}
