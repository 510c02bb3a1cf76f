use std::str::FromStr;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::broker::{BrokerGateway, Result as BrokerResult};
use crate::config::{
    AppConfig, BrokerConfig, Config, CorruptStatePolicy, RiskConfig,
};
use crate::domain::{Position, PositionSide, RiskState};
use crate::storage::{StateStore, StorageError};

use super::*;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

fn long_position(security_id: &str, quantity: i64) -> Position {
    Position {
        security_id: security_id.to_string(),
        exchange_segment: "NSE_EQ".to_string(),
        product_type: "INTRADAY".to_string(),
        side: PositionSide::Long,
        net_quantity: Decimal::from(quantity),
    }
}

/// Scripted broker for driving the monitor through specific scenarios.
struct MockBroker {
    balance: StdMutex<Option<Decimal>>,
    positions: StdMutex<Vec<Position>>,
    exits_fail: StdMutex<bool>,
    balance_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    exit_calls: AtomicUsize,
}

impl MockBroker {
    fn new(balance: Option<Decimal>) -> Self {
        Self {
            balance: StdMutex::new(balance),
            positions: StdMutex::new(Vec::new()),
            exits_fail: StdMutex::new(false),
            balance_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            exit_calls: AtomicUsize::new(0),
        }
    }

    fn set_balance(&self, balance: Option<Decimal>) {
        *self.balance.lock().unwrap() = balance;
    }

    fn set_positions(&self, positions: Vec<Position>) {
        *self.positions.lock().unwrap() = positions;
    }

    fn set_exits_fail(&self, fail: bool) {
        *self.exits_fail.lock().unwrap() = fail;
    }

    fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    fn exit_calls(&self) -> usize {
        self.exit_calls.load(Ordering::SeqCst)
    }

    fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BrokerGateway for MockBroker {
    async fn get_available_balance(&self) -> Option<Decimal> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        *self.balance.lock().unwrap()
    }

    async fn get_open_positions(&self) -> BrokerResult<Vec<Position>> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn cancel_all_pending_orders(&self) -> bool {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn place_market_exit_order(&self, position: &Position) -> bool {
        self.exit_calls.fetch_add(1, Ordering::SeqCst);
        if *self.exits_fail.lock().unwrap() {
            return false;
        }
        // A successful exit flattens the position on the broker side.
        self.positions
            .lock()
            .unwrap()
            .retain(|p| p.security_id != position.security_id);
        true
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// In-memory store seeded with an initial state.
struct MemoryStore {
    state: StdMutex<Option<RiskState>>,
    fallback_date: NaiveDate,
}

impl MemoryStore {
    fn empty(fallback_date: NaiveDate) -> Self {
        Self {
            state: StdMutex::new(None),
            fallback_date,
        }
    }

    fn seeded(state: RiskState) -> Self {
        let fallback_date = state.date;
        Self {
            state: StdMutex::new(Some(state)),
            fallback_date,
        }
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> RiskState {
        self.state
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| RiskState::new_for(self.fallback_date))
    }

    async fn save(&self, state: &RiskState) -> Result<(), StorageError> {
        *self.state.lock().unwrap() = Some(state.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        app: AppConfig {
            name: "riskguard".to_string(),
            env: "development".to_string(),
            log_level: None,
        },
        broker: BrokerConfig {
            enabled: false,
            base_url: None,
            client_id: String::new(),
            access_token: String::new(),
            timeout: Duration::ZERO,
        },
        risk: RiskConfig {
            trading_start: NaiveTime::from_hms_opt(9, 25, 0).unwrap(),
            trading_end: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            loss_limit_fraction: "0.20".to_string(),
            max_orders_per_day: 10,
            check_interval: Duration::ZERO,
            error_cooldown: Duration::ZERO,
            on_corrupt_state: CorruptStatePolicy::Allow,
        },
        storage: None,
        notification: None,
    }
}

fn build_monitor(broker: Arc<MockBroker>, store: Arc<MemoryStore>) -> Monitor {
    Monitor::new(MonitorConfig {
        app_config: test_config(),
        version: "test".to_string(),
        broker,
        store,
    })
    .unwrap()
}

#[tokio::test]
async fn tick_before_window_does_not_fetch_balance() {
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::empty(day()));
    let monitor = build_monitor(broker.clone(), store.clone());

    monitor.tick_at(at(8, 0)).await.unwrap();

    let state = store.load().await;
    assert_eq!(broker.balance_calls(), 0);
    assert!(state.morning_balance.is_none());
    assert!(state.trading_allowed);
    assert!(state.last_check.is_some());
}

#[tokio::test]
async fn first_tick_in_window_captures_reference() {
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::empty(day()));
    let monitor = build_monitor(broker.clone(), store.clone());

    monitor.tick_at(at(9, 30)).await.unwrap();

    let state = store.load().await;
    assert_eq!(state.morning_balance, Some(dec("100000")));
    assert_eq!(state.max_loss_amount, Some(dec("20000.00")));
    assert!(state.trading_allowed);
    assert_eq!(broker.cancel_calls(), 0);
}

#[tokio::test]
async fn loss_cap_stays_frozen_across_ticks() {
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::empty(day()));
    let monitor = build_monitor(broker.clone(), store.clone());

    monitor.tick_at(at(9, 30)).await.unwrap();
    broker.set_balance(Some(dec("90000")));
    monitor.tick_at(at(10, 0)).await.unwrap();

    let state = store.load().await;
    assert_eq!(state.morning_balance, Some(dec("100000")));
    assert_eq!(state.max_loss_amount, Some(dec("20000.00")));
    assert_eq!(state.current_balance, Some(dec("90000")));
    assert!(state.trading_allowed);
}

#[tokio::test]
async fn loss_breach_blocks_and_flattens() {
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::empty(day()));
    let monitor = build_monitor(broker.clone(), store.clone());

    monitor.tick_at(at(9, 30)).await.unwrap();

    broker.set_positions(vec![long_position("1333", 50), long_position("11536", 25)]);
    broker.set_balance(Some(dec("79000")));
    monitor.tick_at(at(11, 0)).await.unwrap();

    let state = store.load().await;
    assert!(!state.trading_allowed);
    assert!(state.blocked_reason.contains("loss"));
    assert_eq!(broker.cancel_calls(), 1);
    assert_eq!(broker.exit_calls(), 2);
    assert_eq!(monitor.stats().await.emergencies, 1);
}

#[tokio::test]
async fn loss_exactly_at_cap_blocks() {
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::empty(day()));
    let monitor = build_monitor(broker.clone(), store.clone());

    monitor.tick_at(at(9, 30)).await.unwrap();
    broker.set_balance(Some(dec("80000")));
    monitor.tick_at(at(11, 0)).await.unwrap();

    assert!(!store.load().await.trading_allowed);
}

#[tokio::test]
async fn blocked_ticks_resweep_but_never_unblock() {
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::empty(day()));
    let monitor = build_monitor(broker.clone(), store.clone());

    monitor.tick_at(at(9, 30)).await.unwrap();
    broker.set_balance(Some(dec("70000")));
    monitor.tick_at(at(11, 0)).await.unwrap();
    let reason = store.load().await.blocked_reason.clone();

    // Balance recovering changes nothing; the block holds all day, while
    // each tick re-attempts the cancel sweep.
    broker.set_balance(Some(dec("100000")));
    monitor.tick_at(at(11, 5)).await.unwrap();
    monitor.tick_at(at(11, 10)).await.unwrap();

    let state = store.load().await;
    assert!(!state.trading_allowed);
    assert_eq!(state.blocked_reason, reason);
    assert_eq!(broker.cancel_calls(), 3);
    assert_eq!(monitor.stats().await.emergencies, 1);
}

#[tokio::test]
async fn blocked_ticks_retry_positions_a_partial_flatten_missed() {
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::empty(day()));
    let monitor = build_monitor(broker.clone(), store.clone());

    monitor.tick_at(at(9, 30)).await.unwrap();

    // Exit orders fail during the breach, so the sweep leaves the
    // position open.
    broker.set_positions(vec![long_position("1333", 50)]);
    broker.set_exits_fail(true);
    broker.set_balance(Some(dec("70000")));
    monitor.tick_at(at(11, 0)).await.unwrap();
    assert_eq!(broker.exit_calls(), 1);
    assert!(broker.positions.lock().unwrap()[0].is_open());

    // The broker recovers; the next blocked tick flattens what was left.
    broker.set_exits_fail(false);
    monitor.tick_at(at(11, 5)).await.unwrap();

    let state = store.load().await;
    assert!(!state.trading_allowed);
    assert_eq!(broker.exit_calls(), 2);
    assert!(broker.positions.lock().unwrap().is_empty());
    assert_eq!(monitor.stats().await.emergencies, 1);
}

#[tokio::test]
async fn after_close_flattens_without_balance_fetch() {
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::empty(day()));
    let monitor = build_monitor(broker.clone(), store.clone());

    broker.set_positions(vec![long_position("1333", 10)]);
    monitor.tick_at(at(15, 30)).await.unwrap();

    let state = store.load().await;
    assert!(!state.trading_allowed);
    assert!(state.blocked_reason.contains("outside trading hours"));
    assert_eq!(broker.balance_calls(), 0);
    assert_eq!(broker.exit_calls(), 1);
}

#[tokio::test]
async fn unavailable_balance_skips_tick() {
    let broker = Arc::new(MockBroker::new(None));
    let store = Arc::new(MemoryStore::empty(day()));
    let monitor = build_monitor(broker.clone(), store.clone());

    monitor.tick_at(at(10, 0)).await.unwrap();

    let state = store.load().await;
    assert!(state.morning_balance.is_none());
    assert!(state.trading_allowed);
    assert_eq!(monitor.stats().await.skipped_ticks, 1);
}

#[tokio::test]
async fn rollover_resets_a_blocked_day() {
    let mut yesterday = RiskState::new_for(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    yesterday.capture_reference(dec("100000"), dec("0.20"));
    yesterday.order_count = 10;
    yesterday.block("daily loss limit breached");

    let broker = Arc::new(MockBroker::new(Some(dec("95000"))));
    let store = Arc::new(MemoryStore::seeded(yesterday));
    let monitor = build_monitor(broker.clone(), store.clone());

    monitor.tick_at(at(9, 30)).await.unwrap();

    let state = store.load().await;
    assert_eq!(state.date, day());
    assert!(state.trading_allowed);
    assert_eq!(state.order_count, 0);
    // Fresh day captures a fresh reference from today's first fetch.
    assert_eq!(state.morning_balance, Some(dec("95000")));
    assert_eq!(monitor.stats().await.rollovers, 1);
}

#[tokio::test]
async fn order_budget_last_slot_succeeds_next_declines() {
    let today = Local::now().date_naive();
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::empty(today));
    let monitor = build_monitor(broker, store.clone());

    for i in 1..=10 {
        let receipt = monitor.record_order().await.unwrap();
        assert_eq!(receipt.order_count, i);
    }

    let err = monitor.record_order().await.unwrap_err();
    assert!(matches!(err, MonitorError::OrderBudgetExhausted(10)));
    assert_eq!(store.load().await.order_count, 10);
}

#[tokio::test]
async fn order_limit_blocks_on_next_tick() {
    let mut state = RiskState::new_for(day());
    state.capture_reference(dec("100000"), dec("0.20"));
    state.order_count = 10;

    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::seeded(state));
    let monitor = build_monitor(broker, store.clone());

    monitor.tick_at(at(11, 0)).await.unwrap();

    let state = store.load().await;
    assert!(!state.trading_allowed);
    assert!(state.blocked_reason.contains("order limit"));
}

#[tokio::test]
async fn record_order_declines_while_blocked() {
    let today = Local::now().date_naive();
    let mut state = RiskState::new_for(today);
    state.block("daily loss limit breached");

    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::seeded(state));
    let monitor = build_monitor(broker, store.clone());

    let err = monitor.record_order().await.unwrap_err();
    assert!(matches!(err, MonitorError::TradingBlocked(_)));
    assert_eq!(store.load().await.order_count, 0);
}

#[tokio::test]
async fn reset_restarts_the_day() {
    let today = Local::now().date_naive();
    let mut state = RiskState::new_for(today);
    state.capture_reference(dec("100000"), dec("0.20"));
    state.order_count = 7;
    state.block("daily order limit reached");

    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::seeded(state));
    let monitor = build_monitor(broker, store.clone());

    let fresh = monitor.reset().await.unwrap();

    assert_eq!(fresh.date, today);
    assert!(fresh.trading_allowed);
    assert_eq!(fresh.order_count, 0);
    assert!(fresh.morning_balance.is_none());
    assert_eq!(store.load().await, fresh);
}

#[tokio::test]
async fn manual_emergency_blocks_with_given_reason() {
    let today = Local::now().date_naive();
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    broker.set_positions(vec![long_position("1333", 5)]);
    let store = Arc::new(MemoryStore::empty(today));
    let monitor = build_monitor(broker.clone(), store.clone());

    let state = monitor.emergency("operator stop").await.unwrap();

    assert!(!state.trading_allowed);
    assert_eq!(state.blocked_reason, "operator stop");
    assert_eq!(broker.cancel_calls(), 1);
    assert_eq!(broker.exit_calls(), 1);
}

#[tokio::test]
async fn repeated_emergency_keeps_first_reason_but_sweeps_again() {
    let today = Local::now().date_naive();
    let broker = Arc::new(MockBroker::new(Some(dec("100000"))));
    let store = Arc::new(MemoryStore::empty(today));
    let monitor = build_monitor(broker.clone(), store.clone());

    monitor.emergency("first stop").await.unwrap();
    broker.set_positions(vec![long_position("1333", 5)]);
    let state = monitor.emergency("second stop").await.unwrap();

    assert_eq!(state.blocked_reason, "first stop");
    assert_eq!(broker.cancel_calls(), 2);
    assert_eq!(broker.exit_calls(), 1);
}

#[tokio::test]
async fn status_reports_phase_and_budget() {
    let today = Local::now().date_naive();
    let mut state = RiskState::new_for(today);
    state.capture_reference(dec("100000"), dec("0.20"));
    state.current_balance = Some(dec("95000"));
    state.order_count = 4;

    let broker = Arc::new(MockBroker::new(Some(dec("95000"))));
    let store = Arc::new(MemoryStore::seeded(state));
    let monitor = build_monitor(broker, store);

    let report = monitor.status().await;

    assert_eq!(report.remaining_orders, 6);
    assert_eq!(report.loss_percent, Some(dec("5.00")));
    assert!(!report.monitoring_active);
    assert_eq!(report.state.order_count, 4);
}
