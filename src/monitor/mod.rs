//! The monitor loop and its control surface.
//!
//! One tick runs the whole cycle: day rollover, trading-window gate,
//! reference balance capture, rule evaluation and, when a rule fires, the
//! emergency stop. Between ticks the same state can be touched through the
//! control surface (status, record_order, reset, emergency), so every
//! load-mutate-save sequence holds a single lock.

mod config;
mod error;
mod executor;
mod phase;
mod stats;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use executor::{EmergencyExecutor, SweepOutcome};
pub use phase::{MonitorPhase, derive_phase};
pub use stats::Stats;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::broker::BrokerGateway;
use crate::config::Config;
use crate::domain::{RiskLimits, RiskState, Violation, WindowPosition, evaluate};
use crate::notification::{
    ErrorData, Event, Notifier, OverviewData, ShutdownData, StartupData, TelegramConfig,
    TelegramNotifier,
};
use crate::storage::StateStore;

/// Default interval between periodic overview notifications.
const DEFAULT_OVERVIEW_INTERVAL: Duration = Duration::from_secs(3600);

/// Snapshot returned by [`Monitor::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: RiskState,
    pub phase: MonitorPhase,
    pub monitoring_active: bool,
    pub in_trading_window: bool,
    pub loss_percent: Option<Decimal>,
    pub remaining_orders: u32,
    pub uptime_secs: u64,
    pub stats: Stats,
    pub timestamp: DateTime<Utc>,
}

/// Receipt for an accepted order placement.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OrderReceipt {
    pub order_count: u32,
    pub remaining_orders: u32,
}

/// The daily risk guardrail: polls the broker, enforces the rules and
/// exposes the control surface.
pub struct Monitor {
    limits: RiskLimits,
    check_interval: Duration,
    error_cooldown: Duration,
    overview_interval: Duration,

    broker: Arc<dyn BrokerGateway>,
    store: Arc<dyn StateStore>,
    notifier: Option<Arc<dyn Notifier>>,
    executor: EmergencyExecutor,

    version: String,
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    stats: Mutex<Stats>,

    // Serializes every load-mutate-save sequence across the loop and the
    // control surface.
    state_lock: Mutex<()>,
}

impl Monitor {
    /// Creates a new Monitor instance.
    pub fn new(cfg: MonitorConfig) -> Result<Self, MonitorError> {
        let risk = &cfg.app_config.risk;
        let limits = RiskLimits::from_config(risk).map_err(|e| MonitorError::Config(e.to_string()))?;
        let check_interval = risk.check_interval();
        let error_cooldown = risk.error_cooldown();

        let notifier = build_notifier(&cfg.app_config);
        let overview_interval = cfg
            .app_config
            .notification
            .as_ref()
            .and_then(|n| n.telegram.as_ref())
            .map(|t| t.overview_interval)
            .filter(|d| d.as_secs() > 0)
            .unwrap_or(DEFAULT_OVERVIEW_INTERVAL);

        let executor =
            EmergencyExecutor::new(cfg.broker.clone(), cfg.store.clone(), notifier.clone());

        Ok(Monitor {
            limits,
            check_interval,
            error_cooldown,
            overview_interval,
            broker: cfg.broker,
            store: cfg.store,
            notifier,
            executor,
            version: cfg.version,
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            stats: Mutex::new(Stats::default()),
            state_lock: Mutex::new(()),
        })
    }

    /// Builds a monitor from an already-loaded config, wiring up the live
    /// broker and SQLite store.
    pub async fn from_config(config: Config) -> Result<Self, MonitorError> {
        let broker: Arc<dyn BrokerGateway> =
            Arc::new(crate::broker::DhanBroker::from_config(&config.broker)?);

        let mut store_config = crate::storage::SqliteStoreConfig {
            on_corrupt: config.risk.on_corrupt_state,
            ..Default::default()
        };
        if let Some(path) = config.storage.as_ref().and_then(|s| s.path.clone()) {
            store_config.path = path;
        }
        let store: Arc<dyn StateStore> =
            Arc::new(crate::storage::SqliteStore::new(store_config).await?);

        Self::new(MonitorConfig {
            app_config: config,
            version: env!("CARGO_PKG_VERSION").to_string(),
            broker,
            store,
        })
    }

    /// Starts the monitor loop. Returns when [`Monitor::stop`] is called.
    pub async fn start(&self) -> Result<(), MonitorError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(MonitorError::AlreadyRunning);
            }
            *running = true;
        }

        {
            let mut started_at = self.started_at.lock().await;
            *started_at = Some(Instant::now());
        }

        info!(
            version = %self.version,
            broker = %self.broker.name(),
            trading_start = %self.limits.trading_start,
            trading_end = %self.limits.trading_end,
            loss_limit = %self.limits.loss_limit_fraction,
            max_orders = self.limits.max_orders_per_day,
            check_interval = ?self.check_interval,
            "Starting risk monitor"
        );

        self.send_notification(Event::startup(StartupData {
            version: self.version.clone(),
            broker: self.broker.name().to_string(),
            trading_window: format!(
                "{} - {}",
                self.limits.trading_start.format("%H:%M"),
                self.limits.trading_end.format("%H:%M")
            ),
            loss_limit_percent: self.limits.loss_limit_fraction * Decimal::from(100),
            max_orders_per_day: self.limits.max_orders_per_day,
        }))
        .await;

        self.run_main_loop().await
    }

    /// Gracefully stops the monitor.
    pub async fn stop(&self) -> Result<(), MonitorError> {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping monitor...");

        let uptime = self.uptime().await;

        self.send_notification(Event::shutdown(ShutdownData {
            reason: "graceful shutdown".to_string(),
            uptime,
            graceful: true,
        }))
        .await;

        if let Some(ref notifier) = self.notifier {
            let _ = notifier.close().await;
        }

        info!(uptime = ?uptime, "Monitor stopped");

        Ok(())
    }

    /// Returns a copy of the current runtime counters.
    pub async fn stats(&self) -> Stats {
        *self.stats.lock().await
    }

    /// Returns true if the monitor loop is running.
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Returns how long the monitor has been running.
    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Returns a full snapshot of the persisted state plus derived fields.
    pub async fn status(&self) -> StatusReport {
        let state = self.store.load().await;
        let now = Local::now().naive_local();

        StatusReport {
            phase: derive_phase(&state, &self.limits, now),
            monitoring_active: self.is_running().await,
            in_trading_window: self.limits.in_window(now.time()),
            loss_percent: state.loss_percent(),
            remaining_orders: state.remaining_orders(self.limits.max_orders_per_day),
            uptime_secs: self.uptime().await.as_secs(),
            stats: self.stats().await,
            timestamp: Utc::now(),
            state,
        }
    }

    /// Records one order against today's budget.
    ///
    /// Declines without mutating anything when trading is blocked or the
    /// budget is exhausted. The call that consumes the last slot succeeds;
    /// the evaluator fires the order rule on the next tick.
    pub async fn record_order(&self) -> Result<OrderReceipt, MonitorError> {
        let _guard = self.state_lock.lock().await;
        let now = Local::now().naive_local();
        let mut state = self.loaded_state_for(now.date()).await;

        if !state.trading_allowed {
            return Err(MonitorError::TradingBlocked(state.blocked_reason.clone()));
        }
        if state.order_count >= self.limits.max_orders_per_day {
            return Err(MonitorError::OrderBudgetExhausted(state.order_count));
        }

        state.order_count += 1;
        self.store.save(&state).await?;

        let receipt = OrderReceipt {
            order_count: state.order_count,
            remaining_orders: state.remaining_orders(self.limits.max_orders_per_day),
        };
        info!(
            order_count = receipt.order_count,
            remaining = receipt.remaining_orders,
            "order recorded"
        );
        Ok(receipt)
    }

    /// Discards today's state and starts the day over: trading allowed,
    /// no reference balance, zero orders.
    pub async fn reset(&self) -> Result<RiskState, MonitorError> {
        let _guard = self.state_lock.lock().await;
        let state = RiskState::new_for(Local::now().date_naive());
        self.store.save(&state).await?;
        warn!(date = %state.date, "state reset requested, day restarted");
        Ok(state)
    }

    /// Manually triggers the emergency stop with the given reason.
    ///
    /// Runs the full sweep even when already blocked, so an operator can
    /// retry flattening after a partial failure.
    pub async fn emergency(&self, reason: &str) -> Result<RiskState, MonitorError> {
        let _guard = self.state_lock.lock().await;
        let now = Local::now().naive_local();
        let mut state = self.loaded_state_for(now.date()).await;

        self.executor.trigger(&mut state, reason).await?;
        self.stats.lock().await.emergencies += 1;

        Ok(state)
    }

    /// Main polling loop: rule ticks plus the periodic overview.
    async fn run_main_loop(&self) -> Result<(), MonitorError> {
        let mut tick_timer = tokio::time::interval(self.check_interval);
        let mut overview_timer = tokio::time::interval(self.overview_interval);

        info!(
            check_interval = ?self.check_interval,
            overview_interval = ?self.overview_interval,
            "Starting monitor loop"
        );

        loop {
            tokio::select! {
                _ = tick_timer.tick() => {
                    if !self.is_running().await {
                        break;
                    }
                    if let Err(err) = self.tick().await {
                        self.stats.lock().await.failed_ticks += 1;
                        error!(error = %err, "tick failed");
                        self.notify_error("monitor", "tick failed", Some(&err)).await;
                        // Back off before the next attempt
                        tokio::time::sleep(self.error_cooldown).await;
                    }
                }
                _ = overview_timer.tick() => {
                    if !self.is_running().await {
                        break;
                    }
                    self.send_overview().await;
                }
            }
        }

        Ok(())
    }

    /// Runs one monitor tick at the current local time.
    async fn tick(&self) -> Result<(), MonitorError> {
        self.tick_at(Local::now().naive_local()).await
    }

    /// Runs one monitor tick as of the given local time.
    async fn tick_at(&self, now: NaiveDateTime) -> Result<(), MonitorError> {
        let _guard = self.state_lock.lock().await;
        self.stats.lock().await.ticks += 1;

        let mut state = self.store.load().await;

        // Stale record: the calendar day changed, everything resets at once.
        if state.date != now.date() {
            info!(old = %state.date, new = %now.date(), "day rollover, resetting state");
            state = RiskState::new_for(now.date());
            self.store.save(&state).await?;
            self.stats.lock().await.rollovers += 1;
        }

        // Terminal for the day; no rules left to evaluate. The sweep still
        // re-runs each tick so positions a partial flatten left open get
        // retried; no fresh notification and no new emergency counted.
        if !state.trading_allowed {
            debug!(reason = %state.blocked_reason, "tick while blocked");
            let outcome = self.executor.sweep().await;
            if outcome.positions_flattened > 0 {
                info!(
                    positions_flattened = outcome.positions_flattened,
                    "blocked-day sweep flattened remaining positions"
                );
            }
            state.last_check = Some(Utc::now());
            self.store.save(&state).await?;
            return Ok(());
        }

        match self.limits.window_position(now.time()) {
            WindowPosition::BeforeOpen => {
                // No reference capture before the window opens.
                debug!(now = %now.time(), "awaiting trading window");
                state.last_check = Some(Utc::now());
                self.store.save(&state).await?;
                return Ok(());
            }
            WindowPosition::AfterClose => {
                // Past close with trading still allowed: flatten and block
                // without waiting for a balance fetch.
                let reason = Violation::OutsideTradingHours { now: now.time() }.to_string();
                self.executor.trigger(&mut state, &reason).await?;
                self.stats.lock().await.emergencies += 1;
                return Ok(());
            }
            WindowPosition::Open => {}
        }

        // One balance fetch per tick, shared by capture and evaluation.
        let Some(balance) = self.broker.get_available_balance().await else {
            debug!("balance unavailable, skipping tick");
            self.stats.lock().await.skipped_ticks += 1;
            return Ok(());
        };

        if state.morning_balance.is_none() {
            state.capture_reference(balance, self.limits.loss_limit_fraction);
            info!(
                morning_balance = %balance,
                max_loss = %state.max_loss_amount.unwrap_or_default(),
                "reference balance captured"
            );
        }

        state.current_balance = Some(balance);
        state.last_check = Some(Utc::now());

        let evaluation = evaluate(&state, &self.limits, now.time(), Some(balance));
        match evaluation.primary_reason() {
            Some(reason) => {
                for violation in &evaluation.violations {
                    warn!(violation = %violation, "rule violated");
                }
                self.executor.trigger(&mut state, &reason).await?;
                self.stats.lock().await.emergencies += 1;
            }
            None => {
                debug!(
                    balance = %balance,
                    order_count = state.order_count,
                    "tick ok"
                );
                self.store.save(&state).await?;
            }
        }

        Ok(())
    }

    /// Loads today's state, applying rollover if the persisted record is
    /// stale. Callers hold `state_lock`.
    async fn loaded_state_for(&self, today: chrono::NaiveDate) -> RiskState {
        let state = self.store.load().await;
        if state.date == today {
            return state;
        }
        info!(old = %state.date, new = %today, "day rollover, resetting state");
        self.stats.lock().await.rollovers += 1;
        RiskState::new_for(today)
    }

    /// Sends a notification event if a notifier is configured.
    async fn send_notification(&self, event: Event) {
        if let Some(ref notifier) = self.notifier {
            if let Err(e) = notifier.send(&event).await {
                debug!(
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to send notification"
                );
            }
        }
    }

    async fn notify_error(&self, component: &str, message: &str, err: Option<&MonitorError>) {
        if let Some(ref notifier) = self.notifier {
            notifier.send_async(Event::error(ErrorData {
                component: component.to_string(),
                message: message.to_string(),
                error: err.map(|e| e.to_string()),
            }));
        }
    }

    /// Sends a periodic overview notification with current state and stats.
    async fn send_overview(&self) {
        let stats = self.stats().await;
        let uptime = self.uptime().await;
        let state = self.store.load().await;

        self.send_notification(Event::overview(OverviewData {
            uptime,
            ticks: stats.ticks,
            skipped_ticks: stats.skipped_ticks,
            order_count: state.order_count,
            max_orders_per_day: self.limits.max_orders_per_day,
            loss_percent: state.loss_percent(),
            trading_allowed: state.trading_allowed,
        }))
        .await;
    }
}

/// Builds the Telegram notifier from config, if enabled and credentialed.
fn build_notifier(cfg: &Config) -> Option<Arc<dyn Notifier>> {
    let telegram = cfg.notification.as_ref()?.telegram.as_ref()?;
    if !telegram.enabled || telegram.bot_token.is_empty() || telegram.chat_id.is_empty() {
        return None;
    }

    let mut telegram_config =
        TelegramConfig::new(telegram.bot_token.clone(), telegram.chat_id.clone());
    telegram_config.notify_emergencies = telegram.notify_emergencies;
    telegram_config.notify_errors = telegram.notify_errors;
    telegram_config.notify_overview = telegram.notify_overview;
    if !telegram.error_chat_id.is_empty() {
        telegram_config = telegram_config.with_error_chat_id(telegram.error_chat_id.clone());
    }

    match TelegramNotifier::new(telegram_config) {
        Ok(notifier) => {
            info!("Telegram notifier created");
            Some(Arc::new(notifier))
        }
        Err(e) => {
            warn!(error = %e, "Failed to create Telegram notifier");
            None
        }
    }
}

#[cfg(test)]
mod tests;
