//! Notification events, the Notifier trait, and message formatting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;

/// Kind of notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// The monitor started.
    Startup,
    /// The monitor stopped.
    Shutdown,
    /// The emergency stop fired.
    Emergency,
    /// Something went wrong.
    Error,
    /// Periodic stats overview.
    Overview,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Startup => write!(f, "startup"),
            EventType::Shutdown => write!(f, "shutdown"),
            EventType::Emergency => write!(f, "emergency"),
            EventType::Error => write!(f, "error"),
            EventType::Overview => write!(f, "overview"),
        }
    }
}

/// Monitor startup details.
#[derive(Debug, Clone)]
pub struct StartupData {
    pub version: String,
    pub broker: String,
    pub trading_window: String,
    pub loss_limit_percent: Decimal,
    pub max_orders_per_day: u32,
}

/// Monitor shutdown details.
#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
    pub graceful: bool,
}

/// Emergency stop details.
#[derive(Debug, Clone)]
pub struct EmergencyData {
    pub reason: String,
    pub orders_cancelled: bool,
    pub positions_flattened: usize,
    pub positions_failed: usize,
}

/// Error details.
#[derive(Debug, Clone)]
pub struct ErrorData {
    pub component: String,
    pub message: String,
    pub error: Option<String>,
}

/// Periodic overview details.
#[derive(Debug, Clone)]
pub struct OverviewData {
    pub uptime: Duration,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub order_count: u32,
    pub max_orders_per_day: u32,
    pub loss_percent: Option<Decimal>,
    pub trading_allowed: bool,
}

/// Event payload.
#[derive(Debug, Clone)]
pub enum EventData {
    Startup(StartupData),
    Shutdown(ShutdownData),
    Emergency(EmergencyData),
    Error(ErrorData),
    Overview(OverviewData),
}

/// A notification event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn startup(data: StartupData) -> Self {
        Self::new(EventType::Startup, EventData::Startup(data))
    }

    pub fn shutdown(data: ShutdownData) -> Self {
        Self::new(EventType::Shutdown, EventData::Shutdown(data))
    }

    pub fn emergency(data: EmergencyData) -> Self {
        Self::new(EventType::Emergency, EventData::Emergency(data))
    }

    pub fn error(data: ErrorData) -> Self {
        Self::new(EventType::Error, EventData::Error(data))
    }

    pub fn overview(data: OverviewData) -> Self {
        Self::new(EventType::Overview, EventData::Overview(data))
    }
}

/// Trait for notification delivery.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a notification and waits for delivery.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Queues a notification without blocking.
    fn send_async(&self, event: Event);

    /// Whether this channel wants events of the given type.
    fn is_enabled(&self, event_type: EventType) -> bool;

    /// Shuts the notifier down.
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Notification delivery error.
#[derive(Debug, Clone)]
pub struct NotificationError {
    pub message: String,
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationError: {}", self.message)
    }
}

impl std::error::Error for NotificationError {}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// NoopNotifier - empty implementation for tests and disabled config.
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _event_type: EventType) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Formatting functions ===

/// Formats a startup event.
pub fn format_startup(data: &StartupData) -> String {
    format!(
        "🤖 *Guardrail started*\n\n\
         Version: {}\n\
         Broker: {}\n\
         Trading window: {}\n\
         Loss limit: {}%\n\
         Order budget: {}/day\n\n\
         ⏰ {}",
        data.version,
        data.broker,
        data.trading_window,
        data.loss_limit_percent,
        data.max_orders_per_day,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Formats a shutdown event.
pub fn format_shutdown(data: &ShutdownData) -> String {
    let status = if data.graceful {
        "✅ Graceful"
    } else {
        "⚠️ Forced"
    };

    format!(
        "🛑 *Guardrail stopped*\n\n\
         Reason: {}\n\
         Status: {}\n\
         Uptime: {}\n\n\
         ⏰ {}",
        data.reason,
        status,
        format_duration(data.uptime),
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Formats an emergency-stop event.
pub fn format_emergency(data: &EmergencyData) -> String {
    let cancels = if data.orders_cancelled {
        "all cancelled"
    } else {
        "some failed"
    };
    let flatten_note = if data.positions_failed > 0 {
        format!(" ({} failed)", data.positions_failed)
    } else {
        String::new()
    };

    format!(
        "🚨 *EMERGENCY STOP*\n\n\
         Reason: {}\n\
         Pending orders: {}\n\
         Positions flattened: {}{}\n\n\
         Trading is blocked for the rest of the day.\n\n\
         ⏰ {}",
        data.reason,
        cancels,
        data.positions_flattened,
        flatten_note,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Formats an error event.
pub fn format_error(data: &ErrorData) -> String {
    let error_str = data
        .error
        .as_ref()
        .map(|e| format!("\nError: {}", e))
        .unwrap_or_default();

    format!(
        "⚠️ *Error*\n\n\
         Component: {}\n\
         Message: {}{}\n\n\
         ⏰ {}",
        data.component,
        data.message,
        error_str,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Formats a periodic overview.
pub fn format_overview(data: &OverviewData) -> String {
    let status = if data.trading_allowed {
        "✅ trading allowed"
    } else {
        "⛔ trading blocked"
    };
    let loss = data
        .loss_percent
        .map(|p| format!("{:.2}%", p))
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        "📊 *Guardrail overview* {}\n\n\
         ⏱ Uptime: {}\n\
         🔄 Ticks: {} ({} skipped)\n\
         🧾 Orders today: {}/{}\n\
         📉 Realized loss: {}\n\n\
         ⏰ {}",
        status,
        format_duration(data.uptime),
        add_thousand_separators(data.ticks),
        data.skipped_ticks,
        data.order_count,
        data.max_orders_per_day,
        loss,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Formats any event into its message text.
pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::Startup(data) => format_startup(data),
        EventData::Shutdown(data) => format_shutdown(data),
        EventData::Emergency(data) => format_emergency(data),
        EventData::Error(data) => format_error(data),
        EventData::Overview(data) => format_overview(data),
    }
}

// === Helper functions ===

/// Formats a duration as a short human string.
pub(super) fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Adds thousand separators to a count.
pub(super) fn add_thousand_separators(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
