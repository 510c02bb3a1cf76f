//! Notification events and delivery channels.

mod notifier;
mod telegram;

pub use notifier::{
    EmergencyData, ErrorData, Event, EventData, EventType, NoopNotifier, NotificationError,
    Notifier, OverviewData, ShutdownData, StartupData, format_event,
};
pub use telegram::{TelegramConfig, TelegramNotifier};
