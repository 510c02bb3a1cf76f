//! Runtime counters for the monitor loop.

use serde::Serialize;

/// Counters accumulated since the monitor started. Not persisted.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Stats {
    /// Ticks executed, including skipped and failed ones.
    pub ticks: u64,
    /// Ticks skipped because the balance could not be fetched.
    pub skipped_ticks: u64,
    /// Ticks that ended with an error and triggered the cooldown.
    pub failed_ticks: u64,
    /// Day rollovers observed.
    pub rollovers: u64,
    /// Emergency stops executed, automatic or manual.
    pub emergencies: u64,
}
