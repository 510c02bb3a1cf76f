//! Emergency stop execution.
//!
//! The sweep is best effort and never retried: cancel whatever pending
//! orders the broker reports, place a market exit for every open position,
//! then block the day and persist. A partial sweep still blocks, so a
//! broker hiccup can only leave positions open, never trading enabled.

use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::BrokerGateway;
use crate::domain::RiskState;
use crate::monitor::error::MonitorError;
use crate::notification::{EmergencyData, Event, Notifier};
use crate::storage::StateStore;

/// Outcome of a single emergency sweep.
#[derive(Debug, Clone, Copy)]
pub struct SweepOutcome {
    /// Every pending order was cancelled (vacuously true when none existed).
    pub orders_cancelled: bool,
    /// Open positions for which a market exit order was accepted.
    pub positions_flattened: usize,
    /// Open positions for which the exit order was rejected or failed.
    pub positions_failed: usize,
}

/// Cancels orders, flattens positions and blocks the trading day.
pub struct EmergencyExecutor {
    broker: Arc<dyn BrokerGateway>,
    store: Arc<dyn StateStore>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl EmergencyExecutor {
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        store: Arc<dyn StateStore>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            broker,
            store,
            notifier,
        }
    }

    /// Runs the cancel + flatten sweep without touching any state.
    ///
    /// Also used on every tick of an already-blocked day, so positions
    /// left open by a partial flatten get another attempt.
    pub async fn sweep(&self) -> SweepOutcome {
        let orders_cancelled = self.broker.cancel_all_pending_orders().await;
        if !orders_cancelled {
            warn!("pending order sweep did not complete cleanly");
        }

        let mut positions_flattened = 0;
        let mut positions_failed = 0;
        match self.broker.get_open_positions().await {
            Ok(positions) => {
                for position in positions.iter().filter(|p| p.is_open()) {
                    if self.broker.place_market_exit_order(position).await {
                        info!(
                            security_id = %position.security_id,
                            quantity = %position.exit_quantity(),
                            "exit order placed"
                        );
                        positions_flattened += 1;
                    } else {
                        warn!(security_id = %position.security_id, "exit order failed");
                        positions_failed += 1;
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "could not list positions for flattening");
            }
        }

        SweepOutcome {
            orders_cancelled,
            positions_flattened,
            positions_failed,
        }
    }

    /// Runs the full emergency sequence against the given state.
    ///
    /// Blocking is monotonic: if the state is already blocked the original
    /// reason is kept, but the sweep still runs so a manual trigger can
    /// retry flattening after a partial failure.
    pub async fn trigger(
        &self,
        state: &mut RiskState,
        reason: &str,
    ) -> Result<SweepOutcome, MonitorError> {
        warn!(reason, "emergency stop triggered");

        let outcome = self.sweep().await;

        state.block(reason);
        self.store.save(state).await?;

        info!(
            reason = %state.blocked_reason,
            positions_flattened = outcome.positions_flattened,
            positions_failed = outcome.positions_failed,
            "trading blocked for the rest of the day"
        );

        if let Some(notifier) = &self.notifier {
            notifier.send_async(Event::emergency(EmergencyData {
                reason: reason.to_string(),
                orders_cancelled: outcome.orders_cancelled,
                positions_flattened: outcome.positions_flattened,
                positions_failed: outcome.positions_failed,
            }));
        }

        Ok(outcome)
    }
}
