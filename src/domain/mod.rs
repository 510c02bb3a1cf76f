//! Core domain types: the per-day risk state, broker positions, and the
//! pure rule evaluation that decides whether trading is still permitted.

mod position;
mod rules;
mod state;

pub use position::{Position, PositionSide, TransactionType};
pub use rules::{Evaluation, RiskLimits, Violation, WindowPosition, evaluate};
pub use state::RiskState;
