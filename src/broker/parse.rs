//! Loose-response adapters for the parts of the Dhan API with unstable
//! field naming.
//!
//! The fund-limit response has carried its available balance under several
//! names across API revisions (including the long-lived "availabel" typo),
//! sometimes nested under a "data" wrapper and sometimes as a one-element
//! array. All of that guessing lives here, in one tested function, instead
//! of leaking fallback field lists into the monitor.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Field names the available balance has been observed under, in order of
/// how current they are.
const BALANCE_FIELDS: &[&str] = &[
    "availabelBalance",
    "availableBalance",
    "withdrawableBalance",
];

/// Extracts the available balance from a fund-limit response body.
///
/// Accepts the bare object, a `{"data": {...}}` wrapper, or a one-element
/// array of either; the value itself may be a JSON number or a numeric
/// string. Returns None when nothing recognizable is present.
pub fn available_balance(body: &Value) -> Option<Decimal> {
    let obj = unwrap_payload(body)?;

    for field in BALANCE_FIELDS {
        if let Some(value) = obj.get(*field) {
            if let Some(amount) = decimal_value(value) {
                return Some(amount);
            }
        }
    }

    None
}

/// Peels the `data` wrapper and/or array shell off a response payload.
fn unwrap_payload(body: &Value) -> Option<&Value> {
    let body = match body {
        Value::Array(items) => items.first()?,
        other => other,
    };

    match body.get("data") {
        Some(Value::Array(items)) => items.first(),
        Some(inner @ Value::Object(_)) => Some(inner),
        _ => Some(body),
    }
}

/// Reads a Decimal out of a JSON number or numeric string.
fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}
