//! Broker position types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

/// Side of an order as the broker expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Buy => write!(f, "BUY"),
            TransactionType::Sell => write!(f, "SELL"),
        }
    }
}

/// An open position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Security identifier the broker uses for order placement.
    pub security_id: String,
    /// Exchange segment the position lives on (e.g. "NSE_EQ").
    pub exchange_segment: String,
    /// Product type the position was opened under (e.g. "INTRADAY").
    pub product_type: String,
    /// Long or short.
    pub side: PositionSide,
    /// Net quantity. Zero means the position is already flat.
    pub net_quantity: Decimal,
}

impl Position {
    /// True when there is anything left to flatten.
    pub fn is_open(&self) -> bool {
        !self.net_quantity.is_zero()
    }

    /// The order side that closes this position.
    pub fn exit_side(&self) -> TransactionType {
        match self.side {
            PositionSide::Long => TransactionType::Sell,
            PositionSide::Short => TransactionType::Buy,
        }
    }

    /// The order quantity that brings the net quantity to zero.
    pub fn exit_quantity(&self) -> Decimal {
        self.net_quantity.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn long(qty: &str) -> Position {
        Position {
            security_id: "11536".to_string(),
            exchange_segment: "NSE_EQ".to_string(),
            product_type: "INTRADAY".to_string(),
            side: PositionSide::Long,
            net_quantity: Decimal::from_str(qty).unwrap(),
        }
    }

    #[test]
    fn test_long_position_exits_with_sell() {
        let pos = long("50");
        assert_eq!(pos.exit_side(), TransactionType::Sell);
        assert_eq!(pos.exit_quantity(), Decimal::from(50));
    }

    #[test]
    fn test_short_position_exits_with_buy() {
        let mut pos = long("-25");
        pos.side = PositionSide::Short;

        assert_eq!(pos.exit_side(), TransactionType::Buy);
        assert_eq!(pos.exit_quantity(), Decimal::from(25));
    }

    #[test]
    fn test_flat_position_is_not_open() {
        assert!(!long("0").is_open());
        assert!(long("1").is_open());
    }
}
