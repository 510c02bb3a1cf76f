//! Dhan brokerage gateway implementation.

use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerError, BrokerGateway, Client, ClientError, Result, parse};
use crate::config::BrokerConfig;
use crate::domain::{Position, PositionSide};

const BROKER_NAME: &str = "dhan";

/// Order statuses that still occupy the book and are worth cancelling.
const PENDING_ORDER_STATUSES: &[&str] = &["PENDING", "TRANSIT", "PART_TRADED"];

/// Dhan REST gateway. One request per call, no retries; timing of retries
/// is the monitor's business.
pub struct DhanBroker {
    client: Client,
}

impl DhanBroker {
    /// Creates a new DhanBroker from the broker config.
    pub fn from_config(config: &BrokerConfig) -> Result<Self> {
        if !config.enabled {
            return Err(BrokerError::Connection(format!(
                "{} is not enabled in config",
                BROKER_NAME
            )));
        }

        Ok(Self {
            client: Client::from_config(config),
        })
    }

    /// Lists orders that are still pending on the book.
    async fn get_pending_orders(&self) -> Result<Vec<OrderInfo>> {
        let body = self
            .client
            .request(Method::GET, "/orders", None)
            .await
            .map_err(map_client_error)?;

        let orders: Vec<OrderInfo> = serde_json::from_slice(&body)
            .map_err(|e| BrokerError::Parse(format!("parse orders: {}", e)))?;

        Ok(orders
            .into_iter()
            .filter(|o| PENDING_ORDER_STATUSES.contains(&o.order_status.as_str()))
            .collect())
    }

    /// Cancels a single order by id.
    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let endpoint = format!("/orders/{}", order_id);

        self.client
            .request(Method::DELETE, &endpoint, None)
            .await
            .map_err(map_client_error)?;

        Ok(())
    }
}

#[async_trait]
impl BrokerGateway for DhanBroker {
    async fn get_available_balance(&self) -> Option<Decimal> {
        let body = match self.client.request(Method::GET, "/fundlimit", None).await {
            Ok(body) => body,
            Err(ClientError::Unauthorized(msg)) => {
                // Logged apart from transient failures: this one will not
                // fix itself on the next tick.
                error!(broker = BROKER_NAME, error = %msg, "credential rejected while fetching balance");
                return None;
            }
            Err(e) => {
                warn!(broker = BROKER_NAME, error = %e, "failed to fetch balance");
                return None;
            }
        };

        let value: serde_json::Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                warn!(broker = BROKER_NAME, error = %e, "fund limit response is not json");
                return None;
            }
        };

        match parse::available_balance(&value) {
            Some(balance) => {
                debug!(balance = %balance, "fetched available balance");
                Some(balance)
            }
            None => {
                warn!("fund limit response carried no recognizable balance field");
                None
            }
        }
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>> {
        let body = self
            .client
            .request(Method::GET, "/positions", None)
            .await
            .map_err(map_client_error)?;

        let positions: Vec<PositionInfo> = serde_json::from_slice(&body)
            .map_err(|e| BrokerError::Parse(format!("parse positions: {}", e)))?;

        Ok(positions.iter().map(PositionInfo::to_position).collect())
    }

    async fn cancel_all_pending_orders(&self) -> bool {
        let pending = match self.get_pending_orders().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "failed to list pending orders");
                return false;
            }
        };

        if pending.is_empty() {
            debug!("no pending orders to cancel");
            return true;
        }

        let mut all_ok = true;
        for order in &pending {
            match self.cancel_order(&order.order_id).await {
                Ok(()) => info!(order_id = %order.order_id, "cancelled pending order"),
                Err(e) => {
                    warn!(order_id = %order.order_id, error = %e, "failed to cancel order");
                    all_ok = false;
                }
            }
        }

        all_ok
    }

    async fn place_market_exit_order(&self, position: &Position) -> bool {
        // Dhan wants an integral quantity; intraday equity positions are
        // whole shares.
        let quantity = position.exit_quantity().to_i64().unwrap_or(0);
        let body = json!({
            "dhanClientId": self.client.client_id(),
            "transactionType": position.exit_side().to_string(),
            "exchangeSegment": position.exchange_segment,
            "productType": position.product_type,
            "orderType": "MARKET",
            "validity": "DAY",
            "securityId": position.security_id,
            "quantity": quantity,
            "price": 0,
        });

        match self.client.request(Method::POST, "/orders", Some(body)).await {
            Ok(_) => {
                info!(
                    security_id = %position.security_id,
                    side = %position.exit_side(),
                    quantity = %position.exit_quantity(),
                    "exit order placed"
                );
                true
            }
            Err(e) => {
                warn!(
                    security_id = %position.security_id,
                    error = %e,
                    "failed to place exit order"
                );
                false
            }
        }
    }

    fn name(&self) -> &str {
        BROKER_NAME
    }
}

/// Dhan position response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionInfo {
    security_id: String,
    #[serde(default = "default_segment")]
    exchange_segment: String,
    #[serde(default = "default_product")]
    product_type: String,
    #[serde(default)]
    position_type: String,
    #[serde(default)]
    net_qty: f64,
}

fn default_segment() -> String {
    "NSE_EQ".to_string()
}

fn default_product() -> String {
    "INTRADAY".to_string()
}

impl PositionInfo {
    fn to_position(&self) -> Position {
        let side = if self.position_type.eq_ignore_ascii_case("SHORT") || self.net_qty < 0.0 {
            PositionSide::Short
        } else {
            PositionSide::Long
        };

        Position {
            security_id: self.security_id.clone(),
            exchange_segment: self.exchange_segment.clone(),
            product_type: self.product_type.clone(),
            side,
            net_quantity: Decimal::try_from(self.net_qty).unwrap_or_default(),
        }
    }
}

/// Dhan order response (only the fields the cancel sweep needs).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderInfo {
    order_id: String,
    #[serde(default)]
    order_status: String,
}

/// Maps client errors to broker errors.
fn map_client_error(err: ClientError) -> BrokerError {
    match err {
        ClientError::Unauthorized(msg) => BrokerError::Unauthorized(msg),
        ClientError::Request(e) if e.is_timeout() || e.is_connect() => {
            BrokerError::Connection(e.to_string())
        }
        ClientError::Request(e) => BrokerError::Api(e.to_string()),
        ClientError::Json(e) => BrokerError::Parse(e.to_string()),
        ClientError::Api(e) => BrokerError::Api(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_info_long() {
        let info = PositionInfo {
            security_id: "11536".to_string(),
            exchange_segment: "NSE_EQ".to_string(),
            product_type: "INTRADAY".to_string(),
            position_type: "LONG".to_string(),
            net_qty: 50.0,
        };
        let pos = info.to_position();

        assert_eq!(pos.side, PositionSide::Long);
        assert_eq!(pos.net_quantity, Decimal::from(50));
        assert!(pos.is_open());
    }

    #[test]
    fn test_position_info_short_from_negative_qty() {
        // Some API revisions omit positionType; a negative net quantity
        // still identifies a short.
        let info = PositionInfo {
            security_id: "11536".to_string(),
            exchange_segment: "NSE_FNO".to_string(),
            product_type: "INTRADAY".to_string(),
            position_type: String::new(),
            net_qty: -75.0,
        };
        let pos = info.to_position();

        assert_eq!(pos.side, PositionSide::Short);
        assert_eq!(pos.exit_quantity(), Decimal::from(75));
    }

    #[test]
    fn test_position_response_deserializes_with_defaults() {
        let body = r#"[{"securityId": "1333", "netQty": 10, "positionType": "LONG"}]"#;
        let infos: Vec<PositionInfo> = serde_json::from_str(body).unwrap();

        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].exchange_segment, "NSE_EQ");
        assert_eq!(infos[0].product_type, "INTRADAY");
    }

    #[test]
    fn test_pending_status_filter() {
        for status in ["PENDING", "TRANSIT", "PART_TRADED"] {
            assert!(PENDING_ORDER_STATUSES.contains(&status));
        }
        assert!(!PENDING_ORDER_STATUSES.contains(&"TRADED"));
        assert!(!PENDING_ORDER_STATUSES.contains(&"CANCELLED"));
    }
}
