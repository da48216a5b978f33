//! Order request and response models

use super::de;
use crate::types::{OrderSide, OrderStatus, OrderType, TimeInForce};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A new-order request as submitted to the spot order endpoint.
///
/// Construct through one of the typed constructors; `to_params` renders the
/// query-parameter form the exchange expects (decimals with trailing zeros
/// trimmed).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// Plain LIMIT order, good-till-canceled
    pub fn limit(symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
            time_in_force: Some(TimeInForce::Gtc),
            client_order_id: None,
        }
    }

    /// MARKET order; only the quantity is sent
    pub fn market(symbol: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: None,
            client_order_id: None,
        }
    }

    /// STOP_LOSS_LIMIT: triggers at `stop_price`, rests at `limit_price`
    pub fn stop_loss_limit(
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::StopLossLimit,
            quantity,
            price: Some(limit_price),
            stop_price: Some(stop_price),
            time_in_force: Some(TimeInForce::Gtc),
            client_order_id: None,
        }
    }

    /// TAKE_PROFIT_LIMIT: triggers at `stop_price`, rests at `limit_price`
    pub fn take_profit_limit(
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::TakeProfitLimit,
            ..Self::stop_loss_limit(symbol, side, quantity, stop_price, limit_price)
        }
    }

    /// Plain STOP_LOSS: market execution once `stop_price` is touched
    pub fn stop_loss(symbol: &str, side: OrderSide, quantity: Decimal, stop_price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::StopLoss,
            quantity,
            price: None,
            stop_price: Some(stop_price),
            time_in_force: None,
            client_order_id: None,
        }
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Query parameters in the shape the order endpoint expects
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("symbol".to_string(), self.symbol.clone()),
            ("side".to_string(), self.side.as_str().to_string()),
            ("type".to_string(), self.order_type.as_str().to_string()),
            (
                "quantity".to_string(),
                self.quantity.normalize().to_string(),
            ),
        ];
        if let Some(price) = self.price {
            params.push(("price".to_string(), price.normalize().to_string()));
        }
        if let Some(stop) = self.stop_price {
            params.push(("stopPrice".to_string(), stop.normalize().to_string()));
        }
        if let Some(tif) = self.time_in_force {
            params.push(("timeInForce".to_string(), tif.as_str().to_string()));
        }
        if let Some(id) = &self.client_order_id {
            params.push(("newClientOrderId".to_string(), id.clone()));
        }
        params
    }
}

/// An OCO (one-cancels-other) request for the `order/oco` endpoint
#[derive(Debug, Clone)]
pub struct OcoRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub stop_price: Decimal,
    pub stop_limit_price: Decimal,
    pub stop_limit_time_in_force: TimeInForce,
    pub list_client_order_id: String,
}

impl OcoRequest {
    pub fn to_params(&self) -> Vec<(String, String)> {
        vec![
            ("symbol".to_string(), self.symbol.clone()),
            ("side".to_string(), self.side.as_str().to_string()),
            (
                "quantity".to_string(),
                self.quantity.normalize().to_string(),
            ),
            ("price".to_string(), self.price.normalize().to_string()),
            (
                "stopPrice".to_string(),
                self.stop_price.normalize().to_string(),
            ),
            (
                "stopLimitPrice".to_string(),
                self.stop_limit_price.normalize().to_string(),
            ),
            (
                "stopLimitTimeInForce".to_string(),
                self.stop_limit_time_in_force.as_str().to_string(),
            ),
            (
                "listClientOrderId".to_string(),
                self.list_client_order_id.clone(),
            ),
        ]
    }
}

/// Partial fill reported inside an order acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    #[serde(deserialize_with = "de::decimal_lenient")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "de::decimal_lenient")]
    pub qty: Decimal,
}

/// Acknowledgement returned by order placement and cancellation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    #[serde(deserialize_with = "de::string_or_number")]
    pub order_id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "de::decimal_lenient_opt")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "de::decimal_lenient_opt")]
    pub orig_qty: Option<Decimal>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub transact_time: Option<i64>,
    #[serde(default)]
    pub fills: Vec<Fill>,
}

impl OrderAck {
    /// Price of the first reported fill, if any
    pub fn fill_price(&self) -> Option<Decimal> {
        self.fills.first().map(|f| f.price)
    }
}

/// Full order state as returned by order-status and open-orders queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusInfo {
    #[serde(deserialize_with = "de::string_or_number")]
    pub order_id: String,
    #[serde(default)]
    pub symbol: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, rename = "type")]
    pub order_type: Option<String>,
    #[serde(default, deserialize_with = "de::decimal_lenient")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "de::decimal_lenient")]
    pub orig_qty: Decimal,
    #[serde(default, deserialize_with = "de::decimal_lenient")]
    pub executed_qty: Decimal,
    #[serde(default, deserialize_with = "de::decimal_lenient_opt")]
    pub stop_price: Option<Decimal>,
}

impl OrderStatusInfo {
    pub fn is_sell(&self) -> bool {
        self.side.as_deref() == Some("SELL")
    }
}

/// Acknowledgement from the OCO endpoint; the shape is loosely specified
/// upstream, so everything beyond the legs is optional
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcoAck {
    #[serde(default)]
    pub order_list_id: Option<serde_json::Value>,
    #[serde(default)]
    pub list_client_order_id: Option<String>,
    #[serde(default)]
    pub orders: Vec<OcoLeg>,
}

/// One leg of an OCO acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcoLeg {
    #[serde(deserialize_with = "de::string_or_number")]
    pub order_id: String,
    #[serde(default)]
    pub symbol: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn limit_request_params() {
        let req = OrderRequest::limit("XRPUSDT", OrderSide::Buy, dec!(5.0), dec!(1.10));
        let params = req.to_params();
        assert!(params.contains(&("symbol".to_string(), "XRPUSDT".to_string())));
        assert!(params.contains(&("type".to_string(), "LIMIT".to_string())));
        assert!(params.contains(&("timeInForce".to_string(), "GTC".to_string())));
        // trailing zeros are trimmed
        assert!(params.contains(&("quantity".to_string(), "5".to_string())));
        assert!(params.contains(&("price".to_string(), "1.1".to_string())));
    }

    #[test]
    fn market_request_omits_price() {
        let req = OrderRequest::market("XRPUSDT", OrderSide::Sell, dec!(2.5));
        let params = req.to_params();
        assert!(!params.iter().any(|(k, _)| k == "price"));
        assert!(!params.iter().any(|(k, _)| k == "timeInForce"));
    }

    #[test]
    fn stop_loss_limit_carries_both_prices() {
        let req =
            OrderRequest::stop_loss_limit("XRPUSDT", OrderSide::Sell, dec!(5), dec!(1.0), dec!(0.999));
        let params = req.to_params();
        assert!(params.contains(&("stopPrice".to_string(), "1".to_string())));
        assert!(params.contains(&("price".to_string(), "0.999".to_string())));
    }

    #[test]
    fn order_ack_parses_string_and_numeric_ids() {
        let ack: OrderAck = serde_json::from_str(
            r#"{"orderId":"C02__443776","symbol":"XRPUSDT","price":"1.10","origQty":"5","status":"NEW"}"#,
        )
        .unwrap();
        assert_eq!(ack.order_id, "C02__443776");
        assert_eq!(ack.price, Some(dec!(1.10)));

        let ack: OrderAck = serde_json::from_str(r#"{"orderId":12345}"#).unwrap();
        assert_eq!(ack.order_id, "12345");
    }

    #[test]
    fn order_status_info_tolerates_missing_fields() {
        let info: OrderStatusInfo =
            serde_json::from_str(r#"{"orderId":"1","status":"PARTIALLY_FILLED"}"#).unwrap();
        assert_eq!(info.status, OrderStatus::PartiallyFilled);
        assert_eq!(info.executed_qty, Decimal::ZERO);
    }

    #[test]
    fn ack_fill_price_prefers_first_fill() {
        let ack: OrderAck = serde_json::from_str(
            r#"{"orderId":"9","fills":[{"price":"0.98","qty":"5"},{"price":"0.97","qty":"1"}]}"#,
        )
        .unwrap();
        assert_eq!(ack.fill_price(), Some(dec!(0.98)));
    }
}
