//! Order placement with validation and the protective-order cascade

use crate::catalog::format_price;
use crate::exchange::ExchangeApi;
use mexcbot_core::{
    Error, OcoAck, OcoRequest, OrderAck, OrderRequest, OrderSide, ProtectionMode, Result,
    SymbolSpec, TimeInForce,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};
use uuid::Uuid;

/// Unfavorable offset between a protective trigger and its limit price
/// (0.1 %), so the limit is immediately executable once triggered
const PROTECTIVE_LIMIT_OFFSET: Decimal = dec!(0.001);

/// Place the bracket's entry: a plain LIMIT order, good-till-canceled
pub async fn place_limit_entry<E: ExchangeApi>(
    exchange: &E,
    symbol: &str,
    side: OrderSide,
    quantity: Decimal,
    price: Decimal,
) -> Result<OrderAck> {
    if quantity <= Decimal::ZERO {
        return Err(Error::ConfigError(format!(
            "order quantity must be positive, got {quantity}"
        )));
    }
    if price <= Decimal::ZERO {
        return Err(Error::ConfigError(format!(
            "order price must be positive, got {price}"
        )));
    }

    info!("Placing {side} LIMIT entry: {quantity} {symbol} @ {price}");
    exchange
        .place_order(&OrderRequest::limit(symbol, side, quantity, price))
        .await
}

/// Outcome of arming one bracket's protective exits.
///
/// A side that could not be placed natively degrades to software monitoring;
/// per-side failures are collected rather than surfaced, since partial arming
/// must not prevent the bracket from becoming protected.
#[derive(Debug, Clone)]
pub struct ProtectionPlan {
    pub sl_mode: ProtectionMode,
    pub sl_order_id: Option<String>,
    pub tp_mode: ProtectionMode,
    pub tp_order_id: Option<String>,
    pub errors: Vec<String>,
}

impl ProtectionPlan {
    fn software_only() -> Self {
        Self {
            sl_mode: ProtectionMode::Software,
            sl_order_id: None,
            tp_mode: ProtectionMode::Software,
            tp_order_id: None,
            errors: Vec::new(),
        }
    }
}

/// Arm SL and TP for a filled entry, cascading from native conditional orders
/// down to software monitoring:
///
/// 1. STOP_LOSS_LIMIT / TAKE_PROFIT_LIMIT with a 0.1 % unfavorable limit.
/// 2. On an "invalid type" rejection, plain STOP_LOSS for the SL and a plain
///    LIMIT for the TP.
/// 3. A plain-LIMIT TP that would fill immediately at spot is skipped.
/// 4. Anything still failing leaves that side in software mode.
pub async fn arm_protective_orders<E: ExchangeApi>(
    exchange: &E,
    spec: &SymbolSpec,
    close_side: OrderSide,
    quantity: Decimal,
    sl_price: Decimal,
    tp_price: Decimal,
) -> ProtectionPlan {
    let mut plan = ProtectionPlan::software_only();
    let symbol = spec.symbol.as_str();

    // Stop loss: trigger at sl_price, rest 0.1% past it in the close direction
    let sl_trigger = format_price(sl_price, spec);
    let sl_limit = format_price(offset_against(sl_price, close_side), spec);
    let sl_request =
        OrderRequest::stop_loss_limit(symbol, close_side, quantity, sl_trigger, sl_limit);
    match exchange.place_order(&sl_request).await {
        Ok(ack) => {
            info!("Native STOP_LOSS_LIMIT armed: {} @ {sl_trigger}", ack.order_id);
            plan.sl_mode = ProtectionMode::Native;
            plan.sl_order_id = Some(ack.order_id);
        }
        Err(e) if is_invalid_type_rejection(&e) => {
            warn!("STOP_LOSS_LIMIT rejected ({e}), trying plain STOP_LOSS");
            match exchange
                .place_order(&OrderRequest::stop_loss(symbol, close_side, quantity, sl_trigger))
                .await
            {
                Ok(ack) => {
                    info!("Native STOP_LOSS armed: {} @ {sl_trigger}", ack.order_id);
                    plan.sl_mode = ProtectionMode::Native;
                    plan.sl_order_id = Some(ack.order_id);
                }
                Err(e) => {
                    warn!("Stop-loss falls back to software monitoring: {e}");
                    plan.errors.push(format!("stop-loss: {e}"));
                }
            }
        }
        Err(e) => {
            warn!("Stop-loss falls back to software monitoring: {e}");
            plan.errors.push(format!("stop-loss: {e}"));
        }
    }

    // Take profit: trigger at tp_price, rest 0.1% past it in the close direction
    let tp_trigger = format_price(tp_price, spec);
    let tp_limit = format_price(offset_against(tp_price, close_side), spec);
    let tp_request =
        OrderRequest::take_profit_limit(symbol, close_side, quantity, tp_trigger, tp_limit);
    match exchange.place_order(&tp_request).await {
        Ok(ack) => {
            info!("Native TAKE_PROFIT_LIMIT armed: {} @ {tp_trigger}", ack.order_id);
            plan.tp_mode = ProtectionMode::Native;
            plan.tp_order_id = Some(ack.order_id);
        }
        Err(e) if is_invalid_type_rejection(&e) => {
            let spot = exchange.ticker_price(symbol).await;
            if would_fill_immediately(tp_limit, spot, close_side) {
                warn!(
                    "Plain-LIMIT take profit at {tp_limit} would fill immediately at spot {spot}, using software monitoring"
                );
            } else {
                warn!("TAKE_PROFIT_LIMIT rejected ({e}), trying plain LIMIT");
                match exchange
                    .place_order(&OrderRequest::limit(symbol, close_side, quantity, tp_trigger))
                    .await
                {
                    Ok(ack) => {
                        info!("Take profit armed as plain LIMIT: {} @ {tp_trigger}", ack.order_id);
                        plan.tp_mode = ProtectionMode::Native;
                        plan.tp_order_id = Some(ack.order_id);
                    }
                    Err(e) => {
                        warn!("Take profit falls back to software monitoring: {e}");
                        plan.errors.push(format!("take-profit: {e}"));
                    }
                }
            }
        }
        Err(e) => {
            warn!("Take profit falls back to software monitoring: {e}");
            plan.errors.push(format!("take-profit: {e}"));
        }
    }

    plan
}

/// Result of the preferred user-visible bracket placement path
#[derive(Debug, Clone)]
pub enum BracketPlacement {
    /// Native OCO covering entry + SL, with the TP as a separate LIMIT
    Oco {
        oco: OcoAck,
        tp_order_id: Option<String>,
    },
    /// Entry placed alone; protective orders are armed after the fill
    Sequential { entry: OrderAck },
}

/// Place a "simple bracket": native OCO first, sequential fallback.
///
/// OCO success on this venue has never been reliable, so any failure falls
/// through to the sequential path rather than being retried.
pub async fn place_simple_bracket<E: ExchangeApi>(
    exchange: &E,
    spec: &SymbolSpec,
    quantity: Decimal,
    entry_price: Decimal,
    sl_price: Decimal,
    tp_price: Decimal,
) -> Result<BracketPlacement> {
    let symbol = spec.symbol.as_str();
    let oco = OcoRequest {
        symbol: symbol.to_string(),
        side: OrderSide::Buy,
        quantity,
        price: format_price(entry_price, spec),
        stop_price: format_price(sl_price, spec),
        stop_limit_price: format_price(offset_against(sl_price, OrderSide::Sell), spec),
        stop_limit_time_in_force: TimeInForce::Gtc,
        list_client_order_id: format!("bracket-{}", Uuid::new_v4().simple()),
    };

    match exchange.place_oco(&oco).await {
        Ok(ack) => {
            info!("Native OCO bracket placed ({:?} legs)", ack.orders.len());
            let tp_order_id = match exchange
                .place_order(&OrderRequest::limit(
                    symbol,
                    OrderSide::Sell,
                    quantity,
                    format_price(tp_price, spec),
                ))
                .await
            {
                Ok(tp) => Some(tp.order_id),
                Err(e) => {
                    warn!("TP leg after OCO failed, leaving take profit to software: {e}");
                    None
                }
            };
            Ok(BracketPlacement::Oco {
                oco: ack,
                tp_order_id,
            })
        }
        Err(e) => {
            warn!("OCO placement failed ({e}), falling back to sequential bracket");
            let entry = place_limit_entry(
                exchange,
                symbol,
                OrderSide::Buy,
                quantity,
                format_price(entry_price, spec),
            )
            .await?;
            Ok(BracketPlacement::Sequential { entry })
        }
    }
}

/// Move a protective limit 0.1 % past its trigger in the close direction:
/// below for SELL exits, above for BUY exits
fn offset_against(trigger: Decimal, close_side: OrderSide) -> Decimal {
    match close_side {
        OrderSide::Sell => trigger * (Decimal::ONE - PROTECTIVE_LIMIT_OFFSET),
        OrderSide::Buy => trigger * (Decimal::ONE + PROTECTIVE_LIMIT_OFFSET),
    }
}

/// Whether a resting limit at `limit_price` would execute against spot on
/// arrival
fn would_fill_immediately(limit_price: Decimal, spot: Decimal, close_side: OrderSide) -> bool {
    if spot.is_zero() {
        return false;
    }
    match close_side {
        OrderSide::Sell => limit_price <= spot,
        OrderSide::Buy => limit_price >= spot,
    }
}

/// A server rejection that indicates the order *type* is unsupported, as
/// opposed to a transient or balance problem
fn is_invalid_type_rejection(error: &Error) -> bool {
    match error {
        Error::ExchangeOther { body, .. } => {
            let lowered = body.to_lowercase();
            lowered.contains("invalid") && lowered.contains("type")
                || lowered.contains("not support")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_move_against_the_close() {
        assert_eq!(offset_against(dec!(1.0), OrderSide::Sell), dec!(0.999));
        assert_eq!(offset_against(dec!(1.0), OrderSide::Buy), dec!(1.001));
    }

    #[test]
    fn immediate_fill_detection() {
        assert!(would_fill_immediately(dec!(1.0), dec!(1.1), OrderSide::Sell));
        assert!(!would_fill_immediately(dec!(1.2), dec!(1.1), OrderSide::Sell));
        assert!(would_fill_immediately(dec!(1.2), dec!(1.1), OrderSide::Buy));
        // zero spot means "price unknown": never claim an immediate fill
        assert!(!would_fill_immediately(dec!(1.0), Decimal::ZERO, OrderSide::Sell));
    }

    #[test]
    fn invalid_type_rejections_are_recognized() {
        let invalid = Error::ExchangeOther {
            status: 400,
            code: Some(-1116),
            body: "Invalid orderType.".to_string(),
        };
        assert!(is_invalid_type_rejection(&invalid));

        let unsupported = Error::ExchangeOther {
            status: 400,
            code: None,
            body: "order type not supported".to_string(),
        };
        assert!(is_invalid_type_rejection(&unsupported));

        assert!(!is_invalid_type_rejection(&Error::RateLimited));
        assert!(!is_invalid_type_rejection(&Error::InsufficientBalance(
            "x".to_string()
        )));
    }
}
