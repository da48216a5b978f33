//! Emergency liquidation for oversold-blocked stop losses
//!
//! When a software stop loss's MARKET SELL is refused with the exchange's
//! oversold block, three escalating strategies run in order: unlock +
//! micro-batch selling, a discounted limit ladder, and progressive retries
//! with probe quantities. Each stage reports success or hands the remainder
//! to the next.

use mexcbot_networking::catalog::{format_price, format_qty};
use mexcbot_networking::ExchangeApi;
use mexcbot_core::{Error, OrderRequest, OrderSide, Result, SymbolSpec};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Nominal micro-batch sizes in base-asset units, smallest first
const MICRO_BATCH_UNITS: [Decimal; 5] = [dec!(0.5), dec!(0.8), dec!(1.0), dec!(1.5), dec!(2.0)];
/// Residue below this is not worth another batch
const MICRO_BATCH_RESIDUE: Decimal = dec!(0.05);
/// Micro-batching succeeds once this share of the target is liquidated
const MICRO_BATCH_SUCCESS_RATIO: Decimal = dec!(0.8);
/// Spacing between micro-batch sells
const BATCH_SPACING: Duration = Duration::from_millis(200);
/// Wait after cancelling locking SELL orders
const UNLOCK_WAIT: Duration = Duration::from_secs(1);
/// Wait after each ladder placement before checking for a fill
const LADDER_FILL_WAIT: Duration = Duration::from_secs(1);

/// Ladder discounts off the last-known market price
const LADDER_DISCOUNTS: [Decimal; 4] = [dec!(0.005), dec!(0.01), dec!(0.02), dec!(0.03)];

/// Progressive-retry delays
const RETRY_DELAYS: [Duration; 4] = [
    Duration::from_millis(500),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];
/// Probe size for the first retry, in base units
const RETRY_PROBE_UNITS: Decimal = dec!(0.1);

/// Which stage finally got the position down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationStage {
    MicroBatch,
    DiscountLadder,
    ProgressiveRetry,
}

/// What the liquidator managed to do
#[derive(Debug, Clone)]
pub struct LiquidationReport {
    pub stage: LiquidationStage,
    /// Quantity sold via immediate fills; ladder orders left resting in the
    /// book are not counted here
    pub sold: Decimal,
    pub order_ids: Vec<String>,
}

/// Run the three-stage emergency liquidation for `quantity` base units.
///
/// `last_price` is the most recent known market price (used for the ladder).
/// A non-oversold error in the final stage escalates to the caller.
pub async fn liquidate<E: ExchangeApi>(
    exchange: &E,
    spec: &SymbolSpec,
    quantity: Decimal,
    last_price: Decimal,
) -> Result<LiquidationReport> {
    error!(
        "Oversold block on {}: engaging emergency liquidation for {quantity}",
        spec.symbol
    );

    let (sold, mut order_ids) = stage_micro_batch(exchange, spec, quantity).await;
    if sold >= quantity * MICRO_BATCH_SUCCESS_RATIO {
        warn!("Micro-batch selling liquidated {sold}/{quantity}");
        return Ok(LiquidationReport {
            stage: LiquidationStage::MicroBatch,
            sold,
            order_ids,
        });
    }
    let remaining = quantity - sold;

    if let Some((ladder_sold, ladder_ids)) =
        stage_discount_ladder(exchange, spec, remaining, last_price).await
    {
        order_ids.extend(ladder_ids);
        warn!(
            "Discount ladder handled the remaining {remaining} ({} filled immediately)",
            ladder_sold
        );
        return Ok(LiquidationReport {
            stage: LiquidationStage::DiscountLadder,
            sold: sold + ladder_sold,
            order_ids,
        });
    }

    let (retry_sold, retry_ids) = stage_progressive_retry(exchange, spec, remaining).await?;
    order_ids.extend(retry_ids);
    warn!("Progressive retry liquidated {retry_sold}/{remaining}");
    Ok(LiquidationReport {
        stage: LiquidationStage::ProgressiveRetry,
        sold: sold + retry_sold,
        order_ids,
    })
}

/// Stage 1: cancel locking SELL orders, then sell progressively larger
/// micro-batches. Returns what was sold and the resulting order ids.
async fn stage_micro_batch<E: ExchangeApi>(
    exchange: &E,
    spec: &SymbolSpec,
    quantity: Decimal,
) -> (Decimal, Vec<String>) {
    warn!("Emergency stage 1: micro-batch selling of {quantity} {}", spec.base_asset);

    // A live SELL order locks the base quantity; clear them first.
    match exchange.open_orders(&spec.symbol).await {
        Ok(orders) => {
            for order in orders.iter().filter(|o| o.is_sell()) {
                match exchange.cancel_order(&spec.symbol, &order.order_id).await {
                    Ok(_) => warn!("Cancelled locking SELL order {}", order.order_id),
                    Err(e) => warn!("Could not cancel SELL order {}: {e}", order.order_id),
                }
            }
        }
        Err(e) => warn!("Could not check open orders before micro-batching: {e}"),
    }
    sleep(UNLOCK_WAIT).await;

    let batches = micro_batches(quantity, spec);
    info!("Created {} micro-batches: {batches:?}", batches.len());

    let mut sold = Decimal::ZERO;
    let mut order_ids = Vec::new();
    for (index, batch) in batches.iter().enumerate() {
        let request = OrderRequest::market(&spec.symbol, OrderSide::Sell, *batch);
        match exchange.place_order(&request).await {
            Ok(ack) => {
                info!("Micro-batch {}/{} sold: {batch}", index + 1, batches.len());
                sold += *batch;
                order_ids.push(ack.order_id);
            }
            Err(e) if e.is_oversold() => {
                warn!("Micro-batch {} still blocked by oversold, stopping stage", index + 1);
                break;
            }
            Err(e) => {
                warn!("Micro-batch {} failed: {e}", index + 1);
                continue;
            }
        }
        sleep(BATCH_SPACING).await;
    }
    (sold, order_ids)
}

/// Partition a quantity into the progressive micro-batch sequence, formatted
/// against the symbol's step and summing to (at most) the original
fn micro_batches(quantity: Decimal, spec: &SymbolSpec) -> Vec<Decimal> {
    let mut batches = Vec::new();
    let mut remaining = quantity;
    for unit in MICRO_BATCH_UNITS {
        if remaining <= Decimal::ZERO {
            break;
        }
        let nominal = unit.min(remaining);
        if let Ok(batch) = format_qty(nominal, spec) {
            batches.push(batch);
            remaining -= batch;
        }
        if remaining <= MICRO_BATCH_RESIDUE {
            break;
        }
    }
    if remaining > MICRO_BATCH_RESIDUE {
        if let Ok(batch) = format_qty(remaining, spec) {
            batches.push(batch);
        }
    }
    batches
}

/// Stage 2: rest LIMIT SELLs at progressively worse prices. Succeeds when at
/// least one order was placed; a fill short-circuits the ladder.
async fn stage_discount_ladder<E: ExchangeApi>(
    exchange: &E,
    spec: &SymbolSpec,
    quantity: Decimal,
    last_price: Decimal,
) -> Option<(Decimal, Vec<String>)> {
    warn!("Emergency stage 2: discounted limit ladder for {quantity}");
    if last_price <= Decimal::ZERO {
        warn!("No usable market price, skipping the ladder");
        return None;
    }
    let quantity = match format_qty(quantity, spec) {
        Ok(q) => q,
        Err(e) => {
            warn!("Remaining quantity not sellable as a limit order: {e}");
            return None;
        }
    };

    let mut placed = Vec::new();
    for discount in LADDER_DISCOUNTS {
        let price = format_price(last_price * (Decimal::ONE - discount), spec);
        let request = OrderRequest::limit(&spec.symbol, OrderSide::Sell, quantity, price);
        match exchange.place_order(&request).await {
            Ok(ack) => {
                warn!(
                    "Ladder LIMIT placed at {price} ({}% off): {}",
                    discount * dec!(100),
                    ack.order_id
                );
                placed.push(ack.order_id.clone());
                sleep(LADDER_FILL_WAIT).await;
                match exchange.order_status(&spec.symbol, &ack.order_id).await {
                    Ok(status) if status.status == mexcbot_core::OrderStatus::Filled => {
                        warn!("Ladder order {} filled immediately", ack.order_id);
                        return Some((quantity, placed));
                    }
                    Ok(status) => {
                        info!("Ladder order {} resting ({})", ack.order_id, status.status)
                    }
                    Err(e) => info!("Could not check ladder order {}: {e}", ack.order_id),
                }
            }
            Err(e) => warn!("Ladder placement at {price} failed: {e}"),
        }
    }

    if placed.is_empty() {
        None
    } else {
        // resting orders may still fill as the price moves
        Some((Decimal::ZERO, placed))
    }
}

/// Stage 3: retry MARKET SELL with growing delays and probe quantities.
/// A successful probe is followed up with the remainder. Non-oversold errors
/// escalate.
async fn stage_progressive_retry<E: ExchangeApi>(
    exchange: &E,
    spec: &SymbolSpec,
    quantity: Decimal,
) -> Result<(Decimal, Vec<String>)> {
    warn!("Emergency stage 3: progressive market-sell retries for {quantity}");
    let full = format_qty(quantity, spec).unwrap_or(spec.min_qty);
    let probes = [
        format_qty(RETRY_PROBE_UNITS, spec).unwrap_or(spec.min_qty),
        format_qty(full / Decimal::TWO, spec).unwrap_or(spec.min_qty),
        full,
        full,
    ];

    for (delay, probe) in RETRY_DELAYS.iter().zip(probes) {
        info!("Waiting {delay:?} for the oversold condition to clear");
        sleep(*delay).await;

        let request = OrderRequest::market(&spec.symbol, OrderSide::Sell, probe);
        match exchange.place_order(&request).await {
            Ok(ack) => {
                warn!("Retry sell of {probe} succeeded, oversold condition cleared");
                let mut sold = probe;
                let mut order_ids = vec![ack.order_id];
                if probe < full {
                    if let Ok(rest) = format_qty(full - probe, spec) {
                        let follow_up = OrderRequest::market(&spec.symbol, OrderSide::Sell, rest);
                        match exchange.place_order(&follow_up).await {
                            Ok(rest_ack) => {
                                sold += rest;
                                order_ids.push(rest_ack.order_id);
                            }
                            Err(e) => {
                                warn!("Could not sell remaining {rest}: {e}");
                            }
                        }
                    }
                }
                return Ok((sold, order_ids));
            }
            Err(e) if e.is_oversold() => continue,
            Err(e) => {
                error!("Non-oversold error during retries, escalating: {e}");
                return Err(e);
            }
        }
    }

    Err(Error::OversoldBlocked(
        "emergency liquidation exhausted all retries".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xrp_spec() -> SymbolSpec {
        SymbolSpec {
            symbol: "XRPUSDT".to_string(),
            status: "ENABLED".to_string(),
            spot_allowed: true,
            base_asset: "XRP".to_string(),
            quote_asset: "USDT".to_string(),
            step_size: dec!(0.1),
            tick_size: dec!(0.0001),
            min_qty: dec!(0.1),
            max_qty: dec!(90000),
        }
    }

    #[test]
    fn partitions_five_units_into_progressive_batches() {
        let batches = micro_batches(dec!(5), &xrp_spec());
        assert_eq!(
            batches,
            vec![dec!(0.5), dec!(0.8), dec!(1), dec!(1.5), dec!(1.2)]
        );
        let total: Decimal = batches.iter().sum();
        assert_eq!(total, dec!(5));
    }

    #[test]
    fn small_targets_stop_early() {
        let batches = micro_batches(dec!(1.0), &xrp_spec());
        assert_eq!(batches, vec![dec!(0.5), dec!(0.5)]);
    }

    #[test]
    fn residue_below_threshold_is_dropped() {
        // 0.5 + 0.8 + 1.0 + 1.5 + 2.0 = 5.8; 0.04 of residue is left unsold
        let batches = micro_batches(dec!(5.84), &xrp_spec());
        let total: Decimal = batches.iter().sum();
        assert_eq!(total, dec!(5.8));
    }
}
