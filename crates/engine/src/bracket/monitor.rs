//! The per-bracket monitor loop
//!
//! One task per bracket. Each tick observes, in order: the cancellation flag,
//! the entry fill, native exits (SL before TP), then software exits (SL
//! before TP). At most one exit fires per tick; once the state has advanced,
//! any second qualifying condition is discarded.

use super::EngineSettings;
use crate::liquidator;
use crate::registry::PositionRegistry;
use chrono::Utc;
use mexcbot_core::{
    BracketOrder, BracketState, Error, OrderRequest, OrderStatus, PositionId, ProtectionMode,
    SymbolSpec,
};
use mexcbot_networking::api;
use mexcbot_networking::ExchangeApi;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Which protective exit closed the bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitKind {
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for ExitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitKind::StopLoss => f.write_str("stop loss"),
            ExitKind::TakeProfit => f.write_str("take profit"),
        }
    }
}

/// Whether the monitor keeps ticking after this step
enum Flow {
    Continue,
    Stop,
}

pub(super) async fn run<E: ExchangeApi>(
    exchange: Arc<E>,
    registry: Arc<PositionRegistry>,
    spec: SymbolSpec,
    id: PositionId,
    cancel: Arc<AtomicBool>,
    settings: EngineSettings,
) {
    let mut last_price = Decimal::ZERO;
    loop {
        if cancel.load(Ordering::Relaxed) {
            handle_external_cancel(exchange.as_ref(), &registry, &spec, &id).await;
            return;
        }

        let Some(bracket) = registry.get(&id) else {
            return;
        };

        let flow = match bracket.state {
            BracketState::WaitingFill => {
                tick_waiting_fill(exchange.as_ref(), &registry, &spec, &id, &bracket).await
            }
            BracketState::Protected => {
                tick_protected(
                    exchange.as_ref(),
                    &registry,
                    &spec,
                    &id,
                    bracket,
                    &mut last_price,
                    &settings,
                )
                .await
            }
            state if state.is_terminal() => return,
            state => {
                debug!("Bracket {id} in transient state {state}, waiting");
                Flow::Continue
            }
        };

        if let Flow::Stop = flow {
            return;
        }
        sleep(settings.tick_interval).await;
    }
}

/// Poll the entry order until it fills or terminally fails, then arm the
/// protective exits
async fn tick_waiting_fill<E: ExchangeApi>(
    exchange: &E,
    registry: &PositionRegistry,
    spec: &SymbolSpec,
    id: &PositionId,
    bracket: &BracketOrder,
) -> Flow {
    let status = match exchange.order_status(&spec.symbol, &bracket.main_order_id).await {
        Ok(status) => status,
        Err(e) => return transient(registry, id, e),
    };

    match status.status {
        OrderStatus::Filled => {
            info!("Bracket {id}: entry {} filled", bracket.main_order_id);
            registry.update(id, |b| {
                b.state = BracketState::MainFilled;
                b.filled_at = Some(Utc::now());
            });

            // BUY entries close with a SELL; anything else is a programming error
            let close_side = bracket.side.opposite();
            debug_assert_eq!(close_side, mexcbot_core::OrderSide::Sell);

            let plan = api::arm_protective_orders(
                exchange,
                spec,
                close_side,
                bracket.quantity,
                bracket.sl_price,
                bracket.tp_price,
            )
            .await;
            if !plan.errors.is_empty() {
                warn!(
                    "Bracket {id}: protective arming partial ({}), affected sides run in software mode",
                    plan.errors.join("; ")
                );
            }
            let partial = plan.errors.join("; ");
            registry.update(id, |b| {
                b.sl_mode = plan.sl_mode;
                b.sl_order_id = plan.sl_order_id.clone();
                b.tp_mode = plan.tp_mode;
                b.tp_order_id = plan.tp_order_id.clone();
                if !partial.is_empty() {
                    b.last_error = Some(partial.clone());
                }
                b.state = BracketState::Protected;
            });
            info!(
                "Bracket {id} protected: SL {:?} / TP {:?}",
                plan.sl_mode, plan.tp_mode
            );
            Flow::Continue
        }
        ref s if s.is_terminal_non_fill() => {
            warn!("Bracket {id}: entry {} was {s}, failing bracket", bracket.main_order_id);
            registry.update(id, |b| {
                b.state = BracketState::Failed;
                b.last_error = Some(format!("entry order {s}"));
            });
            registry.remove(id);
            Flow::Stop
        }
        _ => Flow::Continue,
    }
}

/// One PROTECTED tick: native SL, software SL, native TP, software TP
async fn tick_protected<E: ExchangeApi>(
    exchange: &E,
    registry: &PositionRegistry,
    spec: &SymbolSpec,
    id: &PositionId,
    mut bracket: BracketOrder,
    last_price: &mut Decimal,
    settings: &EngineSettings,
) -> Flow {
    // One price fetch per tick; zero means unknown, keep the last known
    if bracket.sl_mode == ProtectionMode::Software || bracket.tp_mode == ProtectionMode::Software {
        let price = exchange.ticker_price(&spec.symbol).await;
        if price > Decimal::ZERO {
            *last_price = price;
        }
    }
    let price = *last_price;

    // 1. Native stop loss
    if bracket.sl_mode == ProtectionMode::Native {
        match bracket.sl_order_id.clone() {
            Some(sl_id) => match exchange.order_status(&spec.symbol, &sl_id).await {
                Ok(status) => match status.status {
                    OrderStatus::Filled => {
                        warn!("Bracket {id}: native stop loss {sl_id} filled");
                        let fill_price = if status.price > Decimal::ZERO {
                            status.price
                        } else {
                            bracket.sl_price
                        };
                        return close_after_native_exit(
                            exchange,
                            registry,
                            spec,
                            id,
                            &bracket,
                            ExitKind::StopLoss,
                            bracket.tp_order_id.clone(),
                            fill_price,
                        )
                        .await;
                    }
                    ref s if s.is_terminal_non_fill() => {
                        warn!(
                            "Bracket {id}: native stop loss {sl_id} was {s}, downgrading to software"
                        );
                        registry.update(id, |b| {
                            b.sl_mode = ProtectionMode::Software;
                            b.sl_order_id = None;
                        });
                        bracket.sl_mode = ProtectionMode::Software;
                        bracket.sl_order_id = None;
                    }
                    _ => {}
                },
                Err(e) => return transient(registry, id, e),
            },
            None => {
                // native without an id cannot be observed; fall back
                registry.update(id, |b| b.sl_mode = ProtectionMode::Software);
                bracket.sl_mode = ProtectionMode::Software;
            }
        }
    }

    // 2. Software stop loss
    if bracket.sl_mode == ProtectionMode::Software
        && price > Decimal::ZERO
        && price <= bracket.sl_price
    {
        warn!(
            "Bracket {id}: software stop loss triggered (price {price} <= {})",
            bracket.sl_price
        );
        return execute_software_exit(
            exchange,
            registry,
            spec,
            id,
            &bracket,
            ExitKind::StopLoss,
            bracket.tp_order_id.clone(),
            price,
            settings,
        )
        .await;
    }

    // 3. Native take profit
    if bracket.tp_mode == ProtectionMode::Native {
        if let Some(tp_id) = bracket.tp_order_id.clone() {
            match exchange.order_status(&spec.symbol, &tp_id).await {
                Ok(status) => match status.status {
                    OrderStatus::Filled => {
                        info!("Bracket {id}: native take profit {tp_id} filled");
                        let fill_price = if status.price > Decimal::ZERO {
                            status.price
                        } else {
                            bracket.tp_price
                        };
                        return close_after_native_exit(
                            exchange,
                            registry,
                            spec,
                            id,
                            &bracket,
                            ExitKind::TakeProfit,
                            bracket.sl_order_id.clone(),
                            fill_price,
                        )
                        .await;
                    }
                    ref s if s.is_terminal_non_fill() => {
                        warn!(
                            "Bracket {id}: native take profit {tp_id} was {s}, downgrading to software"
                        );
                        registry.update(id, |b| {
                            b.tp_mode = ProtectionMode::Software;
                            b.tp_order_id = None;
                        });
                        bracket.tp_mode = ProtectionMode::Software;
                        bracket.tp_order_id = None;
                    }
                    _ => {}
                },
                Err(e) => return transient(registry, id, e),
            }
        } else {
            registry.update(id, |b| b.tp_mode = ProtectionMode::Software);
            bracket.tp_mode = ProtectionMode::Software;
        }
    }

    // 4. Software take profit
    if bracket.tp_mode == ProtectionMode::Software
        && price > Decimal::ZERO
        && price >= bracket.tp_price
    {
        info!(
            "Bracket {id}: software take profit triggered (price {price} >= {})",
            bracket.tp_price
        );
        return execute_software_exit(
            exchange,
            registry,
            spec,
            id,
            &bracket,
            ExitKind::TakeProfit,
            bracket.sl_order_id.clone(),
            price,
            settings,
        )
        .await;
    }

    Flow::Continue
}

/// A native exit filled: enter CLOSING, cancel the sibling, close out
#[allow(clippy::too_many_arguments)]
async fn close_after_native_exit<E: ExchangeApi>(
    exchange: &E,
    registry: &PositionRegistry,
    spec: &SymbolSpec,
    id: &PositionId,
    bracket: &BracketOrder,
    exit: ExitKind,
    sibling: Option<String>,
    fill_price: Decimal,
) -> Flow {
    registry.update(id, |b| b.state = BracketState::Closing);
    if let Some(other) = sibling {
        match exchange.cancel_order(&spec.symbol, &other).await {
            Ok(_) => info!("Bracket {id}: cancelled sibling exit {other}"),
            Err(e) => warn!("Bracket {id}: could not cancel sibling exit {other}: {e}"),
        }
    }
    finalize_close(registry, id, bracket, exit, fill_price)
}

/// A software exit fired: cancel the resting sibling first (it locks the base
/// quantity), wait for the cancellation to register, then market-sell. An
/// oversold block on a stop loss hands off to the emergency liquidator.
#[allow(clippy::too_many_arguments)]
async fn execute_software_exit<E: ExchangeApi>(
    exchange: &E,
    registry: &PositionRegistry,
    spec: &SymbolSpec,
    id: &PositionId,
    bracket: &BracketOrder,
    exit: ExitKind,
    sibling: Option<String>,
    trigger_price: Decimal,
    settings: &EngineSettings,
) -> Flow {
    if let Some(other) = sibling {
        warn!("Bracket {id}: cancelling resting exit {other} to unlock quantity");
        match exchange.cancel_order(&spec.symbol, &other).await {
            Ok(_) => {
                registry.update(id, |b| {
                    if b.sl_order_id.as_deref() == Some(other.as_str()) {
                        b.sl_order_id = None;
                    }
                    if b.tp_order_id.as_deref() == Some(other.as_str()) {
                        b.tp_order_id = None;
                    }
                });
            }
            Err(e) => {
                error!(
                    "Bracket {id}: could not cancel {other}, quantity may still be locked: {e}"
                );
            }
        }
        sleep(settings.unlock_delay).await;
    }

    let close_side = bracket.side.opposite();
    let request = OrderRequest::market(&spec.symbol, close_side, bracket.quantity);
    match exchange.place_order(&request).await {
        Ok(ack) => {
            warn!("Bracket {id}: software {exit} executed as {}", ack.order_id);
            registry.update(id, |b| b.state = BracketState::Closing);
            let fill_price = ack.fill_price().unwrap_or(trigger_price);
            finalize_close(registry, id, bracket, exit, fill_price)
        }
        Err(Error::OversoldBlocked(reason)) if exit == ExitKind::StopLoss => {
            error!("Bracket {id}: market sell refused ({reason}), engaging emergency liquidation");
            match liquidator::liquidate(exchange, spec, bracket.quantity, trigger_price).await {
                Ok(report) => {
                    warn!(
                        "Bracket {id}: emergency liquidation via {:?} sold {} across {} orders",
                        report.stage,
                        report.sold,
                        report.order_ids.len()
                    );
                    registry.update(id, |b| b.state = BracketState::Closing);
                    finalize_close(registry, id, bracket, exit, trigger_price)
                }
                Err(e) => {
                    error!("Bracket {id}: emergency liquidation failed: {e}");
                    transient(registry, id, e)
                }
            }
        }
        Err(e) => {
            warn!("Bracket {id}: software {exit} could not close position: {e}");
            transient(registry, id, e)
        }
    }
}

/// Terminal bookkeeping shared by every close path
fn finalize_close(
    registry: &PositionRegistry,
    id: &PositionId,
    bracket: &BracketOrder,
    exit: ExitKind,
    fill_price: Decimal,
) -> Flow {
    let pnl = bracket.realized_pnl(fill_price);
    registry.update(id, |b| {
        b.state = BracketState::Closed;
        b.closed_at = Some(Utc::now());
    });
    info!("Bracket {id} closed via {exit} at {fill_price}, realized PnL {pnl}");
    registry.remove(id);
    Flow::Stop
}

/// Record a transient failure and keep ticking
fn transient(registry: &PositionRegistry, id: &PositionId, error: Error) -> Flow {
    debug!("Bracket {id}: transient error, retrying next tick: {error}");
    registry.update(id, |b| b.last_error = Some(error.to_string()));
    Flow::Continue
}

/// External cancellation: cancel whatever is live, then close out the bracket
async fn handle_external_cancel<E: ExchangeApi>(
    exchange: &E,
    registry: &PositionRegistry,
    spec: &SymbolSpec,
    id: &PositionId,
) {
    let Some(bracket) = registry.get(id) else {
        return;
    };
    if bracket.state.is_terminal() {
        return;
    }
    info!("Bracket {id}: external cancellation requested");
    registry.update(id, |b| b.state = BracketState::Closing);

    let mut live_orders = Vec::new();
    if bracket.state == BracketState::WaitingFill {
        live_orders.push(bracket.main_order_id.clone());
    }
    live_orders.extend(bracket.sl_order_id.clone());
    live_orders.extend(bracket.tp_order_id.clone());

    for order_id in live_orders {
        match exchange.cancel_order(&spec.symbol, &order_id).await {
            Ok(_) => info!("Bracket {id}: cancelled order {order_id}"),
            Err(e) => warn!("Bracket {id}: could not cancel order {order_id}: {e}"),
        }
    }

    registry.update(id, |b| {
        b.state = BracketState::Closed;
        b.closed_at = Some(Utc::now());
        b.last_error = Some("cancelled by caller".to_string());
    });
    registry.remove(id);
}
