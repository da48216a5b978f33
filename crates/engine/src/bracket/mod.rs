//! Bracket order lifecycle engine
//!
//! One submission drives one bracket: gate, validate, format, place the LIMIT
//! entry, then hand the position to a monitor task that arms the protective
//! exits after the fill and resolves the SL/TP race.

mod monitor;


use crate::registry::PositionRegistry;
use crate::risk::TradingGate;
use chrono::Utc;
use mexcbot_core::{
    BotConfig, BracketOrder, BracketRequest, BracketState, OrderSide, PositionId, Result,
};
use mexcbot_networking::api;
use mexcbot_networking::catalog::{format_price, format_qty};
use mexcbot_networking::{ExchangeApi, SymbolCatalog};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Engine knobs; the defaults match production behavior
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Monitor poll interval
    pub tick_interval: Duration,
    /// Wait after cancelling a resting exit before the closing market sell
    pub unlock_delay: Duration,
    /// Order size used when a request carries no quantity
    pub default_quantity: Decimal,
    /// Interpret `default_quantity` as a USDT notional
    pub quantity_is_usdt: bool,
    /// Log intended orders instead of placing them
    pub dry_run: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            unlock_delay: Duration::from_millis(500),
            default_quantity: Decimal::TWO,
            quantity_is_usdt: true,
            dry_run: false,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            default_quantity: config.trading.quantity,
            quantity_is_usdt: config.trading.quantity_is_usdt,
            dry_run: config.dry_run,
            ..Self::default()
        }
    }
}

/// Handle to one submitted bracket
pub struct BracketHandle {
    pub id: PositionId,
    cancel: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl BracketHandle {
    /// Request cooperative cancellation; observed at the monitor's next tick.
    /// Calling this on an already-closed bracket is a no-op.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Wait for the monitor task to finish
    pub async fn wait(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

/// Drives bracket orders from submission through closure
pub struct BracketEngine<E> {
    exchange: Arc<E>,
    catalog: Arc<SymbolCatalog<E>>,
    registry: Arc<PositionRegistry>,
    gate: Arc<TradingGate>,
    settings: EngineSettings,
}

impl<E: ExchangeApi + 'static> BracketEngine<E> {
    pub fn new(
        exchange: Arc<E>,
        catalog: Arc<SymbolCatalog<E>>,
        registry: Arc<PositionRegistry>,
        gate: Arc<TradingGate>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            exchange,
            catalog,
            registry,
            gate,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<PositionRegistry> {
        &self.registry
    }

    /// Submit one bracket: gate, validate, place the entry, and spawn its
    /// monitor. The returned handle cancels cooperatively.
    pub async fn submit(&self, request: BracketRequest) -> Result<BracketHandle> {
        let now = Utc::now();
        self.gate.check_open(now)?;
        self.gate.check_quota(now)?;

        let spec = self.catalog.validate(&request.symbol).await?;
        BracketOrder::validate_prices(
            OrderSide::Buy,
            request.entry_price,
            request.sl_price,
            request.tp_price,
        )?;

        let raw_quantity = match request.quantity {
            Some(quantity) => quantity,
            None if self.settings.quantity_is_usdt => {
                self.settings.default_quantity / request.entry_price
            }
            None => self.settings.default_quantity,
        };
        let quantity = format_qty(raw_quantity, &spec)?;
        let entry_price = format_price(request.entry_price, &spec);
        let sl_price = format_price(request.sl_price, &spec);
        let tp_price = format_price(request.tp_price, &spec);

        let mut bracket = BracketOrder::new(
            spec.symbol.clone(),
            OrderSide::Buy,
            quantity,
            entry_price,
            sl_price,
            tp_price,
        )?;

        if self.settings.dry_run {
            info!(
                "DRY RUN: would place bracket on {}: BUY {quantity} @ {entry_price}, SL {sl_price}, TP {tp_price}",
                spec.symbol
            );
            bracket.main_order_id = format!("dry-run-{}", bracket.id);
            return Ok(BracketHandle {
                id: bracket.id,
                cancel: Arc::new(AtomicBool::new(false)),
                task: None,
            });
        }

        let ack = api::place_limit_entry(
            self.exchange.as_ref(),
            &spec.symbol,
            OrderSide::Buy,
            quantity,
            entry_price,
        )
        .await
        .map_err(|e| {
            error!("Entry placement failed, bracket not established: {e}");
            e
        })?;
        self.gate.record_order(now);

        bracket.main_order_id = ack.order_id;
        bracket.state = BracketState::WaitingFill;
        let id = bracket.id;
        info!(
            "Bracket {id} submitted on {}: entry {} @ {entry_price}, SL {sl_price}, TP {tp_price}",
            spec.symbol, bracket.main_order_id
        );
        self.registry.register(bracket)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(monitor::run(
            Arc::clone(&self.exchange),
            Arc::clone(&self.registry),
            spec,
            id,
            Arc::clone(&cancel),
            self.settings.clone(),
        ));

        Ok(BracketHandle {
            id,
            cancel,
            task: Some(task),
        })
    }
}
