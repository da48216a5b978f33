//! Scripted exchange double for engine tests
//!
//! Order ids are assigned sequentially from 1 in placement order, so tests
//! script statuses against known ids (the entry is always "1").

use async_trait::async_trait;
use mexcbot_core::{
    AccountInfo, Error, ExchangeInfo, Fill, OcoAck, OcoLeg, OcoRequest, OrderAck, OrderRequest,
    OrderStatus, OrderStatusInfo, OrderType, Result,
};
use mexcbot_networking::ExchangeApi;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;

/// Failure modes a test can script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScriptedError {
    InvalidType,
    Oversold,
}

impl ScriptedError {
    fn to_error(self) -> Error {
        match self {
            ScriptedError::InvalidType => Error::ExchangeOther {
                status: 400,
                code: Some(-1116),
                body: "Invalid order type.".to_string(),
            },
            ScriptedError::Oversold => Error::OversoldBlocked("Oversold".to_string()),
        }
    }
}

/// A successfully placed order, with its assigned id and placement instant
#[derive(Debug, Clone)]
pub(crate) struct PlacedOrder {
    pub request: OrderRequest,
    pub order_id: String,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub(crate) struct CancelRecord {
    pub order_id: String,
    pub at: Instant,
}

pub(crate) struct MockExchange {
    info: ExchangeInfo,
    prices: Mutex<VecDeque<Decimal>>,
    last_price: Mutex<Decimal>,
    statuses: Mutex<HashMap<String, VecDeque<OrderStatus>>>,
    rejected_types: Mutex<HashSet<OrderType>>,
    market_sell_errors: Mutex<VecDeque<ScriptedError>>,
    open_orders_response: Mutex<Vec<OrderStatusInfo>>,
    oco_accepted: AtomicBool,
    pub placed: Mutex<Vec<PlacedOrder>>,
    pub cancelled: Mutex<Vec<CancelRecord>>,
    pub oco_requests: Mutex<Vec<OcoRequest>>,
    next_id: AtomicU64,
}

impl MockExchange {
    /// A venue listing one tradable symbol: XRPUSDT with step 0.1
    pub(crate) fn xrp() -> Self {
        let info: ExchangeInfo = serde_json::from_str(
            r#"{
                "symbols": [{
                    "symbol": "XRPUSDT",
                    "status": "ENABLED",
                    "baseAsset": "XRP",
                    "quoteAsset": "USDT",
                    "isSpotTradingAllowed": true,
                    "filters": [
                        {"filterType": "LOT_SIZE", "stepSize": "0.1", "minQty": "0.1", "maxQty": "90000"},
                        {"filterType": "PRICE_FILTER", "tickSize": "0.0001"}
                    ]
                }]
            }"#,
        )
        .expect("static exchange info parses");
        Self {
            info,
            prices: Mutex::new(VecDeque::new()),
            last_price: Mutex::new(Decimal::ZERO),
            statuses: Mutex::new(HashMap::new()),
            rejected_types: Mutex::new(HashSet::new()),
            market_sell_errors: Mutex::new(VecDeque::new()),
            open_orders_response: Mutex::new(Vec::new()),
            oco_accepted: AtomicBool::new(false),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            oco_requests: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Accept OCO placements instead of rejecting them (the default)
    pub(crate) fn accept_oco(&self) {
        self.oco_accepted.store(true, Ordering::SeqCst);
    }

    /// Price tape for the ticker; the final entry repeats forever
    pub(crate) fn set_prices(&self, tape: &[Decimal]) {
        *self.prices.lock().unwrap() = tape.iter().copied().collect();
    }

    /// Status sequence for one order id; the final entry repeats forever
    pub(crate) fn script_status(&self, order_id: &str, sequence: &[OrderStatus]) {
        self.statuses
            .lock()
            .unwrap()
            .insert(order_id.to_string(), sequence.iter().cloned().collect());
    }

    /// Reject every order of this type with an "invalid type" error
    pub(crate) fn reject_type(&self, order_type: OrderType) {
        self.rejected_types.lock().unwrap().insert(order_type);
    }

    /// Fail the next MARKET SELL with the given error (queued per call)
    pub(crate) fn push_market_sell_error(&self, error: ScriptedError) {
        self.market_sell_errors.lock().unwrap().push_back(error);
    }

    /// What `open_orders` reports
    pub(crate) fn set_open_orders(&self, orders: Vec<OrderStatusInfo>) {
        *self.open_orders_response.lock().unwrap() = orders;
    }

    pub(crate) fn placed_of_type(&self, order_type: OrderType) -> Vec<PlacedOrder> {
        self.placed
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.request.order_type == order_type)
            .cloned()
            .collect()
    }

    pub(crate) fn cancelled_ids(&self) -> Vec<String> {
        self.cancelled
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.order_id.clone())
            .collect()
    }

    fn current_price(&self) -> Decimal {
        let mut prices = self.prices.lock().unwrap();
        let price = if prices.len() > 1 {
            prices.pop_front().unwrap_or(Decimal::ZERO)
        } else {
            prices.front().copied().unwrap_or(Decimal::ZERO)
        };
        if price > Decimal::ZERO {
            *self.last_price.lock().unwrap() = price;
        }
        price
    }
}

#[async_trait]
impl ExchangeApi for MockExchange {
    async fn exchange_info(&self, _symbol: Option<&str>) -> Result<ExchangeInfo> {
        Ok(self.info.clone())
    }

    async fn ticker_price(&self, _symbol: &str) -> Decimal {
        self.current_price()
    }

    async fn account(&self) -> Result<AccountInfo> {
        Ok(AccountInfo::default())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        if self.rejected_types.lock().unwrap().contains(&request.order_type) {
            return Err(ScriptedError::InvalidType.to_error());
        }
        if request.order_type == OrderType::Market && request.side == mexcbot_core::OrderSide::Sell
        {
            if let Some(error) = self.market_sell_errors.lock().unwrap().pop_front() {
                return Err(error.to_error());
            }
        }

        let order_id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.placed.lock().unwrap().push(PlacedOrder {
            request: request.clone(),
            order_id: order_id.clone(),
            at: Instant::now(),
        });

        let fills = if request.order_type == OrderType::Market {
            let price = *self.last_price.lock().unwrap();
            vec![Fill {
                price,
                qty: request.quantity,
            }]
        } else {
            Vec::new()
        };

        Ok(OrderAck {
            order_id,
            symbol: request.symbol.clone(),
            side: Some(request.side.as_str().to_string()),
            price: request.price,
            orig_qty: Some(request.quantity),
            status: Some(OrderStatus::New),
            transact_time: None,
            fills,
        })
    }

    async fn place_oco(&self, request: &OcoRequest) -> Result<OcoAck> {
        self.oco_requests.lock().unwrap().push(request.clone());
        if !self.oco_accepted.load(Ordering::SeqCst) {
            return Err(Error::ExchangeOther {
                status: 400,
                code: Some(-1116),
                body: "OCO not supported".to_string(),
            });
        }

        // one limit leg + one stop leg, ids from the same sequence
        let legs = (0..2)
            .map(|_| OcoLeg {
                order_id: self.next_id.fetch_add(1, Ordering::SeqCst).to_string(),
                symbol: request.symbol.clone(),
            })
            .collect();
        Ok(OcoAck {
            order_list_id: Some(serde_json::json!(1)),
            list_client_order_id: Some(request.list_client_order_id.clone()),
            orders: legs,
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<OrderAck> {
        self.cancelled.lock().unwrap().push(CancelRecord {
            order_id: order_id.to_string(),
            at: Instant::now(),
        });
        self.statuses
            .lock()
            .unwrap()
            .insert(order_id.to_string(), [OrderStatus::Canceled].into_iter().collect());
        Ok(OrderAck {
            order_id: order_id.to_string(),
            symbol: "XRPUSDT".to_string(),
            side: None,
            price: None,
            orig_qty: None,
            status: Some(OrderStatus::Canceled),
            transact_time: None,
            fills: Vec::new(),
        })
    }

    async fn order_status(&self, _symbol: &str, order_id: &str) -> Result<OrderStatusInfo> {
        let mut statuses = self.statuses.lock().unwrap();
        let status = match statuses.get_mut(order_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(OrderStatus::New),
            Some(queue) => queue.front().cloned().unwrap_or(OrderStatus::New),
            None => OrderStatus::New,
        };
        Ok(OrderStatusInfo {
            order_id: order_id.to_string(),
            symbol: "XRPUSDT".to_string(),
            status,
            side: None,
            order_type: None,
            price: Decimal::ZERO,
            orig_qty: Decimal::ZERO,
            executed_qty: Decimal::ZERO,
            stop_price: None,
        })
    }

    async fn open_orders(&self, _symbol: &str) -> Result<Vec<OrderStatusInfo>> {
        Ok(self.open_orders_response.lock().unwrap().clone())
    }
}
