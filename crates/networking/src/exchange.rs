//! The exchange seam
//!
//! The catalog and the trading engine talk to the venue through this trait so
//! they can run against a scripted double in tests; `MexcClient` is the only
//! production implementation.

use crate::http::MexcClient;
use async_trait::async_trait;
use mexcbot_core::{
    AccountInfo, ExchangeInfo, OcoAck, OcoRequest, OrderAck, OrderRequest, OrderStatusInfo, Result,
};
use rust_decimal::Decimal;

/// The operations the trading core needs from a venue
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn exchange_info(&self, symbol: Option<&str>) -> Result<ExchangeInfo>;

    /// Last trade price; `Decimal::ZERO` means "unknown"
    async fn ticker_price(&self, symbol: &str) -> Decimal;

    async fn account(&self) -> Result<AccountInfo>;

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck>;

    async fn place_oco(&self, request: &OcoRequest) -> Result<OcoAck>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<OrderAck>;

    async fn order_status(&self, symbol: &str, order_id: &str) -> Result<OrderStatusInfo>;

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderStatusInfo>>;
}

#[async_trait]
impl ExchangeApi for MexcClient {
    async fn exchange_info(&self, symbol: Option<&str>) -> Result<ExchangeInfo> {
        MexcClient::exchange_info(self, symbol).await
    }

    async fn ticker_price(&self, symbol: &str) -> Decimal {
        MexcClient::ticker_price(self, symbol).await
    }

    async fn account(&self) -> Result<AccountInfo> {
        MexcClient::account(self).await
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        MexcClient::place_order(self, request).await
    }

    async fn place_oco(&self, request: &OcoRequest) -> Result<OcoAck> {
        MexcClient::place_oco(self, request).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<OrderAck> {
        MexcClient::cancel_order(self, symbol, order_id).await
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> Result<OrderStatusInfo> {
        MexcClient::order_status(self, symbol, order_id).await
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderStatusInfo>> {
        MexcClient::open_orders(self, symbol).await
    }
}
