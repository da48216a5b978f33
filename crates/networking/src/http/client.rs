//! MEXC spot HTTP client
//!
//! Every call acquires the shared rate limiter before sending, signs private
//! endpoints, and translates non-200 bodies into typed errors. A single 429
//! is retried once after a one-second backoff.

use super::rate_limit::RateLimiter;
use super::signer::Signer;
use chrono::Utc;
use mexcbot_core::{
    AccountInfo, Credentials, Error, ExchangeInfo, Kline, OcoAck, OcoRequest, OrderAck,
    OrderRequest, OrderStatusInfo, Result, ServerTime, TickerPrice,
};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const BASE_URL: &str = "https://api.mexc.com";
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);
const POOL_MAX_IDLE_PER_HOST: usize = 100;

/// HTTP client for the MEXC spot API
pub struct MexcClient {
    http: Client,
    api_key: String,
    signer: Signer,
    limiter: Arc<RateLimiter>,
}

impl MexcClient {
    /// Create a new client sharing the given rate limiter
    pub fn new(credentials: &Credentials, limiter: Arc<RateLimiter>) -> Self {
        let http = Client::builder()
            .timeout(TRANSPORT_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            api_key: credentials.api_key.clone(),
            signer: Signer::new(credentials.secret_key.clone()),
            limiter,
        }
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(String, String)>,
        signed: bool,
    ) -> Result<String> {
        match self.request_once(&method, endpoint, &params, signed).await {
            Err(Error::RateLimited) => {
                warn!("Rate limit hit on {endpoint}, backing off and retrying once");
                tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                self.request_once(&method, endpoint, &params, signed).await
            }
            other => other,
        }
    }

    async fn request_once(
        &self,
        method: &Method,
        endpoint: &str,
        params: &[(String, String)],
        signed: bool,
    ) -> Result<String> {
        self.limiter.acquire().await;

        let query = if signed {
            self.signer
                .signed_query(params.to_vec(), Utc::now().timestamp_millis())
        } else {
            Signer::canonical_query(params)
        };

        let mut url = format!("{BASE_URL}{endpoint}");
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        debug!("Making {method} request to {endpoint}");
        let mut request = self.http.request(method.clone(), &url);
        if signed {
            request = request.header("X-MEXC-APIKEY", self.api_key.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::OK {
            return Ok(body);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited);
        }
        error!("MEXC API error {status} on {endpoint}: {body}");
        Err(Error::from_exchange_body(status.as_u16(), &body))
    }

    fn parse<T: DeserializeOwned>(body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|e| {
            // error bodies can be huge HTML pages; truncate on char boundaries
            let preview: String = body.chars().take(500).collect();
            error!("Failed to parse response: {e}. Body preview: {preview}");
            Error::InvalidData(e.to_string())
        })
    }

    /// Connectivity check; true on a 200 from `/api/v3/ping`
    pub async fn ping(&self) -> Result<bool> {
        self.request(Method::GET, "/api/v3/ping", Vec::new(), false)
            .await?;
        Ok(true)
    }

    /// Server clock in epoch milliseconds
    pub async fn server_time(&self) -> Result<i64> {
        let body = self
            .request(Method::GET, "/api/v3/time", Vec::new(), false)
            .await?;
        Ok(Self::parse::<ServerTime>(&body)?.server_time)
    }

    /// Exchange rules, optionally scoped to one symbol.
    ///
    /// A failed or empty symbol-scoped fetch degrades to one unscoped attempt,
    /// since some deployments reject the `symbol` parameter outright.
    pub async fn exchange_info(&self, symbol: Option<&str>) -> Result<ExchangeInfo> {
        let params = match symbol {
            Some(s) => vec![("symbol".to_string(), s.to_string())],
            None => Vec::new(),
        };
        let scoped = self
            .request(Method::GET, "/api/v3/exchangeInfo", params, false)
            .await
            .and_then(|body| Self::parse::<ExchangeInfo>(&body));

        match scoped {
            Ok(info) if !info.symbols.is_empty() || symbol.is_none() => Ok(info),
            Ok(_) | Err(_) if symbol.is_some() => {
                warn!("Symbol-scoped exchangeInfo failed, retrying without symbol parameter");
                let body = self
                    .request(Method::GET, "/api/v3/exchangeInfo", Vec::new(), false)
                    .await?;
                Self::parse(&body)
            }
            other => other,
        }
    }

    /// Last trade price.
    ///
    /// Returns `Decimal::ZERO` on any failure; callers must treat zero as
    /// "price unknown", never as a valid quote.
    pub async fn ticker_price(&self, symbol: &str) -> Decimal {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        let result = self
            .request(Method::GET, "/api/v3/ticker/price", params, false)
            .await
            .and_then(|body| Self::parse::<TickerPrice>(&body));
        match result {
            Ok(ticker) => ticker.price,
            Err(e) => {
                error!("Failed to fetch ticker price for {symbol}: {e}");
                Decimal::ZERO
            }
        }
    }

    /// Candlesticks; malformed rows are skipped
    pub async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("interval".to_string(), interval.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        let body = self
            .request(Method::GET, "/api/v3/klines", params, false)
            .await?;
        let rows: Vec<serde_json::Value> = Self::parse(&body)?;
        let klines: Vec<Kline> = rows.iter().filter_map(Kline::parse).collect();
        if klines.len() < rows.len() {
            warn!(
                "Skipped {} malformed kline rows for {symbol}",
                rows.len() - klines.len()
            );
        }
        Ok(klines)
    }

    /// Signed account snapshot
    pub async fn account(&self) -> Result<AccountInfo> {
        let body = self
            .request(Method::GET, "/api/v3/account", Vec::new(), true)
            .await?;
        Self::parse(&body)
    }

    /// Free balance of one asset, via the account endpoint
    pub async fn available_balance(&self, asset: &str) -> Result<Decimal> {
        Ok(self.account().await?.available(asset))
    }

    /// Place a new order
    pub async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        debug!(
            "Placing {} {} {} {}",
            request.order_type, request.side, request.quantity, request.symbol
        );
        let body = self
            .request(Method::POST, "/api/v3/order", request.to_params(), true)
            .await?;
        Self::parse(&body)
    }

    /// Validate an order against the test endpoint without placing it
    pub async fn test_order(&self, request: &OrderRequest) -> Result<()> {
        self.request(Method::POST, "/api/v3/order/test", request.to_params(), true)
            .await?;
        Ok(())
    }

    /// Place an OCO pair
    pub async fn place_oco(&self, request: &OcoRequest) -> Result<OcoAck> {
        debug!("Placing OCO for {} ({})", request.symbol, request.list_client_order_id);
        let body = self
            .request(Method::POST, "/api/v3/order/oco", request.to_params(), true)
            .await?;
        Self::parse(&body)
    }

    /// Cancel a resting order
    pub async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<OrderAck> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        let body = self
            .request(Method::DELETE, "/api/v3/order", params, true)
            .await?;
        Self::parse(&body)
    }

    /// Current state of one order
    pub async fn order_status(&self, symbol: &str, order_id: &str) -> Result<OrderStatusInfo> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        let body = self
            .request(Method::GET, "/api/v3/order", params, true)
            .await?;
        Self::parse(&body)
    }

    /// All resting orders for a symbol
    pub async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderStatusInfo>> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        let body = self
            .request(Method::GET, "/api/v3/openOrders", params, true)
            .await?;
        Self::parse(&body)
    }

    /// Order history for a symbol
    pub async fn all_orders(&self, symbol: &str, limit: Option<u32>) -> Result<Vec<OrderStatusInfo>> {
        let mut params = vec![("symbol".to_string(), symbol.to_string())];
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        let body = self
            .request(Method::GET, "/api/v3/allOrders", params, true)
            .await?;
        Self::parse(&body)
    }
}
