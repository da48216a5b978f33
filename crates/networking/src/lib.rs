//! Mexc Bot Networking - signed HTTP client, rate limiting, symbol catalog,
//! and the high-level order placement API

pub mod api;
pub mod catalog;
pub mod exchange;
pub mod http;

pub use catalog::SymbolCatalog;
pub use exchange::ExchangeApi;
pub use http::{MexcClient, RateLimiter};
