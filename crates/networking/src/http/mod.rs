//! Signed HTTP transport for the MEXC spot API

mod client;
mod rate_limit;
mod signer;

pub use client::MexcClient;
pub use rate_limit::RateLimiter;
