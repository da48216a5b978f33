//! Error types and Result alias for the MEXC bracket bot

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the bot
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limited by exchange (HTTP 429)")]
    RateLimited,

    #[error("Symbol not supported on spot: {0}")]
    SymbolNotSupported(String),

    #[error("Quantity {quantity} outside [{min}, {max}] for {symbol}")]
    QuantityOutOfRange {
        symbol: String,
        quantity: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Exchange refused the sell (oversold block): {0}")]
    OversoldBlocked(String),

    #[error("Outside configured trading windows")]
    OutsideTradingWindow,

    #[error("Daily order quota exceeded ({used}/{max})")]
    DailyQuotaExceeded { used: u32, max: u32 },

    #[error("Exchange error (HTTP {status}, code {code:?}): {body}")]
    ExchangeOther {
        status: u16,
        code: Option<i64>,
        body: String,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}

/// Server error code for "symbol not supported"
const CODE_SYMBOL_NOT_SUPPORTED: i64 = 10007;
/// Server error code for the oversold sell block
const CODE_OVERSOLD: i64 = 30005;

impl Error {
    /// Translate a non-200 response body into a typed error.
    ///
    /// The server usually answers with `{"code": ..., "msg": ...}`; anything
    /// that does not parse, or any unrecognized code, becomes
    /// [`Error::ExchangeOther`] carrying the raw body.
    pub fn from_exchange_body(status: u16, body: &str) -> Error {
        let (code, msg) = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(v) => (
                v.get("code").and_then(|c| c.as_i64()),
                v.get("msg")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string(),
            ),
            Err(_) => (None, String::new()),
        };

        let lowered = msg.to_lowercase();
        match code {
            Some(CODE_SYMBOL_NOT_SUPPORTED) => Error::SymbolNotSupported(msg),
            Some(CODE_OVERSOLD) => Error::OversoldBlocked(msg),
            _ if lowered.contains("oversold") => Error::OversoldBlocked(msg),
            _ if lowered.contains("insufficient balance") => Error::InsufficientBalance(msg),
            _ => Error::ExchangeOther {
                status,
                code,
                body: body.to_string(),
            },
        }
    }

    /// Whether this error is the exchange's oversold sell block
    pub fn is_oversold(&self) -> bool {
        matches!(self, Error::OversoldBlocked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_symbol_not_supported() {
        let err = Error::from_exchange_body(400, r#"{"code":10007,"msg":"symbol not support api"}"#);
        assert!(matches!(err, Error::SymbolNotSupported(_)));
    }

    #[test]
    fn translates_oversold_by_code_and_message() {
        let by_code = Error::from_exchange_body(400, r#"{"code":30005,"msg":"Oversold"}"#);
        assert!(by_code.is_oversold());

        let by_msg = Error::from_exchange_body(400, r#"{"code":-1,"msg":"Oversold condition"}"#);
        assert!(by_msg.is_oversold());
    }

    #[test]
    fn translates_insufficient_balance() {
        let err = Error::from_exchange_body(400, r#"{"code":-2010,"msg":"Insufficient balance"}"#);
        assert!(matches!(err, Error::InsufficientBalance(_)));
    }

    #[test]
    fn unknown_bodies_become_exchange_other() {
        let err = Error::from_exchange_body(500, "upstream exploded");
        match err {
            Error::ExchangeOther { status, code, body } => {
                assert_eq!(status, 500);
                assert_eq!(code, None);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("unexpected translation: {other:?}"),
        }
    }
}
