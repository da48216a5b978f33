//! Environment-driven configuration
//!
//! All knobs come from environment variables (optionally seeded from a `.env`
//! file). Credentials are immutable for the process lifetime and never logged.

use crate::errors::{Error, Result};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// API credentials for signed endpoints
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }
}

// Manual Debug: the secret must never reach a log line
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// One trading window in a specific time zone.
///
/// `start > end` declares an overnight window that wraps local midnight.
/// Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub tz: Tz,
}

impl TradingWindow {
    pub fn new(start: NaiveTime, end: NaiveTime, tz: Tz) -> Self {
        Self { start, end, tz }
    }

    /// Whether `now` falls inside this window in its declared zone
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz).time();
        if self.start <= self.end {
            self.start <= local && local <= self.end
        } else {
            local >= self.start || local <= self.end
        }
    }

    /// Parse a `HH:MM[:SS]/HH:MM[:SS]` pair in the given zone
    pub fn parse(spec: &str, tz: Tz) -> Result<TradingWindow> {
        let (start, end) = spec.split_once('/').ok_or_else(|| {
            Error::ConfigError(format!(
                "trading window '{spec}' must be 'HH:MM/HH:MM'"
            ))
        })?;
        Ok(TradingWindow::new(parse_hm(start)?, parse_hm(end)?, tz))
    }
}

fn parse_hm(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| Error::ConfigError(format!("invalid time of day '{raw}'")))
}

/// Per-order trading parameters
#[derive(Debug, Clone)]
pub struct TradingParams {
    /// Default pair, e.g. `XRPUSDT`
    pub symbol: String,
    /// Default order size; base units, or a USDT notional when
    /// `quantity_is_usdt` is set
    pub quantity: Decimal,
    pub quantity_is_usdt: bool,
    pub max_orders_per_day: u32,
}

/// Full bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub credentials: Credentials,
    pub trading: TradingParams,
    pub windows: Vec<TradingWindow>,
    pub dry_run: bool,
    pub rate_limit_rps: f64,
    pub log_level: String,
}

impl BotConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file is read best-effort first. Missing credentials are only
    /// an error outside dry-run mode.
    pub fn from_env() -> Result<BotConfig> {
        dotenvy::dotenv().ok();

        let credentials = Credentials::new(
            env::var("MEXC_API_KEY").unwrap_or_default(),
            env::var("MEXC_SECRET_KEY").unwrap_or_default(),
        );
        let dry_run = env_flag("DRY_RUN", true);
        if !dry_run && !credentials.is_complete() {
            return Err(Error::ConfigError(
                "MEXC_API_KEY and MEXC_SECRET_KEY are required outside dry-run mode".to_string(),
            ));
        }

        let tz = match env::var("TRADING_TIMEZONE") {
            Ok(raw) => raw
                .parse::<Tz>()
                .map_err(|_| Error::ConfigError(format!("unknown time zone '{raw}'")))?,
            Err(_) => chrono_tz::UTC,
        };
        let windows = parse_windows(&env::var("TRADING_WINDOWS").unwrap_or_default(), tz)?;

        let trading = TradingParams {
            symbol: env::var("TRADING_SYMBOL").unwrap_or_else(|_| "XRPUSDT".to_string()),
            quantity: parse_env("TRADING_QUANTITY", Decimal::TWO)?,
            quantity_is_usdt: env_flag("QUANTITY_IS_USDT", true),
            max_orders_per_day: parse_env("MAX_ORDERS_PER_DAY", 10)?,
        };

        Ok(BotConfig {
            credentials,
            trading,
            windows,
            dry_run,
            rate_limit_rps: parse_env("RATE_LIMIT_RPS", 10.0)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
        })
    }
}

/// Parse a comma-separated list of `HH:MM/HH:MM` pairs
pub fn parse_windows(raw: &str, tz: Tz) -> Result<Vec<TradingWindow>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| TradingWindow::parse(part, tz))
        .collect()
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| Error::ConfigError(format!("invalid value '{raw}' for {key}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_window_pairs_with_optional_seconds() {
        let windows = parse_windows("09:00/17:30, 22:00:30/06:00", chrono_tz::UTC).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start, hm(9, 0));
        assert_eq!(windows[0].end, hm(17, 30));
        assert_eq!(
            windows[1].start,
            NaiveTime::from_hms_opt(22, 0, 30).unwrap()
        );
    }

    #[test]
    fn rejects_malformed_windows() {
        assert!(parse_windows("09:00-17:00", chrono_tz::UTC).is_err());
        assert!(parse_windows("9am/5pm", chrono_tz::UTC).is_err());
    }

    #[test]
    fn empty_spec_yields_no_windows() {
        assert!(parse_windows("", chrono_tz::UTC).unwrap().is_empty());
        assert!(parse_windows(" , ", chrono_tz::UTC).unwrap().is_empty());
    }

    #[test]
    fn overnight_window_boundaries() {
        let window = TradingWindow::new(hm(22, 0), hm(6, 0), chrono_tz::UTC);
        let at = |h, m| chrono_tz::UTC.with_ymd_and_hms(2024, 3, 5, h, m, 0).unwrap().with_timezone(&Utc);
        assert!(!window.contains(at(21, 59)));
        assert!(window.contains(at(22, 0)));
        assert!(window.contains(at(5, 59)));
        assert!(window.contains(at(6, 0)));
        assert!(!window.contains(at(6, 1)));
    }

    #[test]
    fn same_day_window_is_inclusive() {
        let window = TradingWindow::new(hm(9, 0), hm(17, 0), chrono_tz::UTC);
        let at = |h, m| chrono_tz::UTC.with_ymd_and_hms(2024, 3, 5, h, m, 0).unwrap().with_timezone(&Utc);
        assert!(window.contains(at(9, 0)));
        assert!(window.contains(at(17, 0)));
        assert!(!window.contains(at(17, 1)));
        assert!(!window.contains(at(8, 59)));
    }

    #[test]
    fn window_respects_declared_zone() {
        let ny: Tz = "America/New_York".parse().unwrap();
        let window = TradingWindow::new(hm(22, 0), hm(6, 0), ny);
        // 2024-03-05 21:00 New York == 2024-03-06 02:00 UTC: outside
        let local_9pm = ny.with_ymd_and_hms(2024, 3, 5, 21, 0, 0).unwrap().with_timezone(&Utc);
        assert!(!window.contains(local_9pm));
        // 23:00 New York: inside
        let local_11pm = ny.with_ymd_and_hms(2024, 3, 5, 23, 0, 0).unwrap().with_timezone(&Utc);
        assert!(window.contains(local_11pm));
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials::new("key-id", "super-secret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("key-id"));
        assert!(!rendered.contains("super-secret"));
    }
}
