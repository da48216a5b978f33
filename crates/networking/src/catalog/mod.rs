//! Symbol discovery, validation, and quantity/price formatting
//!
//! Specs come from exchange-info and are cached for five minutes. Formatting
//! always rounds toward zero so an order can never exceed what the caller
//! asked for.

mod cache;

pub use cache::SpecCache;

use crate::exchange::ExchangeApi;
use mexcbot_core::{Error, Result, SymbolSpec};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_CAPACITY: usize = 512;

/// Steps below this on a USDT pair are treated as misreported
const MIN_PLAUSIBLE_USDT_STEP: Decimal = dec!(0.001);

/// Quote suffixes recognized during normalization
const KNOWN_QUOTES: [&str; 4] = ["USDT", "USDC", "BTC", "ETH"];

/// Normalize user input to the venue's symbol format: separators stripped,
/// uppercased, `USDT` appended when no known quote suffix is present
pub fn normalize_symbol(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | '/' | ' '))
        .collect::<String>()
        .to_uppercase();
    let has_quote = KNOWN_QUOTES
        .iter()
        .any(|q| cleaned.ends_with(q) && cleaned.len() > q.len());
    if has_quote {
        cleaned
    } else {
        format!("{cleaned}USDT")
    }
}

/// Round a quantity down to the symbol's step and enforce the min/max bounds
pub fn format_qty(raw: Decimal, spec: &SymbolSpec) -> Result<Decimal> {
    if spec.step_size <= Decimal::ZERO {
        return Err(Error::InvalidData(format!(
            "step size {} for {} is not positive",
            spec.step_size, spec.symbol
        )));
    }
    let stepped = (raw / spec.step_size).floor() * spec.step_size;
    let precision = spec.step_size.normalize().scale();
    let quantity = stepped
        .round_dp_with_strategy(precision, RoundingStrategy::ToZero)
        .normalize();

    if quantity.is_zero() || quantity < spec.min_qty || quantity > spec.max_qty {
        return Err(Error::QuantityOutOfRange {
            symbol: spec.symbol.clone(),
            quantity,
            min: spec.min_qty,
            max: spec.max_qty,
        });
    }
    Ok(quantity)
}

/// Round a price down to the symbol's tick
pub fn format_price(raw: Decimal, spec: &SymbolSpec) -> Decimal {
    if spec.tick_size <= Decimal::ZERO {
        return raw.normalize();
    }
    ((raw / spec.tick_size).floor() * spec.tick_size).normalize()
}

/// Caches symbol specs and answers tradability questions
pub struct SymbolCatalog<E> {
    exchange: Arc<E>,
    cache: SpecCache,
}

impl<E: ExchangeApi> SymbolCatalog<E> {
    pub fn new(exchange: Arc<E>) -> Self {
        Self {
            exchange,
            cache: SpecCache::with_capacity(CACHE_TTL, CACHE_CAPACITY),
        }
    }

    /// Resolve a (possibly unnormalized) symbol to its trading spec
    pub async fn resolve(&self, symbol: &str) -> Result<SymbolSpec> {
        let symbol = normalize_symbol(symbol);
        if let Some(spec) = self.cache.get(&symbol) {
            debug!("Spec cache hit for {symbol}");
            return Ok(spec);
        }

        let info = self.exchange.exchange_info(Some(&symbol)).await?;
        let raw = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| Error::SymbolNotSupported(symbol.clone()))?;

        let spec = apply_step_heuristic(SymbolSpec::from_info(raw));
        self.cache.insert(spec.clone());
        Ok(spec)
    }

    /// Resolve and require the symbol to be tradable on spot
    pub async fn validate(&self, symbol: &str) -> Result<SymbolSpec> {
        let spec = self.resolve(symbol).await?;
        if !spec.is_tradable() {
            return Err(Error::SymbolNotSupported(format!(
                "{} is not tradable on spot (status {})",
                spec.symbol, spec.status
            )));
        }
        Ok(spec)
    }

    /// Drop a cached spec so the next resolve refetches
    pub fn invalidate(&self, symbol: &str) {
        self.cache.invalidate(&normalize_symbol(symbol));
    }
}

/// Substitute a plausible step when the venue reports one below 10^-3 on a
/// USDT pair. The reported value is kept in the log so operators can compare;
/// preferring it outright is still an open question upstream.
fn apply_step_heuristic(mut spec: SymbolSpec) -> SymbolSpec {
    if spec.quote_asset == "USDT" && spec.step_size < MIN_PLAUSIBLE_USDT_STEP {
        let substituted = heuristic_step(&spec.base_asset);
        warn!(
            "Implausible step size {} reported for {}, substituting {}",
            spec.step_size, spec.symbol, substituted
        );
        spec.step_size = substituted;
        if spec.min_qty < substituted {
            spec.min_qty = substituted;
        }
    }
    spec
}

fn heuristic_step(base_asset: &str) -> Decimal {
    match base_asset {
        "BTC" | "ETH" => dec!(0.001),
        "XRP" | "ADA" | "DOGE" | "SHIB" => dec!(0.1),
        _ => dec!(0.01),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(step: Decimal, min_qty: Decimal, max_qty: Decimal) -> SymbolSpec {
        SymbolSpec {
            symbol: "XRPUSDT".to_string(),
            status: "ENABLED".to_string(),
            spot_allowed: true,
            base_asset: "XRP".to_string(),
            quote_asset: "USDT".to_string(),
            step_size: step,
            tick_size: dec!(0.0001),
            min_qty,
            max_qty,
        }
    }

    #[test]
    fn normalizes_separators_case_and_missing_quote() {
        assert_eq!(normalize_symbol("xrp_usdt"), "XRPUSDT");
        assert_eq!(normalize_symbol("BTC-USDT"), "BTCUSDT");
        assert_eq!(normalize_symbol("doge"), "DOGEUSDT");
        assert_eq!(normalize_symbol("ETHUSDC"), "ETHUSDC");
        // a bare quote asset still needs a quote appended
        assert_eq!(normalize_symbol("ETH"), "ETHUSDT");
    }

    #[test]
    fn format_qty_rounds_down_to_step() {
        let spec = spec(dec!(0.1), dec!(0.1), dec!(90000));
        assert_eq!(format_qty(dec!(1.234), &spec).unwrap(), dec!(1.2));
        assert_eq!(format_qty(dec!(5.0), &spec).unwrap(), dec!(5));
        assert_eq!(format_qty(dec!(0.19), &spec).unwrap(), dec!(0.1));
    }

    #[test]
    fn format_qty_is_idempotent() {
        let spec = spec(dec!(0.1), dec!(0.1), dec!(90000));
        let once = format_qty(dec!(1.234), &spec).unwrap();
        assert_eq!(format_qty(once, &spec).unwrap(), once);

        let fine = spec_with_step(dec!(0.001));
        let once = format_qty(dec!(2.7182818), &fine).unwrap();
        assert_eq!(format_qty(once, &fine).unwrap(), once);
    }

    fn spec_with_step(step: Decimal) -> SymbolSpec {
        spec(step, step, dec!(90000))
    }

    #[test]
    fn format_qty_enforces_bounds() {
        let spec = spec(dec!(0.1), dec!(0.1), dec!(10));
        assert!(matches!(
            format_qty(dec!(0.05), &spec),
            Err(Error::QuantityOutOfRange { .. })
        ));
        assert!(matches!(
            format_qty(dec!(10.1), &spec),
            Err(Error::QuantityOutOfRange { .. })
        ));
        assert!(format_qty(dec!(10.04), &spec).is_ok());
    }

    #[test]
    fn format_price_rounds_down_to_tick() {
        let spec = spec(dec!(0.1), dec!(0.1), dec!(90000));
        assert_eq!(format_price(dec!(1.23456), &spec), dec!(1.2345));
        assert_eq!(format_price(dec!(1.1), &spec), dec!(1.1));
    }

    #[test]
    fn heuristic_replaces_implausible_usdt_steps() {
        let reported = spec(dec!(0.000001), dec!(0.000001), dec!(90000));
        let fixed = apply_step_heuristic(reported);
        assert_eq!(fixed.step_size, dec!(0.1));
        assert_eq!(fixed.min_qty, dec!(0.1));

        let mut btc = spec(dec!(0.0000001), dec!(0.0000001), dec!(90000));
        btc.base_asset = "BTC".to_string();
        assert_eq!(apply_step_heuristic(btc).step_size, dec!(0.001));

        let mut other = spec(dec!(0.0000001), dec!(0.0000001), dec!(90000));
        other.base_asset = "APEX".to_string();
        assert_eq!(apply_step_heuristic(other).step_size, dec!(0.01));
    }

    #[test]
    fn plausible_steps_are_kept() {
        let reported = spec(dec!(0.1), dec!(0.1), dec!(90000));
        assert_eq!(apply_step_heuristic(reported).step_size, dec!(0.1));

        let mut non_usdt = spec(dec!(0.0000001), dec!(0.0000001), dec!(90000));
        non_usdt.quote_asset = "BTC".to_string();
        assert_eq!(apply_step_heuristic(non_usdt).step_size, dec!(0.0000001));
    }
}
