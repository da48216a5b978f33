//! Exchange-info models and the derived per-symbol trading spec

use super::de;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Response from the exchange-info endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeInfo {
    #[serde(default)]
    pub symbols: Vec<SymbolInfo>,
}

/// Raw per-symbol entry from exchange-info.
///
/// The venue reports lot rules inconsistently: some symbols carry Binance-style
/// filters, others only `baseSizePrecision`. `SymbolSpec::from_info` folds both
/// into one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub status: String,
    #[serde(default)]
    pub base_asset: String,
    #[serde(default)]
    pub quote_asset: String,
    #[serde(default)]
    pub is_spot_trading_allowed: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default, deserialize_with = "de::decimal_lenient_opt")]
    pub base_size_precision: Option<Decimal>,
    #[serde(default)]
    pub quote_precision: Option<u32>,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

/// One entry of the symbol's filter list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolFilter {
    #[serde(default)]
    pub filter_type: String,
    #[serde(default, deserialize_with = "de::decimal_lenient_opt")]
    pub step_size: Option<Decimal>,
    #[serde(default, deserialize_with = "de::decimal_lenient_opt")]
    pub tick_size: Option<Decimal>,
    #[serde(default, deserialize_with = "de::decimal_lenient_opt")]
    pub min_qty: Option<Decimal>,
    #[serde(default, deserialize_with = "de::decimal_lenient_opt")]
    pub max_qty: Option<Decimal>,
}

/// Default quantity ceiling when the venue reports none
const DEFAULT_MAX_QTY: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);
/// Default tick of 10^-4 when neither filter nor precision is reported
const DEFAULT_TICK: Decimal = Decimal::from_parts(1, 0, 0, false, 4);
/// Default step of 10^-2 when neither filter nor precision is reported
const DEFAULT_STEP: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Trading rules for one symbol, cached by the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub symbol: String,
    pub status: String,
    pub spot_allowed: bool,
    pub base_asset: String,
    pub quote_asset: String,
    pub step_size: Decimal,
    pub tick_size: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
}

impl SymbolSpec {
    /// Fold a raw exchange-info entry into a usable spec
    pub fn from_info(info: SymbolInfo) -> SymbolSpec {
        let lot = info
            .filters
            .iter()
            .find(|f| f.filter_type == "LOT_SIZE");
        let price_filter = info
            .filters
            .iter()
            .find(|f| f.filter_type == "PRICE_FILTER");

        let step_size = lot
            .and_then(|f| f.step_size)
            .or(info.base_size_precision)
            .filter(|s| *s > Decimal::ZERO)
            .unwrap_or(DEFAULT_STEP);
        let tick_size = price_filter
            .and_then(|f| f.tick_size)
            .filter(|t| *t > Decimal::ZERO)
            .or_else(|| info.quote_precision.map(|p| Decimal::new(1, p.min(28))))
            .unwrap_or(DEFAULT_TICK);
        let min_qty = lot
            .and_then(|f| f.min_qty)
            .filter(|m| *m > Decimal::ZERO)
            .unwrap_or(step_size);
        let max_qty = lot
            .and_then(|f| f.max_qty)
            .filter(|m| *m > Decimal::ZERO)
            .unwrap_or(DEFAULT_MAX_QTY);

        let spot_allowed =
            info.is_spot_trading_allowed || info.permissions.iter().any(|p| p == "SPOT");

        SymbolSpec {
            symbol: info.symbol,
            status: info.status,
            spot_allowed,
            base_asset: info.base_asset,
            quote_asset: info.quote_asset,
            step_size,
            tick_size,
            min_qty,
            max_qty,
        }
    }

    /// Whether the symbol is currently tradable on spot
    pub fn is_tradable(&self) -> bool {
        self.spot_allowed
            && matches!(self.status.as_str(), "TRADING" | "ENABLED" | "ACTIVE" | "1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn info_json(json: &str) -> SymbolInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn spec_from_filters() {
        let info = info_json(
            r#"{
                "symbol": "XRPUSDT",
                "status": "ENABLED",
                "baseAsset": "XRP",
                "quoteAsset": "USDT",
                "isSpotTradingAllowed": true,
                "filters": [
                    {"filterType": "LOT_SIZE", "stepSize": "0.1", "minQty": "0.1", "maxQty": "90000"},
                    {"filterType": "PRICE_FILTER", "tickSize": "0.0001"}
                ]
            }"#,
        );
        let spec = SymbolSpec::from_info(info);
        assert_eq!(spec.step_size, dec!(0.1));
        assert_eq!(spec.tick_size, dec!(0.0001));
        assert_eq!(spec.min_qty, dec!(0.1));
        assert_eq!(spec.max_qty, dec!(90000));
        assert!(spec.is_tradable());
    }

    #[test]
    fn spec_from_base_size_precision_and_numeric_status() {
        let info = info_json(
            r#"{
                "symbol": "XRPUSDT",
                "status": 1,
                "baseAsset": "XRP",
                "quoteAsset": "USDT",
                "permissions": ["SPOT"],
                "baseSizePrecision": "0.01",
                "quotePrecision": 4
            }"#,
        );
        let spec = SymbolSpec::from_info(info);
        assert_eq!(spec.status, "1");
        assert_eq!(spec.step_size, dec!(0.01));
        assert_eq!(spec.tick_size, dec!(0.0001));
        assert_eq!(spec.min_qty, dec!(0.01));
        assert!(spec.is_tradable());
    }

    #[test]
    fn halted_or_non_spot_symbols_are_not_tradable() {
        let halted = info_json(
            r#"{"symbol":"ABCUSDT","status":"HALT","isSpotTradingAllowed":true}"#,
        );
        assert!(!SymbolSpec::from_info(halted).is_tradable());

        let futures_only = info_json(r#"{"symbol":"ABCUSDT","status":"ENABLED"}"#);
        assert!(!SymbolSpec::from_info(futures_only).is_tradable());
    }
}
