//! Market data models: server time, ticker, candlesticks

use super::de;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Response from the server-time endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    pub server_time: i64,
}

/// Last-trade price for a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerPrice {
    #[serde(default)]
    pub symbol: String,
    #[serde(deserialize_with = "de::decimal_lenient")]
    pub price: Decimal,
}

/// One candlestick row.
///
/// The endpoint returns heterogeneous arrays (`[openTs, o, h, l, c, v, ...]`
/// with numbers and strings mixed); rows that do not parse are skipped by the
/// caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Kline {
    /// Parse a raw kline row, returning `None` when the row is malformed
    pub fn parse(raw: &serde_json::Value) -> Option<Kline> {
        let row = raw.as_array()?;
        if row.len() < 6 {
            return None;
        }
        Some(Kline {
            open_time: row[0].as_i64()?,
            open: value_decimal(&row[1])?,
            high: value_decimal(&row[2])?,
            low: value_decimal(&row[3])?,
            close: value_decimal(&row[4])?,
            volume: value_decimal(&row[5])?,
        })
    }
}

fn value_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(|f| Decimal::try_from(f).ok())
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_mixed_number_and_string_rows() {
        let raw: serde_json::Value = serde_json::from_str(
            r#"[1640804880000,"0.047","0.048","0.046",0.0475,"123.4","extra"]"#,
        )
        .unwrap();
        let kline = Kline::parse(&raw).unwrap();
        assert_eq!(kline.open_time, 1640804880000);
        assert_eq!(kline.open, dec!(0.047));
        assert_eq!(kline.close, dec!(0.0475));
        assert_eq!(kline.volume, dec!(123.4));
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let short: serde_json::Value = serde_json::from_str(r#"[1640804880000,"0.047"]"#).unwrap();
        assert!(Kline::parse(&short).is_none());

        let garbage: serde_json::Value =
            serde_json::from_str(r#"[1640804880000,"zero","0","0","0","0"]"#).unwrap();
        assert!(Kline::parse(&garbage).is_none());

        let not_array: serde_json::Value = serde_json::from_str(r#"{"open":1}"#).unwrap();
        assert!(Kline::parse(&not_array).is_none());
    }

    #[test]
    fn ticker_price_accepts_string_price() {
        let ticker: TickerPrice =
            serde_json::from_str(r#"{"symbol":"XRPUSDT","price":"1.1000"}"#).unwrap();
        assert_eq!(ticker.price, dec!(1.1000));
    }
}
