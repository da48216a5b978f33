//! Lenient deserializers for the loose JSON the exchange emits

use rust_decimal::Decimal;
use serde::de;
use std::str::FromStr;

struct DecimalLenient;

impl<'de> de::Visitor<'de> for DecimalLenient {
    type Value = Decimal;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a decimal as number, string, or null")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Decimal, E> {
        Decimal::try_from(v).map_err(de::Error::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Decimal, E> {
        Ok(Decimal::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Decimal, E> {
        Ok(Decimal::from(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Decimal, E> {
        if v.is_empty() {
            return Ok(Decimal::ZERO);
        }
        Decimal::from_str(v).map_err(de::Error::custom)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Decimal, E> {
        Ok(Decimal::ZERO)
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Decimal, E> {
        Ok(Decimal::ZERO)
    }
}

/// Deserialize a `Decimal` that may arrive as a number, string, or null
pub(crate) fn decimal_lenient<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: de::Deserializer<'de>,
{
    deserializer.deserialize_any(DecimalLenient)
}

/// Deserialize an optional `Decimal` with the same leniency; missing fields
/// should additionally carry `#[serde(default)]`
pub(crate) fn decimal_lenient_opt<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: de::Deserializer<'de>,
{
    struct OptVisitor;

    impl<'de> de::Visitor<'de> for OptVisitor {
        type Value = Option<Decimal>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an optional decimal as number, string, or null")
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2: de::Deserializer<'de>>(
            self,
            deserializer: D2,
        ) -> std::result::Result<Self::Value, D2::Error> {
            deserializer.deserialize_any(DecimalLenient).map(Some)
        }
    }

    deserializer.deserialize_option(OptVisitor)
}

/// Deserialize a value that may be a string or number into its string form
/// (the exchange reports symbol status both ways)
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: de::Deserializer<'de>,
{
    struct StringOrNumber;

    impl<'de> de::Visitor<'de> for StringOrNumber {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}
