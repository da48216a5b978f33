//! The bracket order entity: a LIMIT entry plus protective SL/TP exits

use crate::errors::{Error, Result};
use crate::types::{BracketState, OrderSide, PositionId, ProtectionMode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Caller-facing request for one bracket order
#[derive(Debug, Clone)]
pub struct BracketRequest {
    pub symbol: String,
    pub entry_price: Decimal,
    pub sl_price: Decimal,
    pub tp_price: Decimal,
    /// Quantity in base units; when absent the engine derives it from the
    /// configured default
    pub quantity: Option<Decimal>,
}

/// One live bracket: entry order plus its protective exits.
///
/// `id` is the stable local identifier; exchange order ids are opaque strings
/// only ever handed back to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketOrder {
    pub id: PositionId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub sl_price: Decimal,
    pub tp_price: Decimal,
    pub main_order_id: String,
    pub sl_order_id: Option<String>,
    pub tp_order_id: Option<String>,
    pub state: BracketState,
    pub sl_mode: ProtectionMode,
    pub tp_mode: ProtectionMode,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl BracketOrder {
    /// Create a new bracket in `Submitting` state, validating price ordering
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        entry_price: Decimal,
        sl_price: Decimal,
        tp_price: Decimal,
    ) -> Result<BracketOrder> {
        Self::validate_prices(side, entry_price, sl_price, tp_price)?;
        if quantity <= Decimal::ZERO {
            return Err(Error::ConfigError(format!(
                "quantity must be positive, got {quantity}"
            )));
        }
        Ok(BracketOrder {
            id: PositionId::new(),
            symbol: symbol.into(),
            side,
            quantity,
            entry_price,
            sl_price,
            tp_price,
            main_order_id: String::new(),
            sl_order_id: None,
            tp_order_id: None,
            state: BracketState::Submitting,
            sl_mode: ProtectionMode::Software,
            tp_mode: ProtectionMode::Software,
            created_at: Utc::now(),
            filled_at: None,
            closed_at: None,
            last_error: None,
        })
    }

    /// Enforce `sl < entry < tp` for BUY entries (mirrored for SELL)
    pub fn validate_prices(
        side: OrderSide,
        entry_price: Decimal,
        sl_price: Decimal,
        tp_price: Decimal,
    ) -> Result<()> {
        if entry_price <= Decimal::ZERO || sl_price <= Decimal::ZERO || tp_price <= Decimal::ZERO {
            return Err(Error::ConfigError(
                "entry, stop-loss, and take-profit prices must be positive".to_string(),
            ));
        }
        let ordered = match side {
            OrderSide::Buy => sl_price < entry_price && entry_price < tp_price,
            OrderSide::Sell => tp_price < entry_price && entry_price < sl_price,
        };
        if !ordered {
            return Err(Error::ConfigError(format!(
                "{side} bracket requires stop-loss {sl_price} and take-profit {tp_price} on opposite sides of entry {entry_price}"
            )));
        }
        Ok(())
    }

    /// Realized profit for a close at `exit_price`
    pub fn realized_pnl(&self, exit_price: Decimal) -> Decimal {
        match self.side {
            OrderSide::Buy => (exit_price - self.entry_price) * self.quantity,
            OrderSide::Sell => (self.entry_price - exit_price) * self.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_bracket_requires_sl_below_and_tp_above_entry() {
        assert!(BracketOrder::new("XRPUSDT", OrderSide::Buy, dec!(5), dec!(1.10), dec!(1.00), dec!(5.00)).is_ok());

        let inverted =
            BracketOrder::new("XRPUSDT", OrderSide::Buy, dec!(5), dec!(1.10), dec!(1.20), dec!(5.00));
        assert!(matches!(inverted, Err(Error::ConfigError(_))));

        let tp_below =
            BracketOrder::new("XRPUSDT", OrderSide::Buy, dec!(5), dec!(1.10), dec!(1.00), dec!(1.05));
        assert!(matches!(tp_below, Err(Error::ConfigError(_))));
    }

    #[test]
    fn sell_bracket_ordering_is_mirrored() {
        assert!(BracketOrder::validate_prices(
            OrderSide::Sell,
            dec!(1.10),
            dec!(1.20),
            dec!(1.00)
        )
        .is_ok());
        assert!(BracketOrder::validate_prices(
            OrderSide::Sell,
            dec!(1.10),
            dec!(1.00),
            dec!(1.20)
        )
        .is_err());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let bracket =
            BracketOrder::new("XRPUSDT", OrderSide::Buy, dec!(0), dec!(1.10), dec!(1.00), dec!(5.00));
        assert!(bracket.is_err());
    }

    #[test]
    fn realized_pnl_for_buy_side() {
        let bracket =
            BracketOrder::new("XRPUSDT", OrderSide::Buy, dec!(5), dec!(1.10), dec!(1.00), dec!(5.00))
                .unwrap();
        assert_eq!(bracket.realized_pnl(dec!(5.00)), dec!(19.50));
        assert_eq!(bracket.realized_pnl(dec!(1.00)), dec!(-0.50));
    }
}
