//! Account and balance models

use super::de;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One asset balance from the account endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    #[serde(default, deserialize_with = "de::decimal_lenient")]
    pub free: Decimal,
    #[serde(default, deserialize_with = "de::decimal_lenient")]
    pub locked: Decimal,
}

impl Balance {
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// Signed account snapshot; only the balances list is consumed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    #[serde(default)]
    pub can_trade: bool,
    #[serde(default)]
    pub balances: Vec<Balance>,
}

impl AccountInfo {
    /// Free (unlocked) balance for an asset, zero when absent
    pub fn available(&self, asset: &str) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn available_balance_lookup() {
        let account: AccountInfo = serde_json::from_str(
            r#"{
                "canTrade": true,
                "balances": [
                    {"asset": "USDT", "free": "123.45", "locked": "10"},
                    {"asset": "XRP", "free": "5", "locked": "0"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(account.available("USDT"), dec!(123.45));
        assert_eq!(account.available("XRP"), dec!(5));
        assert_eq!(account.available("BTC"), Decimal::ZERO);
        assert_eq!(account.balances[0].total(), dec!(133.45));
    }
}
