//! Trading-window and daily-quota gating

mod gate;

pub use gate::{DailyQuota, TradingGate};
