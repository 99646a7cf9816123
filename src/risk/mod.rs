// Risk management module
pub mod sizing;

pub use sizing::{calculate_trade_size, RiskSizer, DEFAULT_RISK_FRACTION};
