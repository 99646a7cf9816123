use serde::{Deserialize, Serialize};

use crate::error::TrapError;
use crate::models::Side;
use crate::Result;

/// Default share of balance put at risk per trade (0.5%)
pub const DEFAULT_RISK_FRACTION: f64 = 0.005;

/// Fixed-fractional position sizing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskSizer {
    pub risk_fraction: f64,
}

impl Default for RiskSizer {
    fn default() -> Self {
        Self {
            risk_fraction: DEFAULT_RISK_FRACTION,
        }
    }
}

impl RiskSizer {
    pub fn new(risk_fraction: f64) -> Self {
        Self { risk_fraction }
    }

    /// Quantity that loses `balance * risk_fraction` if the stop is hit
    pub fn size(&self, balance: f64, entry_price: f64, stop_loss: f64) -> Result<f64> {
        calculate_trade_size(balance, entry_price, stop_loss, self.risk_fraction)
    }

    /// Stop-loss one risk fraction away from entry, below for longs and above for shorts
    pub fn stop_for(&self, side: Side, entry_price: f64) -> f64 {
        match side {
            Side::Buy => entry_price * (1.0 - self.risk_fraction),
            Side::Sell => entry_price * (1.0 + self.risk_fraction),
        }
    }
}

/// Calculate trade size from balance, entry and stop
///
/// # Errors
/// `InvalidRiskInput` when the stop distance is zero, the balance is not positive,
/// or any input is not a finite number.
pub fn calculate_trade_size(
    balance: f64,
    entry_price: f64,
    stop_loss: f64,
    risk_fraction: f64,
) -> Result<f64> {
    let distance = (entry_price - stop_loss).abs();
    let finite = [balance, entry_price, stop_loss, risk_fraction]
        .iter()
        .all(|v| v.is_finite());

    if !finite || balance <= 0.0 || risk_fraction <= 0.0 || distance == 0.0 {
        return Err(TrapError::InvalidRiskInput {
            balance,
            entry: entry_price,
            stop: stop_loss,
            risk_fraction,
        });
    }

    let risk_amount = balance * risk_fraction;
    Ok(risk_amount / distance)
}
