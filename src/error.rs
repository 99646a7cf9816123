use std::fmt;

use crate::models::OrderSide;

/// Which key level a rule needed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    Support,
    Resistance,
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelKind::Support => write!(f, "support"),
            LevelKind::Resistance => write!(f, "resistance"),
        }
    }
}

/// Errors surfaced by the trading core
///
/// Every variant is recoverable at the cycle boundary: the caller logs it and moves on
/// to the next poll.
#[derive(Debug, thiserror::Error)]
pub enum TrapError {
    #[error("candle data unavailable: {reason}")]
    DataUnavailable { reason: String },

    #[error("invalid risk input: balance={balance}, entry={entry}, stop={stop}, risk={risk_fraction}")]
    InvalidRiskInput {
        balance: f64,
        entry: f64,
        stop: f64,
        risk_fraction: f64,
    },

    #[error("order rejected ({side} {size:.6}): {reason}")]
    OrderRejected {
        side: OrderSide,
        size: f64,
        reason: String,
    },

    #[error("{level} level undefined at bar {bar}")]
    MalformedLevel { level: LevelKind, bar: usize },

    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl From<reqwest::Error> for TrapError {
    fn from(err: reqwest::Error) -> Self {
        TrapError::DataUnavailable {
            reason: err.to_string(),
        }
    }
}
