use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LevelKind, TrapError};
use crate::models::{Candle, Signal};

/// Default proximity tolerance to a key level (0.5%)
pub const DEFAULT_PROXIMITY: f64 = 0.005;

/// One row of the per-cycle signal table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalRecord {
    pub bar: usize,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub signal: Signal,
}

impl SignalRecord {
    pub fn new(bar: usize, candle: &Candle, signal: Signal) -> Self {
        Self {
            bar,
            timestamp: candle.timestamp,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            signal,
        }
    }
}

/// A level usable in a proximity rule: present, finite and positive
fn usable(level: Option<f64>, kind: LevelKind, bar: usize) -> Option<f64> {
    match level {
        Some(value) if value.is_finite() && value > 0.0 => Some(value),
        _ => {
            let err = TrapError::MalformedLevel { level: kind, bar };
            tracing::trace!(bar, "{}", err);
            None
        }
    }
}

/// Classify a single bar
///
/// Rules are checked in fixed priority order and the first match wins:
/// fake breakout above resistance, fake breakout below support, M-pattern at
/// resistance, W-pattern at support. Returns `Signal::None` for bars without the
/// two bars of history and one bar of follow-through a pattern needs.
pub fn classify_bar(
    candles: &[Candle],
    i: usize,
    support: Option<f64>,
    resistance: Option<f64>,
    proximity: f64,
) -> Signal {
    if i < 2 || i + 2 >= candles.len() {
        return Signal::None;
    }

    let prev2 = &candles[i - 2];
    let prev = &candles[i - 1];
    let bar = &candles[i];
    let next = &candles[i + 1];

    let resistance = usable(resistance, LevelKind::Resistance, i);
    let support = usable(support, LevelKind::Support, i);

    if let Some(r) = resistance {
        if bar.high > r * (1.0 + proximity) && bar.close < r {
            return Signal::SellFakeBreakout;
        }
    }

    if let Some(s) = support {
        if bar.low < s * (1.0 - proximity) && bar.close > s {
            return Signal::BuyFakeBreakout;
        }
    }

    if let Some(r) = resistance {
        if prev.high > prev2.high
            && next.high < bar.high
            && (bar.high - r).abs() / r <= proximity
        {
            return Signal::SellMPattern;
        }
    }

    if let Some(s) = support {
        if prev.low < prev2.low && next.low > bar.low && (bar.low - s).abs() / s <= proximity {
            return Signal::BuyWPattern;
        }
    }

    Signal::None
}

/// Classify every bar of the series against the current key levels
///
/// Always returns exactly one signal per candle.
pub fn detect_signals(
    candles: &[Candle],
    support: Option<f64>,
    resistance: Option<f64>,
    proximity: f64,
) -> Vec<Signal> {
    (0..candles.len())
        .map(|i| classify_bar(candles, i, support, resistance, proximity))
        .collect()
}

/// Range of bar indices that can carry a signal
pub fn classifiable_range(len: usize) -> std::ops::Range<usize> {
    2..len.saturating_sub(2).max(2)
}
