use crate::models::Candle;

/// Default lookback for rolling support/resistance
pub const DEFAULT_LEVEL_WINDOW: usize = 25;

/// Rolling support/resistance derived from a candle series
///
/// One entry per bar. `support[i]`/`resistance[i]` hold the trailing-window extreme
/// and stay `None` until the window is full.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyLevels {
    pub window: usize,
    pub support: Vec<Option<f64>>,
    pub resistance: Vec<Option<f64>>,
    pub is_support: Vec<bool>,
    pub is_resistance: Vec<bool>,
}

impl KeyLevels {
    pub fn len(&self) -> usize {
        self.is_support.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_support.is_empty()
    }

    /// Low of the most recent bar that printed a rolling minimum
    pub fn current_support(&self) -> Option<f64> {
        latest_flagged(&self.is_support, &self.support)
    }

    /// High of the most recent bar that printed a rolling maximum
    pub fn current_resistance(&self) -> Option<f64> {
        latest_flagged(&self.is_resistance, &self.resistance)
    }
}

fn latest_flagged(flags: &[bool], values: &[Option<f64>]) -> Option<f64> {
    flags
        .iter()
        .zip(values)
        .rev()
        .find(|(flagged, _)| **flagged)
        .and_then(|(_, value)| *value)
}

/// Identify rolling support and resistance over a trailing window
///
/// A bar is support when its low equals the minimum low of the `window` bars ending at
/// it (inclusive), resistance when its high equals the maximum high. Bars before the
/// first full window are never flagged.
pub fn identify_key_levels(candles: &[Candle], window: usize) -> KeyLevels {
    let n = candles.len();
    let mut levels = KeyLevels {
        window,
        support: vec![None; n],
        resistance: vec![None; n],
        is_support: vec![false; n],
        is_resistance: vec![false; n],
    };

    if window == 0 || n < window {
        return levels;
    }

    for i in (window - 1)..n {
        let trailing = &candles[i + 1 - window..=i];

        let min_low = trailing.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let max_high = trailing
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);

        levels.support[i] = Some(min_low);
        levels.resistance[i] = Some(max_high);
        levels.is_support[i] = candles[i].low == min_low;
        levels.is_resistance[i] = candles[i].high == max_high;
    }

    levels
}
