// Trading strategy module
pub mod patterns;

use crate::indicators::{identify_key_levels, KeyLevels, DEFAULT_LEVEL_WINDOW};
use crate::models::{Candle, Side};
use patterns::{detect_signals, SignalRecord, DEFAULT_PROXIMITY};

/// Result of running a strategy over one candle window
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub levels: KeyLevels,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    /// One record per candle, in bar order
    pub records: Vec<SignalRecord>,
}

impl Analysis {
    /// Records that carry a signal
    pub fn signals(&self) -> impl Iterator<Item = &SignalRecord> {
        self.records.iter().filter(|r| !r.signal.is_none())
    }

    /// Key level a position opened on this side would target last
    ///
    /// Sell entries aim at resistance, buy entries at support.
    pub fn last_swing(&self, side: Side) -> Option<f64> {
        match side {
            Side::Sell => self.resistance,
            Side::Buy => self.support,
        }
    }
}

/// Base trait for signal strategies
pub trait Strategy: Send + Sync {
    /// Classify every bar of the window
    fn analyze(&self, candles: &[Candle]) -> Analysis;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles before any level can exist
    fn min_candles_required(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct ReversalConfig {
    /// Trailing bars for rolling support/resistance
    pub level_window: usize,
    /// Tolerance to a level, as a fraction of it
    pub proximity: f64,
}

impl Default for ReversalConfig {
    fn default() -> Self {
        Self {
            level_window: DEFAULT_LEVEL_WINDOW,
            proximity: DEFAULT_PROXIMITY,
        }
    }
}

/// Fake breakouts and M/W reversals at rolling support/resistance
#[derive(Debug, Clone, Default)]
pub struct ReversalStrategy {
    config: ReversalConfig,
}

impl ReversalStrategy {
    pub fn new(config: ReversalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReversalConfig {
        &self.config
    }
}

impl Strategy for ReversalStrategy {
    fn analyze(&self, candles: &[Candle]) -> Analysis {
        let levels = identify_key_levels(candles, self.config.level_window);
        let support = levels.current_support();
        let resistance = levels.current_resistance();

        let signals = detect_signals(candles, support, resistance, self.config.proximity);
        let records: Vec<SignalRecord> = candles
            .iter()
            .zip(signals)
            .enumerate()
            .map(|(bar, (candle, signal))| SignalRecord::new(bar, candle, signal))
            .collect();

        tracing::debug!(
            candles = candles.len(),
            support = ?support,
            resistance = ?resistance,
            signals = records.iter().filter(|r| !r.signal.is_none()).count(),
            "Analyzed candle window"
        );

        Analysis {
            levels,
            support,
            resistance,
            records,
        }
    }

    fn name(&self) -> &str {
        "Reversal"
    }

    fn min_candles_required(&self) -> usize {
        self.config.level_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signal;
    use chrono::{Duration, TimeZone, Utc};

    fn flat_candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Candle {
                timestamp: start + Duration::minutes(15 * i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 5.0,
            })
            .collect()
    }

    #[test]
    fn test_analysis_has_one_record_per_candle() {
        let strategy = ReversalStrategy::default();
        let candles = flat_candles(40);
        let analysis = strategy.analyze(&candles);

        assert_eq!(analysis.records.len(), 40);
        assert_eq!(analysis.support, Some(99.0));
        assert_eq!(analysis.resistance, Some(101.0));
        assert!(analysis.records.iter().enumerate().all(|(i, r)| r.bar == i));
    }

    #[test]
    fn test_warmup_window_has_no_levels_or_signals() {
        let strategy = ReversalStrategy::default();
        let mut candles = flat_candles(10);
        // A wild bar that would be a fake breakout if levels existed
        candles[5].high = 150.0;
        candles[5].low = 50.0;

        let analysis = strategy.analyze(&candles);
        assert_eq!(analysis.support, None);
        assert_eq!(analysis.resistance, None);
        assert_eq!(analysis.signals().count(), 0);
        assert_eq!(strategy.min_candles_required(), 25);
    }

    #[test]
    fn test_fake_breakout_detected_against_rolling_resistance() {
        let strategy = ReversalStrategy::new(ReversalConfig {
            level_window: 5,
            proximity: 0.005,
        });
        // Bar 8 spikes and is still inside the last window, so it stays the current high
        let mut candles = flat_candles(12);
        candles[8].high = 103.0;
        candles[8].close = 100.0;

        let analysis = strategy.analyze(&candles);
        assert_eq!(analysis.resistance, Some(103.0));

        // Once the spike rolls out of the window, resistance falls back to 101
        let mut candles = flat_candles(20);
        candles[10].high = 103.0;
        candles[10].close = 100.0;
        let analysis = strategy.analyze(&candles);
        assert_eq!(analysis.resistance, Some(101.0));
        assert_eq!(analysis.records[10].signal, Signal::SellFakeBreakout);
        assert_eq!(analysis.last_swing(Side::Sell), Some(101.0));
        assert_eq!(analysis.last_swing(Side::Buy), Some(99.0));
    }
}
