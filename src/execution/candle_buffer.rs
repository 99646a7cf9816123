use crate::models::Candle;
use std::collections::VecDeque;

/// Default number of bars kept for analysis
pub const DEFAULT_MAX_CANDLES: usize = 100;

/// Rolling window of candles for one symbol
///
/// Candles stay sorted by timestamp with at most one candle per timestamp. A fetched
/// candle for a timestamp already held replaces it, since the exchange keeps updating
/// the bar that is still forming.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    candles: VecDeque<Candle>,
    max_candles: usize,
}

impl CandleBuffer {
    /// Create a new candle buffer
    ///
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep
    pub fn new(max_candles: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(max_candles),
            max_candles,
        }
    }

    /// Add a candle, replacing any candle with the same timestamp
    ///
    /// If the buffer is full, removes the oldest candle
    pub fn add_candle(&mut self, candle: Candle) {
        match self
            .candles
            .binary_search_by(|c| c.timestamp.cmp(&candle.timestamp))
        {
            Ok(idx) => self.candles[idx] = candle,
            Err(idx) => self.candles.insert(idx, candle),
        }

        while self.candles.len() > self.max_candles {
            self.candles.pop_front();
        }
    }

    /// Merge a fetched batch, returning how many timestamps were new
    pub fn merge(&mut self, batch: impl IntoIterator<Item = Candle>) -> usize {
        let before = self.candles.back().map(|c| c.timestamp);
        let mut added = 0;

        for candle in batch {
            if before.map_or(true, |ts| candle.timestamp > ts) {
                added += 1;
            }
            self.add_candle(candle);
        }

        added
    }

    /// Get all candles, oldest first
    pub fn candles(&self) -> Vec<Candle> {
        self.candles.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

impl Default for CandleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CANDLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_candle(minute: i64, price: f64) -> Candle {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Candle {
            timestamp: start + Duration::minutes(minute),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_new_buffer() {
        let buffer = CandleBuffer::new(100);
        assert_eq!(buffer.max_candles, 100);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_max_candles_limit() {
        let mut buffer = CandleBuffer::new(5);

        for i in 0..10 {
            buffer.add_candle(create_test_candle(i * 15, 100.0 + i as f64));
        }

        let candles = buffer.candles();
        assert_eq!(candles.len(), 5); // Should only keep last 5

        // Should have prices 105-109
        assert_eq!(candles[0].close, 105.0);
        assert_eq!(candles[4].close, 109.0);
    }

    #[test]
    fn test_same_timestamp_replaces() {
        let mut buffer = CandleBuffer::new(10);
        buffer.add_candle(create_test_candle(0, 100.0));
        buffer.add_candle(create_test_candle(15, 101.0));
        buffer.add_candle(create_test_candle(15, 102.5));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.latest().unwrap().close, 102.5);
    }

    #[test]
    fn test_out_of_order_inserts_sorted() {
        let mut buffer = CandleBuffer::new(10);
        buffer.add_candle(create_test_candle(30, 103.0));
        buffer.add_candle(create_test_candle(0, 101.0));
        buffer.add_candle(create_test_candle(15, 102.0));

        let closes: Vec<f64> = buffer.candles().iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![101.0, 102.0, 103.0]);
    }

    #[test]
    fn test_merge_counts_new_bars() {
        let mut buffer = CandleBuffer::new(10);
        let added = buffer.merge((0..3).map(|i| create_test_candle(i * 15, 100.0)));
        assert_eq!(added, 3);

        // Overlapping refetch: bar at 30 is updated, bar at 45 is new
        let added = buffer.merge(vec![
            create_test_candle(30, 101.0),
            create_test_candle(45, 102.0),
        ]);
        assert_eq!(added, 1);
        assert_eq!(buffer.len(), 4);
    }
}
