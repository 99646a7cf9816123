use super::CandleBuffer;
use crate::api::CandleSource;
use crate::error::TrapError;
use crate::models::Candle;
use crate::Result;

/// Keeps the rolling candle window for one symbol up to date
pub struct CandleFeed<C> {
    source: C,
    buffer: CandleBuffer,
    symbol: String,
    resolution: String,
    limit: usize,
}

/// Candle window after a refresh
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub candles: Vec<Candle>,
    /// Close of the newest bar, used as the standalone price tick
    pub current_price: f64,
    pub new_bars: usize,
}

impl<C: CandleSource> CandleFeed<C> {
    /// Create a new candle feed
    ///
    /// # Arguments
    /// * `limit` - Bars requested per fetch and kept in the window
    pub fn new(
        source: C,
        symbol: impl Into<String>,
        resolution: impl Into<String>,
        limit: usize,
    ) -> Self {
        Self {
            source,
            buffer: CandleBuffer::new(limit),
            symbol: symbol.into(),
            resolution: resolution.into(),
            limit,
        }
    }

    /// Fetch the latest candles and merge them into the window
    ///
    /// # Errors
    /// `DataUnavailable` when the source fails or the window is still empty.
    pub async fn refresh(&mut self) -> Result<FeedSnapshot> {
        let fetched = self
            .source
            .fetch_candles(&self.symbol, &self.resolution, self.limit)
            .await
            .map_err(|e| match e {
                TrapError::DataUnavailable { .. } => e,
                other => TrapError::DataUnavailable {
                    reason: other.to_string(),
                },
            })?;

        let new_bars = self.buffer.merge(fetched);

        let current_price = self
            .buffer
            .latest()
            .map(|c| c.close)
            .ok_or_else(|| TrapError::DataUnavailable {
                reason: format!("no candles for {}", self.symbol),
            })?;

        tracing::info!(
            symbol = %self.symbol,
            price = current_price,
            new_bars,
            window = self.buffer.len(),
            "Refreshed candles"
        );

        Ok(FeedSnapshot {
            candles: self.buffer.candles(),
            current_price,
            new_bars,
        })
    }

    /// Get the candle buffer
    pub fn buffer(&self) -> &CandleBuffer {
        &self.buffer
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ReplaySource;
    use chrono::{Duration, TimeZone, Utc};

    fn series(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Candle {
                timestamp: start + Duration::minutes(15 * i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0 + i as f64,
                volume: 1.0,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_refresh_merges_and_reports_price() {
        let source = ReplaySource::new(series(6), 4);
        let mut feed = CandleFeed::new(source, "BTCUSD", "15m", 5);

        let snapshot = feed.refresh().await.unwrap();
        assert_eq!(snapshot.candles.len(), 4);
        assert_eq!(snapshot.new_bars, 4);
        assert_eq!(snapshot.current_price, 103.0);

        let snapshot = feed.refresh().await.unwrap();
        assert_eq!(snapshot.new_bars, 1);
        assert_eq!(snapshot.current_price, 104.0);

        let snapshot = feed.refresh().await.unwrap();
        // Window capped at the fetch limit
        assert_eq!(snapshot.candles.len(), 5);
        assert_eq!(snapshot.candles[0].close, 101.0);
        assert_eq!(feed.symbol(), "BTCUSD");
    }

    #[tokio::test]
    async fn test_source_failure_is_data_unavailable() {
        let source = ReplaySource::new(Vec::new(), 1);
        let mut feed = CandleFeed::new(source, "BTCUSD", "15m", 100);

        let result = feed.refresh().await;
        assert!(matches!(result, Err(TrapError::DataUnavailable { .. })));
        assert!(feed.buffer().is_empty());
    }
}
