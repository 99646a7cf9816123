use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{parse_unix_timestamp, CandleSource};
use crate::error::TrapError;
use crate::models::Candle;
use crate::Result;

/// Candle source that plays back a recorded series one bar per fetch
///
/// The first fetch reveals `warmup` bars; each later fetch reveals one more. Once every
/// bar has been shown, fetches fail with `DataUnavailable`.
#[derive(Debug)]
pub struct ReplaySource {
    candles: Vec<Candle>,
    revealed: AtomicUsize,
    warmup: usize,
}

#[derive(Debug, Deserialize)]
struct CsvCandle {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

impl ReplaySource {
    pub fn new(mut candles: Vec<Candle>, warmup: usize) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        Self {
            candles,
            revealed: AtomicUsize::new(0),
            warmup: warmup.max(1),
        }
    }

    /// Load `timestamp,open,high,low,close,volume` rows
    ///
    /// Timestamps may be unix seconds, unix milliseconds or RFC 3339.
    pub fn from_csv(path: impl AsRef<Path>, warmup: usize) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let mut candles = Vec::new();

        for row in reader.deserialize() {
            let row: CsvCandle = row?;
            let timestamp = parse_csv_timestamp(&row.timestamp).ok_or_else(|| {
                TrapError::DataUnavailable {
                    reason: format!("invalid timestamp {:?}", row.timestamp),
                }
            })?;
            candles.push(Candle {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        tracing::info!(
            path = %path.as_ref().display(),
            bars = candles.len(),
            "Loaded replay candles"
        );

        Ok(Self::new(candles, warmup))
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Timestamp of the newest bar each remaining fetch will reveal
    ///
    /// One entry per fetch left, so replay cycles can run on recorded time.
    pub fn cycle_times(&self) -> Vec<DateTime<Utc>> {
        let next = match self.revealed.load(Ordering::SeqCst) {
            0 => self.warmup.min(self.candles.len()),
            revealed => revealed + 1,
        };
        if next == 0 {
            return Vec::new();
        }
        self.candles
            .get(next - 1..)
            .unwrap_or_default()
            .iter()
            .map(|c| c.timestamp)
            .collect()
    }
}

fn parse_csv_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    match raw.parse::<i64>() {
        Ok(unix) => parse_unix_timestamp(unix),
        Err(_) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

impl CandleSource for ReplaySource {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        _resolution: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let current = self.revealed.load(Ordering::SeqCst);
        let next = if current == 0 {
            self.warmup.min(self.candles.len())
        } else {
            current + 1
        };

        if next == 0 || next > self.candles.len() {
            return Err(TrapError::DataUnavailable {
                reason: "replay exhausted".to_string(),
            });
        }

        self.revealed.store(next, Ordering::SeqCst);
        let start = next.saturating_sub(limit);
        Ok(self.candles[start..next].to_vec())
    }
}
