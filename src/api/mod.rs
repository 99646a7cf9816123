// Candle data sources
pub mod delta;
pub mod replay;

pub use delta::DeltaClient;
pub use replay::ReplaySource;

use crate::models::Candle;
use crate::Result;
use chrono::{DateTime, TimeZone, Utc};

/// Supplier of candles for a symbol and resolution
///
/// Returns candles ordered oldest first. Any failure is reported as
/// `TrapError::DataUnavailable`.
#[allow(async_fn_in_trait)]
pub trait CandleSource {
    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: &str,
        limit: usize,
    ) -> Result<Vec<Candle>>;
}

/// Unix timestamp in seconds or milliseconds to UTC
pub(crate) fn parse_unix_timestamp(raw: i64) -> Option<DateTime<Utc>> {
    // Anything past year 2286 in seconds is really milliseconds
    if raw.abs() >= 10_000_000_000 {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}
