use reqwest::Client;
use serde::Deserialize;

use super::{parse_unix_timestamp, CandleSource};
use crate::error::TrapError;
use crate::models::Candle;
use crate::Result;

pub const DELTA_API_BASE: &str = "https://api.india.delta.exchange";

/// Client for Delta Exchange public candle data
#[derive(Clone)]
pub struct DeltaClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CandleResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    result: Option<Vec<RawCandle>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawCandle {
    #[serde(alias = "time")]
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

impl DeltaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get OHLC candles
    /// Endpoint: GET /v2/ohlc/{symbol}/candles?resolution={resolution}&limit={limit}
    async fn get_candles(
        &self,
        symbol: &str,
        resolution: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/v2/ohlc/{}/candles", self.base_url, symbol);
        let limit = limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("resolution", resolution), ("limit", limit.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TrapError::DataUnavailable {
                reason: format!("Delta API error: {}", response.status()),
            });
        }

        let body: CandleResponse = response.json().await?;

        if body.success == Some(false) {
            return Err(TrapError::DataUnavailable {
                reason: format!(
                    "Delta API returned success=false: {}",
                    body.error.map(|e| e.to_string()).unwrap_or_default()
                ),
            });
        }

        let raw = body.result.ok_or_else(|| TrapError::DataUnavailable {
            reason: "Delta API response has no result".to_string(),
        })?;

        let mut candles = raw
            .into_iter()
            .map(|c| {
                let timestamp =
                    parse_unix_timestamp(c.timestamp).ok_or_else(|| TrapError::DataUnavailable {
                        reason: format!("invalid candle timestamp {}", c.timestamp),
                    })?;
                Ok(Candle {
                    timestamp,
                    open: c.open,
                    high: c.high,
                    low: c.low,
                    close: c.close,
                    volume: c.volume,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Exchange may list newest first
        candles.sort_by_key(|c| c.timestamp);

        tracing::debug!(
            symbol = %symbol,
            resolution = %resolution,
            count = candles.len(),
            "Fetched candles from Delta"
        );

        Ok(candles)
    }
}

impl Default for DeltaClient {
    fn default() -> Self {
        Self::new(DELTA_API_BASE)
    }
}

impl CandleSource for DeltaClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        self.get_candles(symbol, resolution, limit).await
    }
}
