use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV candlestick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Per-bar pattern classification
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Signal {
    #[default]
    None,
    SellFakeBreakout,
    BuyFakeBreakout,
    SellMPattern,
    BuyWPattern,
}

impl Signal {
    /// Side a position would take on this signal, `None` for no signal
    pub fn side(&self) -> Option<Side> {
        match self {
            Signal::SellFakeBreakout | Signal::SellMPattern => Some(Side::Sell),
            Signal::BuyFakeBreakout | Signal::BuyWPattern => Some(Side::Buy),
            Signal::None => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Signal::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::None => "None",
            Signal::SellFakeBreakout => "SellFakeBreakout",
            Signal::BuyFakeBreakout => "BuyFakeBreakout",
            Signal::SellMPattern => "SellMPattern",
            Signal::BuyWPattern => "BuyWPattern",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an open position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Side field of an order sent to the exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
    Close,
}

impl From<Side> for OrderSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => OrderSide::Buy,
            Side::Sell => OrderSide::Sell,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
            OrderSide::Close => write!(f, "close"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderKind {
    #[default]
    #[serde(rename = "market_order")]
    Market,
    #[serde(rename = "limit_order")]
    Limit,
}

/// Order handed to an order sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub price: Option<f64>,
    pub kind: OrderKind,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            price: None,
            kind: OrderKind::Market,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, size: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            price: Some(price),
            kind: OrderKind::Limit,
        }
    }
}

/// Acknowledgment returned by an order sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub accepted_at: DateTime<Utc>,
}
