use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::TrapError;
use crate::models::{OrderAck, OrderKind, OrderRequest};
use crate::Result;

/// Destination for order intents
///
/// Implementations either acknowledge the order or fail with
/// `TrapError::OrderRejected`. Callers never retry.
#[allow(async_fn_in_trait)]
pub trait OrderSink {
    async fn submit(&self, order: &OrderRequest) -> Result<OrderAck>;
}

/// Build the rejection for an order
pub fn rejected(order: &OrderRequest, reason: impl Into<String>) -> TrapError {
    TrapError::OrderRejected {
        side: order.side,
        size: order.size,
        reason: reason.into(),
    }
}

/// Acknowledgments a paper sink keeps by default
pub const DEFAULT_FILL_HISTORY: usize = 256;

#[derive(Debug, Default)]
struct FillLog {
    recent: VecDeque<OrderAck>,
    total: usize,
}

/// Simulated sink that acknowledges every well-formed order
///
/// Keeps the most recent acknowledgments so a dry run can be inspected afterwards.
#[derive(Debug)]
pub struct PaperOrderSink {
    log: Mutex<FillLog>,
    history: usize,
}

impl Default for PaperOrderSink {
    fn default() -> Self {
        Self::with_history(DEFAULT_FILL_HISTORY)
    }
}

impl PaperOrderSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that keeps at most `history` acknowledgments
    pub fn with_history(history: usize) -> Self {
        Self {
            log: Mutex::new(FillLog::default()),
            history,
        }
    }

    /// Retained acknowledgments, oldest first
    pub fn fills(&self) -> Vec<OrderAck> {
        self.log
            .lock()
            .map(|log| log.recent.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Acknowledgments issued since creation, including those no longer retained
    pub fn total_fills(&self) -> usize {
        self.log.lock().map(|log| log.total).unwrap_or_default()
    }
}

impl OrderSink for PaperOrderSink {
    async fn submit(&self, order: &OrderRequest) -> Result<OrderAck> {
        if !order.size.is_finite() || order.size <= 0.0 {
            return Err(rejected(order, "size must be positive"));
        }
        if order.price.is_none() && matches!(order.kind, OrderKind::Limit) {
            return Err(rejected(order, "limit order without price"));
        }

        let ack = OrderAck {
            order_id: Uuid::new_v4().to_string(),
            symbol: order.symbol.clone(),
            side: order.side,
            size: order.size,
            accepted_at: Utc::now(),
        };

        tracing::info!(
            order_id = %ack.order_id,
            symbol = %order.symbol,
            side = %order.side,
            size = order.size,
            "Paper order filled"
        );

        let mut log = self.log.lock().map_err(|e| rejected(order, e.to_string()))?;
        log.total += 1;
        log.recent.push_back(ack.clone());
        while log.recent.len() > self.history {
            log.recent.pop_front();
        }

        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;

    #[tokio::test]
    async fn test_paper_sink_acknowledges_and_records() {
        let sink = PaperOrderSink::new();
        let order = OrderRequest::market("BTCUSD", OrderSide::Buy, 0.25);

        let ack = sink.submit(&order).await.unwrap();
        assert_eq!(ack.symbol, "BTCUSD");
        assert_eq!(ack.side, OrderSide::Buy);
        assert_eq!(ack.size, 0.25);

        let fills = sink.fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].order_id, ack.order_id);
    }

    #[tokio::test]
    async fn test_paper_sink_rejects_bad_orders() {
        let sink = PaperOrderSink::new();

        let zero = OrderRequest::market("BTCUSD", OrderSide::Close, 0.0);
        assert!(matches!(
            sink.submit(&zero).await,
            Err(TrapError::OrderRejected { .. })
        ));

        let mut unpriced = OrderRequest::market("BTCUSD", OrderSide::Sell, 1.0);
        unpriced.kind = OrderKind::Limit;
        assert!(sink.submit(&unpriced).await.is_err());

        assert!(sink.fills().is_empty());
    }

    #[tokio::test]
    async fn test_fill_history_is_capped() {
        let sink = PaperOrderSink::with_history(2);
        let mut acks = Vec::new();
        for size in [1.0, 2.0, 3.0] {
            let order = OrderRequest::market("BTCUSD", OrderSide::Buy, size);
            acks.push(sink.submit(&order).await.unwrap());
        }

        let fills = sink.fills();
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].order_id, acks[1].order_id);
        assert_eq!(fills[1].size, 3.0);
        assert_eq!(sink.total_fills(), 3);
    }
}
