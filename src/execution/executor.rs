use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrapError;
use crate::execution::order_sink::OrderSink;
use crate::execution::position_manager::{
    OrderIntent, Position, PositionManager, SignalEvent, Transition,
};
use crate::models::{Candle, OrderAck, Signal};
use crate::strategy::patterns::{classifiable_range, SignalRecord};
use crate::strategy::{Analysis, Strategy};

/// State carried from one cycle to the next
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotState {
    pub position: Position,
    /// Timestamp of the newest bar already fed to the position manager
    pub last_processed: Option<DateTime<Utc>>,
}

/// A recoverable failure inside a cycle
#[derive(Debug)]
pub struct CycleError {
    pub cycle_time: DateTime<Utc>,
    pub bar: Option<usize>,
    pub signal: Option<Signal>,
    pub error: TrapError,
}

/// Everything one cycle did
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_time: DateTime<Utc>,
    pub analysis: Analysis,
    /// Bars evaluated for the first time this cycle
    pub processed: Vec<SignalRecord>,
    pub fills: Vec<OrderAck>,
    pub errors: Vec<CycleError>,
    /// Window was shorter than the strategy needs; no bars were evaluated
    pub warming_up: bool,
    /// Mark-to-market of the position left open at the current price
    pub unrealized_pnl: f64,
}

impl CycleReport {
    fn new(cycle_time: DateTime<Utc>, analysis: Analysis) -> Self {
        Self {
            cycle_time,
            analysis,
            processed: Vec::new(),
            fills: Vec::new(),
            errors: Vec::new(),
            warming_up: false,
            unrealized_pnl: 0.0,
        }
    }

    fn record_error(&mut self, bar: Option<usize>, signal: Option<Signal>, error: TrapError) {
        tracing::warn!(
            cycle = %self.cycle_time,
            bar = ?bar,
            signal = ?signal,
            "{}",
            error
        );
        self.errors.push(CycleError {
            cycle_time: self.cycle_time,
            bar,
            signal,
            error,
        });
    }
}

/// Drives the strategy and position manager for one symbol
///
/// Each cycle analyzes the candle window, feeds every bar not seen before to the position
/// manager in bar order (its signal, then its close as a price check), and finally checks
/// the current price. Orders go to the sink one at a time and a transition only takes
/// effect once its order is acknowledged.
pub struct Executor<S, O> {
    symbol: String,
    strategy: S,
    position_manager: PositionManager,
    sink: O,
}

impl<S: Strategy, O: OrderSink> Executor<S, O> {
    pub fn new(
        symbol: impl Into<String>,
        strategy: S,
        position_manager: PositionManager,
        sink: O,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            strategy,
            position_manager,
            sink,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    /// Run one cycle over `candles` and return the next state
    ///
    /// Never fails as a whole: rejected signals and orders are collected in the report and
    /// the cycle carries on with the position as last confirmed.
    pub async fn run_cycle(
        &self,
        state: BotState,
        candles: &[Candle],
        current_price: f64,
        balance: f64,
        cycle_time: DateTime<Utc>,
    ) -> (BotState, CycleReport) {
        let analysis = self.strategy.analyze(candles);
        let mut report = CycleReport::new(cycle_time, analysis);
        let BotState {
            mut position,
            mut last_processed,
        } = state;

        // Short windows have no levels yet; their bars wait until the window fills
        let required = self.strategy.min_candles_required();
        report.warming_up = candles.len() < required;
        let bars = if report.warming_up {
            tracing::debug!(
                symbol = %self.symbol,
                candles = candles.len(),
                required,
                "Warming up, deferring bar evaluation"
            );
            0..0
        } else {
            classifiable_range(candles.len())
        };

        for bar in bars {
            let candle = &candles[bar];
            if last_processed.is_some_and(|ts| candle.timestamp <= ts) {
                continue;
            }

            let record = report
                .analysis
                .records
                .get(bar)
                .cloned()
                .unwrap_or_else(|| SignalRecord::new(bar, candle, Signal::None));
            let signal = record.signal;

            if let Some(side) = signal.side() {
                let event = SignalEvent {
                    bar,
                    signal,
                    close: candle.close,
                    last_swing: report.analysis.last_swing(side),
                };
                match self.position_manager.on_signal(&position, event, balance) {
                    Ok(plan) => {
                        self.apply(&mut position, plan, &mut report, Some(bar), Some(signal))
                            .await
                    }
                    Err(e) => report.record_error(Some(bar), Some(signal), e),
                }
            }

            if let Some(transition) = self.position_manager.on_price(&position, candle.close) {
                self.apply(&mut position, vec![transition], &mut report, Some(bar), None)
                    .await;
            }

            last_processed = Some(candle.timestamp);
            report.processed.push(record);
        }

        if let Some(transition) = self.position_manager.on_price(&position, current_price) {
            self.apply(&mut position, vec![transition], &mut report, None, None)
                .await;
        }

        report.unrealized_pnl = position.unrealized_pnl(current_price);

        tracing::info!(
            symbol = %self.symbol,
            strategy = self.strategy.name(),
            bars = report.processed.len(),
            signals = report.processed.iter().filter(|r| !r.signal.is_none()).count(),
            fills = report.fills.len(),
            errors = report.errors.len(),
            side = ?position.side,
            size = position.size,
            unrealized_pnl = report.unrealized_pnl,
            "Cycle complete"
        );

        (
            BotState {
                position,
                last_processed,
            },
            report,
        )
    }

    /// Submit a plan in order, committing each transition on acknowledgment
    ///
    /// Stops at the first rejection; later steps depend on the earlier ones.
    async fn apply(
        &self,
        position: &mut Position,
        plan: Vec<Transition>,
        report: &mut CycleReport,
        bar: Option<usize>,
        signal: Option<Signal>,
    ) {
        for transition in plan {
            let order = transition.intent.to_request(&self.symbol);
            match self.sink.submit(&order).await {
                Ok(ack) => {
                    match &transition.intent {
                        OrderIntent::Open { side, size } => tracing::info!(
                            symbol = %self.symbol,
                            bar = ?bar,
                            side = %side,
                            size = *size,
                            entry = transition.next.entry_price,
                            stop = transition.next.stop_loss,
                            target = transition.next.target_price,
                            second_target = transition.next.second_target,
                            order_id = %ack.order_id,
                            "Opened position"
                        ),
                        OrderIntent::Close { size, reason } => tracing::info!(
                            symbol = %self.symbol,
                            bar = ?bar,
                            size = *size,
                            reason = ?reason,
                            order_id = %ack.order_id,
                            "Closed position"
                        ),
                    }
                    *position = transition.next;
                    report.fills.push(ack);
                }
                Err(e) => {
                    report.record_error(bar, signal, e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::order_sink::{rejected, PaperOrderSink};
    use crate::models::{OrderRequest, OrderSide, Side};
    use crate::Result;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    /// Strategy with fixed levels and signals on chosen bars
    struct ScriptedStrategy {
        signals: Vec<(usize, Signal)>,
        support: f64,
        resistance: f64,
        min_candles: usize,
    }

    impl Strategy for ScriptedStrategy {
        fn analyze(&self, candles: &[Candle]) -> Analysis {
            let records = candles
                .iter()
                .enumerate()
                .map(|(bar, candle)| {
                    let signal = self
                        .signals
                        .iter()
                        .find(|(b, _)| *b == bar)
                        .map(|(_, s)| *s)
                        .unwrap_or_default();
                    SignalRecord::new(bar, candle, signal)
                })
                .collect();
            Analysis {
                support: Some(self.support),
                resistance: Some(self.resistance),
                records,
                ..Analysis::default()
            }
        }

        fn name(&self) -> &str {
            "Scripted"
        }

        fn min_candles_required(&self) -> usize {
            self.min_candles
        }
    }

    /// Sink that records every order and rejects the sides it is told to
    #[derive(Default)]
    struct RecordingSink {
        inner: PaperOrderSink,
        reject: Vec<OrderSide>,
        seen: Mutex<Vec<OrderRequest>>,
    }

    impl OrderSink for RecordingSink {
        async fn submit(&self, order: &OrderRequest) -> Result<OrderAck> {
            self.seen.lock().unwrap().push(order.clone());
            if self.reject.contains(&order.side) {
                return Err(rejected(order, "test rejection"));
            }
            self.inner.submit(order).await
        }
    }

    fn candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Candle {
                timestamp: start + Duration::minutes(15 * i as i64),
                open: 100.0,
                high: 100.2,
                low: 99.8,
                close: 100.0,
                volume: 1.0,
            })
            .collect()
    }

    fn executor(
        signals: Vec<(usize, Signal)>,
        reject: Vec<OrderSide>,
    ) -> Executor<ScriptedStrategy, RecordingSink> {
        Executor::new(
            "BTCUSD",
            ScriptedStrategy {
                signals,
                support: 95.0,
                resistance: 105.0,
                min_candles: 0,
            },
            PositionManager::default(),
            RecordingSink {
                reject,
                ..RecordingSink::default()
            },
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_signal_opens_position_on_ack() {
        let exec = executor(vec![(2, Signal::BuyWPattern)], vec![]);
        let window = candles(6);

        let (state, report) = exec
            .run_cycle(BotState::default(), &window, 100.0, 1000.0, now())
            .await;

        assert_eq!(state.position.side, Some(Side::Buy));
        assert_eq!(state.position.entry_price, 100.0);
        assert_eq!(state.position.second_target, 95.0);
        assert_eq!(report.fills.len(), 1);
        assert!(report.errors.is_empty());
        // Bars 2 and 3 are classifiable in a six-bar window
        assert_eq!(report.processed.len(), 2);
        assert_eq!(state.last_processed, Some(window[3].timestamp));
    }

    #[tokio::test]
    async fn test_processed_bars_are_not_retraded() {
        let exec = executor(vec![(2, Signal::BuyWPattern)], vec![]);
        let window = candles(6);

        let (state, _) = exec
            .run_cycle(BotState::default(), &window, 100.0, 1000.0, now())
            .await;
        // A fresh state trades the same bar again
        let (fresh, _) = exec
            .run_cycle(BotState::default(), &window, 100.0, 1000.0, now())
            .await;
        assert_eq!(fresh.position, state.position);

        // Carrying the state forward skips bars already seen
        let (again, report) = exec.run_cycle(state.clone(), &window, 100.0, 1000.0, now()).await;
        assert!(report.processed.is_empty());
        assert!(report.fills.is_empty());
        assert_eq!(again, state);
        assert_eq!(exec.sink().seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_open_leaves_position_flat() {
        let exec = executor(vec![(2, Signal::BuyWPattern)], vec![OrderSide::Buy]);

        let (state, report) = exec
            .run_cycle(BotState::default(), &candles(6), 100.0, 1000.0, now())
            .await;

        assert!(!state.position.is_open());
        assert!(report.fills.is_empty());
        assert_eq!(report.errors.len(), 1);
        let err = &report.errors[0];
        assert_eq!(err.bar, Some(2));
        assert_eq!(err.signal, Some(Signal::BuyWPattern));
        assert_eq!(err.cycle_time, now());
        assert!(matches!(err.error, TrapError::OrderRejected { .. }));
    }

    #[tokio::test]
    async fn test_flip_with_rejected_open_ends_flat() {
        let exec = executor(vec![(2, Signal::BuyFakeBreakout)], vec![OrderSide::Buy]);
        let short = Position {
            side: Some(Side::Sell),
            size: 10.0,
            entry_price: 100.0,
            stop_loss: 100.5,
            target_price: 99.5,
            second_target: 105.0,
            partial_booked: false,
        };
        let state = BotState {
            position: short,
            last_processed: None,
        };

        let (state, report) = exec.run_cycle(state, &candles(6), 100.0, 1000.0, now()).await;

        assert_eq!(state.position, Position::flat());
        assert_eq!(report.fills.len(), 1);
        assert_eq!(report.fills[0].side, OrderSide::Close);
        assert_eq!(report.errors.len(), 1);

        let seen = exec.sink().seen.lock().unwrap();
        assert_eq!(seen[0].side, OrderSide::Close);
        assert_eq!(seen[1].side, OrderSide::Buy);
    }

    #[tokio::test]
    async fn test_current_price_books_first_target() {
        let exec = executor(vec![(2, Signal::BuyWPattern)], vec![]);

        let (state, report) = exec
            .run_cycle(BotState::default(), &candles(6), 100.6, 1000.0, now())
            .await;

        assert!(state.position.partial_booked);
        assert!((state.position.size - 5.0).abs() < 1e-9);
        assert_eq!(report.fills.len(), 2);
        assert_eq!(report.fills[1].side, OrderSide::Close);
        // Remaining five units marked at 100.6 against the 100.0 entry
        assert!((report.unrealized_pnl - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_balance_rejects_signal() {
        let exec = executor(vec![(2, Signal::SellMPattern)], vec![]);

        let (state, report) = exec
            .run_cycle(BotState::default(), &candles(6), 100.0, 0.0, now())
            .await;

        assert!(!state.position.is_open());
        assert!(matches!(
            report.errors[0].error,
            TrapError::InvalidRiskInput { .. }
        ));
        assert!(exec.sink().seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_window_only_checks_price() {
        let exec = executor(vec![], vec![]);
        let (state, report) = exec
            .run_cycle(BotState::default(), &candles(3), 100.0, 1000.0, now())
            .await;

        assert!(report.processed.is_empty());
        assert_eq!(state.last_processed, None);
    }

    #[tokio::test]
    async fn test_warmup_defers_bars_until_window_fills() {
        let mut exec = executor(vec![(2, Signal::BuyWPattern)], vec![]);
        exec.strategy.min_candles = 10;

        let (state, report) = exec
            .run_cycle(BotState::default(), &candles(6), 100.0, 1000.0, now())
            .await;
        assert!(report.warming_up);
        assert!(report.processed.is_empty());
        assert!(report.fills.is_empty());
        assert_eq!(state, BotState::default());

        // Once the window is long enough the deferred bars are evaluated
        let (state, report) = exec.run_cycle(state, &candles(10), 100.0, 1000.0, now()).await;
        assert!(!report.warming_up);
        assert_eq!(report.processed.len(), 6);
        assert_eq!(state.position.side, Some(Side::Buy));
        assert_eq!(report.unrealized_pnl, 0.0);
    }
}
