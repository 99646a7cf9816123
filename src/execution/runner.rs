use chrono::{DateTime, Utc};

use super::executor::{BotState, CycleReport, Executor};
use super::order_sink::OrderSink;
use super::price_feed::CandleFeed;
use super::scheduler::Scheduler;
use crate::api::CandleSource;
use crate::persistence::SignalArchive;
use crate::strategy::Strategy;
use crate::Result;

/// Totals over a run of cycles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub cycles: usize,
    pub skipped: usize,
    pub fills: usize,
    pub errors: usize,
}

/// Polling loop: fetch candles, run a cycle, archive the new bars
pub struct Runner<C, S, O> {
    feed: CandleFeed<C>,
    executor: Executor<S, O>,
    archive: Option<SignalArchive>,
    balance: f64,
    state: BotState,
}

impl<C: CandleSource, S: Strategy, O: OrderSink> Runner<C, S, O> {
    pub fn new(feed: CandleFeed<C>, executor: Executor<S, O>, balance: f64) -> Self {
        Self {
            feed,
            executor,
            archive: None,
            balance,
            state: BotState::default(),
        }
    }

    pub fn with_archive(mut self, archive: SignalArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_state(mut self, state: BotState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    pub fn executor(&self) -> &Executor<S, O> {
        &self.executor
    }

    /// One poll
    ///
    /// # Errors
    /// `DataUnavailable` when no candles could be fetched; the state is untouched and
    /// the cycle should be skipped. Archive failures are logged, not returned.
    pub async fn step(&mut self, cycle_time: DateTime<Utc>) -> Result<CycleReport> {
        let snapshot = self.feed.refresh().await?;

        let state = std::mem::take(&mut self.state);
        let (state, report) = self
            .executor
            .run_cycle(
                state,
                &snapshot.candles,
                snapshot.current_price,
                self.balance,
                cycle_time,
            )
            .await;
        self.state = state;

        if let Some(archive) = &self.archive {
            if let Err(e) = archive.append(cycle_time.date_naive(), &report.processed) {
                tracing::warn!(dir = %archive.dir().display(), "Failed to archive signals: {}", e);
            }
        }

        Ok(report)
    }

    /// Run cycles until the scheduler stops ticking
    pub async fn run<T: Scheduler>(&mut self, scheduler: &mut T) -> RunSummary {
        let mut summary = RunSummary::default();

        while let Some(cycle_time) = scheduler.tick().await {
            summary.cycles += 1;
            match self.step(cycle_time).await {
                Ok(report) => {
                    summary.fills += report.fills.len();
                    summary.errors += report.errors.len();
                }
                Err(e) => {
                    summary.skipped += 1;
                    tracing::warn!(
                        symbol = %self.feed.symbol(),
                        cycle = %cycle_time,
                        "Skipping cycle: {}",
                        e
                    );
                }
            }
        }

        tracing::info!(
            cycles = summary.cycles,
            skipped = summary.skipped,
            fills = summary.fills,
            errors = summary.errors,
            "Run finished"
        );

        summary
    }
}
