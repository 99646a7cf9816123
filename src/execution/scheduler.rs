use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};

/// Source of polling ticks
///
/// Each tick yields the cycle time, or `None` once the schedule is exhausted.
#[allow(async_fn_in_trait)]
pub trait Scheduler {
    async fn tick(&mut self) -> Option<DateTime<Utc>>;
}

/// Wall-clock schedule backed by a tokio interval
///
/// The first tick fires immediately.
pub struct IntervalScheduler {
    interval: Interval,
}

impl IntervalScheduler {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        // A slow cycle pushes the next one back instead of bursting
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl Scheduler for IntervalScheduler {
    async fn tick(&mut self) -> Option<DateTime<Utc>> {
        self.interval.tick().await;
        Some(Utc::now())
    }
}

/// Pre-scripted schedule that never sleeps
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    ticks: VecDeque<DateTime<Utc>>,
}

impl ManualScheduler {
    pub fn new(ticks: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self {
            ticks: ticks.into_iter().collect(),
        }
    }

    /// `count` ticks spaced `step` apart starting at `start`
    pub fn every(start: DateTime<Utc>, step: chrono::Duration, count: usize) -> Self {
        Self::new((0..count).map(|i| start + step * i as i32))
    }

    pub fn remaining(&self) -> usize {
        self.ticks.len()
    }
}

impl Scheduler for ManualScheduler {
    async fn tick(&mut self) -> Option<DateTime<Utc>> {
        self.ticks.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_manual_scheduler_runs_out() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut scheduler = ManualScheduler::every(start, chrono::Duration::minutes(15), 3);

        assert_eq!(scheduler.remaining(), 3);
        assert_eq!(scheduler.tick().await, Some(start));
        assert_eq!(
            scheduler.tick().await,
            Some(start + chrono::Duration::minutes(15))
        );
        assert!(scheduler.tick().await.is_some());
        assert_eq!(scheduler.tick().await, None);
    }

    #[tokio::test]
    async fn test_interval_scheduler_first_tick_is_immediate() {
        let mut scheduler = IntervalScheduler::new(Duration::from_secs(3600));
        let before = Utc::now();
        let tick = tokio::time::timeout(Duration::from_secs(1), scheduler.tick())
            .await
            .unwrap();
        assert!(tick.unwrap() >= before);
    }
}
