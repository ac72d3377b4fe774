use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Periodic refresh trigger.
///
/// The first tick lands one period after construction because session start
/// already runs a refresh of its own. Ticks carry no filter; the session reads
/// the selection when a tick fires.
#[derive(Debug)]
pub struct PollScheduler {
    interval: Interval,
    ticks: u64,
}

impl PollScheduler {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        // a stalled loop should not burst refreshes to catch up
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { interval, ticks: 0 }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Cancel-safe, so it can sit in a `select!` next to other events.
    pub async fn tick(&mut self) -> u64 {
        self.interval.tick().await;
        self.ticks += 1;
        self.ticks
    }
}
