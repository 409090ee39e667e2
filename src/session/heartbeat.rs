//! Keep-alive ticker
//!
//! Runs only while a transport is open. The first tick fires one full period
//! after start; the session re-checks that the transport is still open on
//! every tick before sending a `ping`.

use std::future::pending;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct HeartbeatMonitor {
    period: Duration,
    ticker: Option<Interval>,
}

impl HeartbeatMonitor {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            ticker: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start ticking; restarting resets the phase
    pub fn start(&mut self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    /// Stop ticking; returns whether the monitor was running
    pub fn stop(&mut self) -> bool {
        self.ticker.take().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Resolve on the next tick. Never resolves while stopped.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => pending::<()>().await,
        }
    }
}
