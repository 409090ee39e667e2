//! Owned timer primitives
//!
//! Timers here are plain fields of the session. An expiry is observed only by
//! awaiting it from the session loop, so cancelling or dropping the timer
//! guarantees the expiry is never acted upon.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};

/// Single-shot timer that can be armed, re-armed and cancelled
#[derive(Debug, Default)]
pub struct OneShot {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl OneShot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer to expire after `delay`
    pub fn arm(&mut self, delay: Duration) {
        self.arm_at(Instant::now() + delay);
    }

    pub fn arm_at(&mut self, deadline: Instant) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(sleep_until(deadline))),
        }
    }

    /// Disarm the timer; returns whether it was armed
    pub fn cancel(&mut self) -> bool {
        self.sleep.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|sleep| sleep.deadline())
    }

    /// Resolve when the armed timer expires, disarming it.
    /// Never resolves while disarmed.
    pub async fn expired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => pending::<()>().await,
        }
    }
}

/// Last-call-wins debounce: every trigger pushes the expiry out by `delay`
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    timer: OneShot,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timer: OneShot::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn trigger(&mut self) {
        self.timer.arm(self.delay);
    }

    pub fn cancel(&mut self) -> bool {
        self.timer.cancel()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_armed()
    }

    /// Resolve once `delay` has passed since the last trigger
    pub async fn fired(&mut self) {
        self.timer.expired().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_expires_once() {
        let mut timer = OneShot::new();
        timer.arm(Duration::from_millis(100));
        assert!(timer.is_armed());

        let start = Instant::now();
        timer.expired().await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert!(!timer.is_armed());

        // Disarmed timers never resolve
        assert!(timeout(Duration::from_secs(10), timer.expired())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_cancel() {
        let mut timer = OneShot::new();
        timer.arm(Duration::from_millis(50));
        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert!(timeout(Duration::from_millis(200), timer.expired())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_last_trigger_wins() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let start = Instant::now();

        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.trigger();

        debouncer.fired().await;
        assert_eq!(start.elapsed(), Duration::from_millis(700));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_moves_deadline() {
        let mut timer = OneShot::new();
        timer.arm(Duration::from_millis(100));
        let first = timer.deadline().unwrap();
        timer.arm(Duration::from_millis(500));
        assert_eq!(timer.deadline().unwrap() - first, Duration::from_millis(400));
    }
}
