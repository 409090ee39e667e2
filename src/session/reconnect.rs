//! Reconnection scheduling
//!
//! The decision whether to reconnect is a pure function of the close code,
//! the retry counter and the policy. [`ReconnectScheduler`] pairs that
//! decision with the single-shot timer that triggers the next attempt.

use super::timer::OneShot;
use crate::config::ConnectionSection;
use crate::transport::is_clean_close;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reconnection policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub exponential_backoff: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ConnectionSection::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ConnectionSection) -> Self {
        Self {
            enabled: config.reconnect_enabled,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            exponential_backoff: config.exponential_backoff,
        }
    }

    /// Delay before the next attempt given the current retry counter:
    /// `retry_delay * 2^counter`, or `retry_delay` with backoff disabled
    pub fn backoff_delay(&self, retry_counter: u32) -> Duration {
        if !self.exponential_backoff {
            return self.retry_delay;
        }
        let factor = 2u32.checked_pow(retry_counter).unwrap_or(u32::MAX);
        self.retry_delay.saturating_mul(factor)
    }

    /// Sum of every delay the policy allows before giving up
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_retries)
            .map(|counter| self.backoff_delay(counter))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Why no reconnect was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The caller asked to disconnect
    DisconnectRequested,
    /// The peer closed with 1000
    CleanClose,
    /// Automatic reconnection is switched off
    Disabled,
}

/// Outcome of a close event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectionDecision {
    /// Try again after `delay`; this will be attempt number `attempt`
    Schedule { attempt: u32, delay: Duration },
    Suppressed(SuppressReason),
    /// Retry budget used up
    Exhausted { attempts: u32 },
}

/// Decide what follows a close event (pure function)
pub fn decide(
    policy: &ReconnectPolicy,
    retry_counter: u32,
    close_code: u16,
    disconnect_requested: bool,
) -> ReconnectionDecision {
    if disconnect_requested {
        return ReconnectionDecision::Suppressed(SuppressReason::DisconnectRequested);
    }
    if is_clean_close(close_code) {
        return ReconnectionDecision::Suppressed(SuppressReason::CleanClose);
    }
    if !policy.enabled {
        return ReconnectionDecision::Suppressed(SuppressReason::Disabled);
    }
    if retry_counter >= policy.max_retries {
        return ReconnectionDecision::Exhausted {
            attempts: retry_counter,
        };
    }
    ReconnectionDecision::Schedule {
        attempt: retry_counter + 1,
        delay: policy.backoff_delay(retry_counter),
    }
}

/// Retry counter plus the pending reconnect timer
#[derive(Debug)]
pub struct ReconnectScheduler {
    policy: ReconnectPolicy,
    retry_counter: u32,
    timer: OneShot,
}

impl ReconnectScheduler {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            retry_counter: 0,
            timer: OneShot::new(),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn retry_counter(&self) -> u32 {
        self.retry_counter
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_armed()
    }

    /// Handle a close event, arming the timer when a retry is due
    pub fn on_close(&mut self, close_code: u16, disconnect_requested: bool) -> ReconnectionDecision {
        let decision = decide(
            &self.policy,
            self.retry_counter,
            close_code,
            disconnect_requested,
        );
        match &decision {
            ReconnectionDecision::Schedule { attempt, delay } => {
                info!(
                    "Reconnect attempt {}/{} in {:?} (close code {})",
                    attempt, self.policy.max_retries, delay, close_code
                );
                self.timer.arm(*delay);
            }
            ReconnectionDecision::Suppressed(reason) => {
                debug!("Reconnect suppressed: {:?} (close code {})", reason, close_code);
            }
            ReconnectionDecision::Exhausted { attempts } => {
                warn!("Reconnect budget exhausted after {} attempts", attempts);
            }
        }
        decision
    }

    /// Resolve when the reconnect timer fires; returns the attempt number.
    /// The retry counter is incremented on fire.
    pub async fn fired(&mut self) -> u32 {
        self.timer.expired().await;
        self.retry_counter = self.retry_counter.saturating_add(1);
        self.retry_counter
    }

    /// Cancel a pending reconnect; returns whether one was pending
    pub fn cancel(&mut self) -> bool {
        self.timer.cancel()
    }

    /// Successful open or manual restart: fresh retry budget
    pub fn reset(&mut self) {
        self.retry_counter = 0;
        self.timer.cancel();
    }
}
