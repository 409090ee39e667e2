//! Session counters
//!
//! Counted by the driver as events happen and published in every snapshot.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Chat messages written to the transport, retries included
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Send attempts that ended with the message marked failed
    pub messages_failed: u64,
    /// Errors reported to subscribers
    pub errors: u64,
    /// Reconnect timers that fired
    pub reconnect_attempts: u64,
    /// Successful opens, the first one included
    pub connections: u64,
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl SessionStats {
    pub fn record_open(&mut self) {
        self.connections += 1;
        self.last_connected_at = Some(Utc::now());
    }

    /// Time since the last successful open
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<ChronoDuration> {
        self.last_connected_at.map(|at| now - at)
    }
}
