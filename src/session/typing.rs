//! Typing indicators
//!
//! [`TypingSet`] tracks remote peers flagged as typing. Entries expire on
//! their own if no `typing=false` arrives, so a peer that disconnects while
//! typing does not stay flagged forever.
//!
//! [`TypingCoalescer`] turns local keystrokes into at most one `typing=true`
//! per burst and a `typing=false` once input goes quiet.

use super::timer::Debouncer;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Slack added to the typing debounce before an indicator lapses
pub const TYPING_GRACE: Duration = Duration::from_millis(500);

/// A remote peer currently typing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUser {
    pub user_id: String,
    /// Username from the frame, or the user id when none was sent
    pub display_name: String,
}

impl TypingUser {
    pub fn new(user_id: impl Into<String>, username: Option<String>) -> Self {
        let user_id = user_id.into();
        let display_name = username
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| user_id.clone());
        Self {
            user_id,
            display_name,
        }
    }
}

#[derive(Debug, Clone)]
struct TypingEntry {
    user: TypingUser,
    expires_at: Instant,
}

/// Remote peers flagged as typing, in the order they started
#[derive(Debug, Clone)]
pub struct TypingSet {
    entries: Vec<TypingEntry>,
    ttl: Duration,
}

impl TypingSet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Vec::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Flag a user as typing, refreshing the expiry of an existing entry.
    /// Returns whether the visible set changed.
    pub fn insert(&mut self, user: TypingUser, now: Instant) -> bool {
        let expires_at = now + self.ttl;
        match self
            .entries
            .iter_mut()
            .find(|e| e.user.user_id == user.user_id)
        {
            Some(entry) => {
                entry.expires_at = expires_at;
                if entry.user != user {
                    entry.user = user;
                    true
                } else {
                    false
                }
            }
            None => {
                self.entries.push(TypingEntry { user, expires_at });
                true
            }
        }
    }

    pub fn remove(&mut self, user_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.user.user_id != user_id);
        self.entries.len() != before
    }

    /// Drop entries whose expiry has passed; returns their user ids
    pub fn prune(&mut self, now: Instant) -> Vec<String> {
        let mut expired = Vec::new();
        self.entries.retain(|e| {
            if e.expires_at <= now {
                expired.push(e.user.user_id.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    /// Earliest pending expiry
    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.expires_at).min()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.iter().any(|e| e.user.user_id == user_id)
    }

    pub fn users(&self) -> Vec<TypingUser> {
        self.entries.iter().map(|e| e.user.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether anything was removed
    pub fn clear(&mut self) -> bool {
        let had_entries = !self.entries.is_empty();
        self.entries.clear();
        had_entries
    }
}

/// Debounces local typing activity
#[derive(Debug)]
pub struct TypingCoalescer {
    active: bool,
    idle: Debouncer,
}

impl TypingCoalescer {
    /// `debounce` is the configured typing debounce; the inactivity timeout
    /// adds [`TYPING_GRACE`] on top
    pub fn new(debounce: Duration) -> Self {
        Self {
            active: false,
            idle: Debouncer::new(debounce + TYPING_GRACE),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle.delay()
    }

    /// Record a change of the local input.
    /// Returns `Some(true)` when `typing=true` should be sent now.
    ///
    /// Any change restarts the inactivity timer while the flag is set,
    /// including clearing the input; blank input never sets the flag.
    pub fn input_changed(&mut self, content: &str) -> Option<bool> {
        if content.trim().is_empty() {
            if self.active {
                self.idle.trigger();
            }
            return None;
        }
        self.idle.trigger();
        if self.active {
            None
        } else {
            self.active = true;
            Some(true)
        }
    }

    /// Resolve when input has been quiet for the idle timeout; returns
    /// whether the flag was set, i.e. whether `typing=false` should be sent
    pub async fn expired(&mut self) -> bool {
        self.idle.fired().await;
        std::mem::replace(&mut self.active, false)
    }

    /// Stop immediately; returns whether `typing=false` should be sent
    pub fn stop(&mut self) -> bool {
        self.idle.cancel();
        std::mem::replace(&mut self.active, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[test]
    fn test_display_name_falls_back_to_user_id() {
        assert_eq!(TypingUser::new("u1", None).display_name, "u1");
        assert_eq!(
            TypingUser::new("u1", Some(" ".to_string())).display_name,
            "u1"
        );
        assert_eq!(
            TypingUser::new("u1", Some("Ana".to_string())).display_name,
            "Ana"
        );
    }

    #[test]
    fn test_typing_set_add_refresh_remove() {
        let mut set = TypingSet::new(Duration::from_millis(1500));
        let now = Instant::now();

        assert!(set.insert(TypingUser::new("bob", None), now));
        assert!(!set.insert(
            TypingUser::new("bob", None),
            now + Duration::from_millis(200)
        ));
        assert_eq!(
            set.next_expiry(),
            Some(now + Duration::from_millis(1700))
        );
        assert!(set.insert(TypingUser::new("bob", Some("Bob".to_string())), now));
        assert_eq!(set.users()[0].display_name, "Bob");

        assert!(set.remove("bob"));
        assert!(!set.remove("bob"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_typing_set_prune() {
        let mut set = TypingSet::new(Duration::from_millis(1000));
        let now = Instant::now();
        set.insert(TypingUser::new("a", None), now);
        set.insert(
            TypingUser::new("b", None),
            now + Duration::from_millis(500),
        );

        assert!(set.prune(now + Duration::from_millis(999)).is_empty());
        assert_eq!(set.prune(now + Duration::from_millis(1000)), vec!["a"]);
        assert!(set.contains("b"));
        assert_eq!(set.next_expiry(), Some(now + Duration::from_millis(1500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescer_emits_once_per_burst() {
        let mut typing = TypingCoalescer::new(Duration::from_millis(1000));
        assert_eq!(typing.input_changed("h"), Some(true));
        assert_eq!(typing.input_changed("he"), None);
        assert_eq!(typing.input_changed("hel"), None);
        assert!(typing.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescer_ignores_blank_input() {
        let mut typing = TypingCoalescer::new(Duration::from_millis(1000));
        assert_eq!(typing.input_changed("   "), None);
        assert!(!typing.is_active());
        assert!(timeout(Duration::from_secs(5), typing.expired())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescer_goes_idle_after_debounce_plus_grace() {
        let mut typing = TypingCoalescer::new(Duration::from_millis(1000));
        let start = Instant::now();
        typing.input_changed("h");
        tokio::time::sleep(Duration::from_millis(1000)).await;
        typing.input_changed("hi");

        assert!(typing.expired().await);
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
        assert!(!typing.is_active());
        assert_eq!(typing.input_changed("hi!"), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearing_input_restarts_idle_timer() {
        let mut typing = TypingCoalescer::new(Duration::from_millis(1000));
        let start = Instant::now();
        assert_eq!(typing.input_changed("h"), Some(true));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(typing.input_changed(""), None);
        assert!(typing.is_active());

        assert!(typing.expired().await);
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescer_stop() {
        let mut typing = TypingCoalescer::new(Duration::from_millis(1000));
        assert!(!typing.stop());
        typing.input_changed("x");
        assert!(typing.stop());
        assert!(timeout(Duration::from_secs(5), typing.expired())
            .await
            .is_err());
    }
}
