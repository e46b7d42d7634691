//! Bounded most-recently-seen set, used to gate the SSE dispatch pipeline and
//! the per-watcher "notify at most once" invariants (crash notification,
//! escalation dedup, bead-activity per-action dedup).
//!
//! Time-bounded with lazy cleanup: entries older than `ttl` are dropped on the
//! next call to [`Dedup::seen`] rather than on a background ticker, which
//! keeps the type lock-free of any task of its own.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct Dedup {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Dedup {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Default one-hour TTL, matching the escalation-dedup window in the
    /// decisions watcher.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(3600))
    }

    /// Returns `true` if `key` was already recorded within the TTL window;
    /// otherwise records it now and returns `false`.
    pub fn seen(&self, key: impl Into<String>) -> bool {
        let key = key.into();
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap();
        seen.retain(|_, at| now.duration_since(*at) < self.ttl);
        if seen.contains_key(&key) {
            true
        } else {
            seen.insert(key, now);
            false
        }
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Dedup {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seen_returns_false_second_returns_true() {
        let dedup = Dedup::new(Duration::from_secs(60));
        assert!(!dedup.seen("beads.bead.created:dec-1"));
        assert!(dedup.seen("beads.bead.created:dec-1"));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let dedup = Dedup::new(Duration::from_secs(60));
        assert!(!dedup.seen("a"));
        assert!(!dedup.seen("b"));
        assert!(dedup.seen("a"));
    }

    #[test]
    fn expired_entries_are_seen_again() {
        let dedup = Dedup::new(Duration::from_millis(10));
        assert!(!dedup.seen("k"));
        std::thread::sleep(Duration::from_millis(25));
        assert!(!dedup.seen("k"));
    }

    #[test]
    fn does_not_grow_unboundedly_past_ttl() {
        let dedup = Dedup::new(Duration::from_millis(5));
        for i in 0..50 {
            dedup.seen(format!("k{i}"));
        }
        std::thread::sleep(Duration::from_millis(20));
        // one more call triggers the lazy sweep
        dedup.seen("trigger");
        assert!(dedup.len() <= 2);
    }
}
