//! In-process counter backend.
//!
//! Used directly when no shared store is configured, and as the fail-open
//! fallback when the shared store is unavailable. Counters live in a single
//! map behind a short critical section; every operation is O(1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::rules::RateLimitRule;
use super::window::window_start;

/// One counter for one client key within one window.
#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    window_start: u64,
    period_secs: u64,
}

impl Counter {
    /// A counter expires two full periods after its window opened.
    fn expired_at(&self, now: u64) -> bool {
        now >= self.window_start + self.period_secs * 2
    }
}

/// In-process fixed-window counters keyed by `{client_key}:{window_start}`.
#[derive(Debug, Default)]
pub struct LocalCounters {
    counters: Mutex<HashMap<String, Counter>>,
}

impl LocalCounters {
    /// Create an empty counter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for a client key in the window containing
    /// `now`, returning the post-increment count.
    ///
    /// The same client's previous-window entry is purged opportunistically
    /// on the way through, keeping the access path O(1).
    pub fn increment(&self, client_key: &str, rule: RateLimitRule, now: u64) -> u64 {
        let start = window_start(now, rule.period_secs);
        let key = format!("{client_key}:{start}");

        let mut counters = self.counters.lock();

        // The entry for the window before this one is dead weight now.
        if start >= rule.period_secs {
            let previous = format!("{}:{}", client_key, start - rule.period_secs);
            if counters.remove(&previous).is_some() {
                trace!(key = %previous, "Purged stale local counter");
            }
        }

        let counter = counters.entry(key).or_insert(Counter {
            count: 0,
            window_start: start,
            period_secs: rule.period_secs,
        });
        counter.count += 1;
        counter.count
    }

    /// Drop every counter past its expiry.
    pub fn sweep(&self, now: u64) {
        let mut counters = self.counters.lock();
        let before = counters.len();
        counters.retain(|_, counter| !counter.expired_at(now));
        let removed = before - counters.len();
        if removed > 0 {
            debug!(removed, remaining = counters.len(), "Swept local counters");
        }
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.counters.lock().len()
    }

    /// Whether no counters are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the periodic sweep for these counters.
    ///
    /// The returned handle owns the task; dropping it stops the sweep.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        let counters = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                counters.sweep(super::window::now_epoch());
            }
        });
        SweepHandle { handle }
    }
}

/// Owned handle for the periodic sweep task; aborts the task on drop.
#[derive(Debug)]
pub struct SweepHandle {
    handle: JoinHandle<()>,
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(limit: u64, period: u64) -> RateLimitRule {
        RateLimitRule::new(limit, period).unwrap()
    }

    #[test]
    fn test_increment_counts_within_window() {
        let counters = LocalCounters::new();
        let r = rule(10, 60);

        assert_eq!(counters.increment("client:/api", r, 1_000), 1);
        assert_eq!(counters.increment("client:/api", r, 1_010), 2);
        assert_eq!(counters.increment("client:/api", r, 1_019), 3);
    }

    #[test]
    fn test_new_window_starts_fresh() {
        let counters = LocalCounters::new();
        let r = rule(10, 60);

        counters.increment("client:/api", r, 1_000);
        counters.increment("client:/api", r, 1_001);

        // 1_000 sits in window [960, 1020); 1_020 opens the next one.
        assert_eq!(counters.increment("client:/api", r, 1_020), 1);
    }

    #[test]
    fn test_previous_window_purged_on_access() {
        let counters = LocalCounters::new();
        let r = rule(10, 60);

        counters.increment("client:/api", r, 1_000);
        counters.increment("client:/api", r, 1_020);

        // The [960, 1020) entry was removed when the new window opened.
        assert_eq!(counters.len(), 1);
    }

    #[test]
    fn test_sweep_removes_expired() {
        let counters = LocalCounters::new();
        let r = rule(10, 60);

        counters.increment("a:/api", r, 1_000);
        counters.increment("b:/api", r, 1_000);
        assert_eq!(counters.len(), 2);

        // Both windows started at 960 and expire at 960 + 120.
        counters.sweep(1_079);
        assert_eq!(counters.len(), 2);
        counters.sweep(1_080);
        assert!(counters.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let counters = Arc::new(LocalCounters::new());
        let handle = counters.start_sweeper(Duration::from_millis(10));
        drop(handle);
        // Nothing to assert beyond the task being aborted without panics.
    }
}
