//! Core rate limiter implementation.
//!
//! Counts requests in fixed windows against a shared counter store when one
//! is configured, falling back to in-process counting when the store errors
//! or times out. The fallback is per-call: a store outage degrades accuracy
//! for the affected requests, it never rejects them.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::store::CounterStore;

use super::local::LocalCounters;
use super::rules::{RateLimitRule, RuleSet};
use super::window::{now_epoch, window_start, RateLimitInfo};

/// Default timeout for a single shared-store call.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// Per-path fixed-window admission control.
///
/// Thread-safe; one instance is shared across all request tasks.
pub struct RateLimiter {
    /// Configured rules, keyed by path.
    rules: RwLock<RuleSet>,
    /// Shared counter store, when counting is distributed.
    store: Option<Arc<dyn CounterStore>>,
    /// In-process counters: the only backend when `store` is `None`, the
    /// fail-open fallback otherwise.
    local: Arc<LocalCounters>,
    /// Budget for one store round trip.
    store_timeout: Duration,
}

/// One row of the rate limiter's metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitRuleSnapshot {
    pub path: String,
    pub limit: u64,
    pub period_secs: u64,
}

impl RateLimiter {
    /// Create a limiter that counts in-process only.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(RuleSet::new()),
            store: None,
            local: Arc::new(LocalCounters::new()),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Create a limiter that counts against a shared store.
    pub fn with_store(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    /// Override the per-call store timeout.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// The local counter map, for wiring up the periodic sweep.
    pub fn local_counters(&self) -> Arc<LocalCounters> {
        Arc::clone(&self.local)
    }

    /// Configure the rate limit for a path.
    ///
    /// Fails with a configuration error when `limit` or `period_secs` is
    /// zero; validation happens here, never at request time.
    pub fn set_rate_limit(&self, path: &str, limit: u64, period_secs: u64) -> Result<()> {
        let rule = RateLimitRule::new(limit, period_secs)?;
        debug!(path, limit, period_secs, "Configured rate limit");
        self.rules.write().set(path, rule);
        Ok(())
    }

    /// Replace the default rule used by unconfigured paths.
    pub fn set_default_rule(&self, limit: u64, period_secs: u64) -> Result<()> {
        let rule = RateLimitRule::new(limit, period_secs)?;
        self.rules.write().set_default(rule);
        Ok(())
    }

    /// Check and consume one request for `client_key` against the rule for
    /// `path`.
    ///
    /// Returns whether the request is admitted along with the window
    /// snapshot for the response headers. The request that pushes the count
    /// past the limit is the first rejected one.
    pub async fn check_rate_limit(&self, client_key: &str, path: &str) -> (bool, RateLimitInfo) {
        self.check_rate_limit_at(client_key, path, now_epoch()).await
    }

    /// As [`check_rate_limit`](Self::check_rate_limit) with an explicit
    /// clock, so window rollover is testable.
    pub async fn check_rate_limit_at(
        &self,
        client_key: &str,
        path: &str,
        now: u64,
    ) -> (bool, RateLimitInfo) {
        let rule = self.rules.read().get(path);
        let start = window_start(now, rule.period_secs);

        let count = match &self.store {
            Some(store) => match self.store_increment(store, client_key, rule, start).await {
                Some(count) => count,
                None => {
                    // Store down or slow: count locally for this call only.
                    self.local.increment(client_key, rule, now)
                }
            },
            None => self.local.increment(client_key, rule, now),
        };

        let allowed = count <= rule.limit;
        let info = RateLimitInfo::for_count(rule.limit, count, start, rule.period_secs);

        trace!(
            client_key,
            path,
            count,
            limit = rule.limit,
            allowed,
            "Rate limit checked"
        );

        (allowed, info)
    }

    /// Increment the shared counter, or `None` when the store fails.
    async fn store_increment(
        &self,
        store: &Arc<dyn CounterStore>,
        client_key: &str,
        rule: RateLimitRule,
        start: u64,
    ) -> Option<u64> {
        let key = format!("rate:{client_key}:{start}");
        let increment = store.increment_with_ttl(&key, rule.counter_ttl());

        match tokio::time::timeout(self.store_timeout, increment).await {
            Ok(Ok(count)) => Some(count),
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Counter store error, falling back to local counting");
                None
            }
            Err(_) => {
                warn!(key = %key, timeout_ms = self.store_timeout.as_millis() as u64, "Counter store timed out, falling back to local counting");
                None
            }
        }
    }

    /// Configured rules (including the default) for the metrics document.
    pub fn snapshot(&self) -> Vec<RateLimitRuleSnapshot> {
        let rules = self.rules.read();
        let mut snapshot: Vec<RateLimitRuleSnapshot> = rules
            .iter()
            .map(|(path, rule)| RateLimitRuleSnapshot {
                path: path.to_string(),
                limit: rule.limit,
                period_secs: rule.period_secs,
            })
            .collect();
        snapshot.sort_by(|a, b| a.path.cmp(&b.path));

        let default = rules.default_rule();
        snapshot.push(RateLimitRuleSnapshot {
            path: "*".to_string(),
            limit: default.limit,
            period_secs: default.period_secs,
        });
        snapshot
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
