//! Circuit breaker state machines.
//!
//! One independent state machine per path. All transitions are evaluated
//! lazily on access; there is no background thread. State is per gateway
//! instance by design: strict cross-instance consistency is traded for
//! availability, each instance forms its own view of a failing downstream.

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::ratelimit::now_epoch;

/// Failures tolerated before opening, when a path has no explicit config.
const DEFAULT_THRESHOLD: u32 = 5;
/// Seconds an open circuit waits before admitting a trial request.
const DEFAULT_RECOVERY_SECS: u64 = 60;

/// The three circuit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CircuitState {
    /// Normal operation; requests pass through.
    Closed,
    /// The downstream is failing; requests are rejected without being sent.
    Open,
    /// One trial request is in flight to probe recovery.
    HalfOpen,
}

/// Validated breaker configuration for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    pub threshold: u32,
    /// Seconds before an open circuit admits a trial.
    pub recovery_secs: u64,
}

impl CircuitConfig {
    /// Create a config, validating both fields eagerly.
    pub fn new(threshold: u32, recovery_secs: u64) -> Result<Self> {
        if threshold == 0 {
            return Err(GatewayError::Config(
                "circuit breaker threshold must be greater than zero".to_string(),
            ));
        }
        if recovery_secs == 0 {
            return Err(GatewayError::Config(
                "circuit breaker recovery time must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            threshold,
            recovery_secs,
        })
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            recovery_secs: DEFAULT_RECOVERY_SECS,
        }
    }
}

/// The state machine for a single path.
#[derive(Debug)]
struct Breaker {
    state: CircuitState,
    config: CircuitConfig,
    /// Consecutive failures since the last success or reset.
    failure_count: u32,
    last_failure_at: Option<u64>,
    last_state_change_at: u64,
}

impl Breaker {
    fn new(config: CircuitConfig, now: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            config,
            failure_count: 0,
            last_failure_at: None,
            last_state_change_at: now,
        }
    }
}

/// One row of the circuit breaker metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub path: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub threshold: u32,
    pub recovery_secs: u64,
    pub last_failure_at: Option<u64>,
    pub last_state_change_at: u64,
}

/// Registry of per-path circuit breakers.
///
/// Breakers are created on first configuration or first recorded failure and
/// persist for the process lifetime. Thread-safe; each operation touches one
/// map entry under a short critical section.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    breakers: DashMap<String, Breaker>,
}

impl CircuitBreaker {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the breaker for a path, creating it when absent.
    ///
    /// Reconfiguring an existing breaker keeps its current state and counts.
    pub fn configure(&self, path: &str, threshold: u32, recovery_secs: u64) -> Result<()> {
        let config = CircuitConfig::new(threshold, recovery_secs)?;
        debug!(path, threshold, recovery_secs, "Configured circuit breaker");
        self.breakers
            .entry(path.to_string())
            .and_modify(|breaker| breaker.config = config)
            .or_insert_with(|| Breaker::new(config, now_epoch()));
        Ok(())
    }

    /// Whether a request for this path may proceed.
    ///
    /// Returns `false` only while the circuit is strictly open and the
    /// recovery time has not elapsed. The first check after the recovery
    /// time moves the breaker to half-open and admits exactly one trial;
    /// further checks during the trial are rejected.
    pub fn check_circuit(&self, path: &str) -> bool {
        self.check_circuit_at(path, now_epoch())
    }

    /// As [`check_circuit`](Self::check_circuit) with an explicit clock.
    pub fn check_circuit_at(&self, path: &str, now: u64) -> bool {
        let Some(mut breaker) = self.breakers.get_mut(path) else {
            // No breaker exists until a path is configured or fails.
            return true;
        };

        match breaker.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if now.saturating_sub(breaker.last_state_change_at) >= breaker.config.recovery_secs
                {
                    breaker.state = CircuitState::HalfOpen;
                    breaker.last_state_change_at = now;
                    info!(path, "Circuit breaker half-open, admitting trial request");
                    true
                } else {
                    false
                }
            }
            // The trial is already in flight.
            CircuitState::HalfOpen => false,
        }
    }

    /// Record a successful downstream call for a path.
    pub fn record_success(&self, path: &str) {
        self.record_success_at(path, now_epoch());
    }

    fn record_success_at(&self, path: &str, now: u64) {
        let Some(mut breaker) = self.breakers.get_mut(path) else {
            return;
        };

        match breaker.state {
            CircuitState::Closed => {
                breaker.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                breaker.state = CircuitState::Closed;
                breaker.failure_count = 0;
                breaker.last_state_change_at = now;
                info!(path, "Circuit breaker closed after successful trial");
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed downstream call for a path, creating the breaker on
    /// first failure.
    pub fn record_failure(&self, path: &str) {
        self.record_failure_at(path, now_epoch());
    }

    /// As [`record_failure`](Self::record_failure) with an explicit clock.
    pub fn record_failure_at(&self, path: &str, now: u64) {
        let mut breaker = self
            .breakers
            .entry(path.to_string())
            .or_insert_with(|| Breaker::new(CircuitConfig::default(), now));

        breaker.last_failure_at = Some(now);

        match breaker.state {
            CircuitState::Closed => {
                breaker.failure_count += 1;
                if breaker.failure_count >= breaker.config.threshold {
                    breaker.state = CircuitState::Open;
                    breaker.last_state_change_at = now;
                    warn!(
                        path,
                        failures = breaker.failure_count,
                        threshold = breaker.config.threshold,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // The trial failed; reopen and restart the recovery timer.
                breaker.state = CircuitState::Open;
                breaker.last_state_change_at = now;
                warn!(path, "Circuit breaker reopened after failed trial");
            }
            CircuitState::Open => {}
        }
    }

    /// The current state for a path, if a breaker exists.
    pub fn state(&self, path: &str) -> Option<CircuitState> {
        self.breakers.get(path).map(|breaker| breaker.state)
    }

    /// Every breaker's state for the metrics document.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut snapshot: Vec<CircuitSnapshot> = self
            .breakers
            .iter()
            .map(|entry| CircuitSnapshot {
                path: entry.key().clone(),
                state: entry.state,
                failure_count: entry.failure_count,
                threshold: entry.config.threshold,
                recovery_secs: entry.config.recovery_secs,
                last_failure_at: entry.last_failure_at,
                last_state_change_at: entry.last_state_change_at,
            })
            .collect();
        snapshot.sort_by(|a, b| a.path.cmp(&b.path));
        snapshot
    }
}
