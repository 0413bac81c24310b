//! Shared counter store abstraction.
//!
//! The rate limiter counts against a store shared across gateway instances.
//! The store only needs three primitives (`get`, `increment_with_ttl`,
//! `set_if_absent`); anything providing those atomically can back the
//! gateway. The bundled [`MemoryStore`] keeps counters in-process and is
//! used for tests and single-node deployments.

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Operations the gateway requires from a shared counter store.
///
/// Every call is expected to complete within a short timeout; callers treat
/// any error as the store being unavailable and fail open to local counting.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Get the current value for a key, if any.
    async fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Atomically increment a key, setting its TTL, and return the new value.
    ///
    /// The TTL is applied on every increment so the entry outlives the
    /// window it counts by a full period.
    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Set a key only when absent. Returns `true` when the value was set.
    async fn set_if_absent(&self, key: &str, value: u64, ttl: Duration) -> Result<bool>;
}
