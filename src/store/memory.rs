//! In-process counter store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;

use super::CounterStore;

/// An entry with its expiry deadline.
#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at: Instant,
}

/// A [`CounterStore`] backed by an in-process map.
///
/// TTLs are validated lazily at read time; expired entries are replaced on
/// the next write for their key. This store is per-instance, so it provides
/// the same counting semantics as the distributed store without the shared
/// view.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let value = self.entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.value)
            } else {
                None
            }
        });
        Ok(value)
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: 0,
            expires_at: now + ttl,
        });

        if entry.expires_at <= now {
            entry.value = 0;
        }
        entry.value += 1;
        entry.expires_at = now + ttl;
        Ok(entry.value)
    }

    async fn set_if_absent(&self, key: &str, value: u64, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut inserted = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            inserted = true;
            Entry {
                value,
                expires_at: now + ttl,
            }
        });

        // A dead entry counts as absent.
        if !inserted && entry.expires_at <= now {
            entry.value = value;
            entry.expires_at = now + ttl;
            inserted = true;
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_and_get() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.increment_with_ttl("k", ttl).await.unwrap(), 1);
        assert_eq!(store.increment_with_ttl("k", ttl).await.unwrap(), 2);
        assert_eq!(store.get("k").await.unwrap(), Some(2));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_resets_on_increment() {
        let store = MemoryStore::new();

        store
            .increment_with_ttl("k", Duration::from_millis(0))
            .await
            .unwrap();

        // TTL already elapsed: reads see nothing, the next write restarts.
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(
            store
                .increment_with_ttl("k", Duration::from_secs(60))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.set_if_absent("k", 7, ttl).await.unwrap());
        assert!(!store.set_if_absent("k", 9, ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store
            .increment_with_ttl("dead", Duration::from_millis(0))
            .await
            .unwrap();
        store
            .increment_with_ttl("live", Duration::from_secs(60))
            .await
            .unwrap();

        store.purge_expired();
        assert_eq!(store.len(), 1);
    }
}
