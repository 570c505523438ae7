use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use triage_state::{StateError, StateKey, StateStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}

/// In-memory [`StateStore`] backed by a concurrent map.
///
/// Expiry is lazy: expired entries are dropped on access. Suitable for
/// single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn expires_at(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|d| Instant::now() + d)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let canonical = key.canonical();
        if let Some(entry) = self.entries.get(&canonical) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(&canonical);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        self.entries.insert(
            key.canonical(),
            Entry {
                value: value.to_owned(),
                expires_at: Self::expires_at(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        Ok(self.entries.remove(&key.canonical()).is_some())
    }

    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let canonical = key.canonical();
        // The entry API holds the shard lock across the existence check and
        // the insert, making check-and-set atomic.
        let mut newly_set = false;
        let mut entry = self.entries.entry(canonical).or_insert_with(|| {
            newly_set = true;
            Entry {
                value: value.to_owned(),
                expires_at: Self::expires_at(ttl),
            }
        });
        if !newly_set && entry.is_expired() {
            entry.value = value.to_owned();
            entry.expires_at = Self::expires_at(ttl);
            newly_set = true;
        }
        Ok(newly_set)
    }

    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError> {
        let canonical = key.canonical();
        let mut entry = self.entries.entry(canonical).or_insert_with(|| Entry {
            value: "0".to_owned(),
            expires_at: Self::expires_at(ttl),
        });
        if entry.is_expired() {
            entry.value = "0".to_owned();
            entry.expires_at = Self::expires_at(ttl);
        }
        let current: i64 = entry
            .value
            .parse()
            .map_err(|e| StateError::Serialization(format!("counter is not an integer: {e}")))?;
        let next = current + delta;
        entry.value = next.to_string();
        Ok(next)
    }
}
