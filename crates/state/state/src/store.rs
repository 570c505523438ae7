use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::StateKey;

/// Trait for short-TTL key/value state.
///
/// The store is best-effort by contract: consumers (token broker,
/// idempotency marks, lockout counters) must remain correct when an entry is
/// missing or lost — durable state lives in the triage store, not here.
/// Implementations must be `Send + Sync` and safe for concurrent access;
/// concurrent writers may race and the last writer wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError>;

    /// Set a value with an optional TTL, overwriting any previous value.
    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Check if a key exists; if not, set it atomically with an optional TTL.
    /// Returns `true` if the key was newly set, `false` if it already existed.
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError>;

    /// Atomically increment a counter by `delta`. Returns the new value.
    /// Creates the counter at 0 if it doesn't exist before incrementing;
    /// the TTL applies only when the counter is created.
    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError>;
}
