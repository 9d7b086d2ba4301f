pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Boundary over the shared key-value store backing the idempotency tracker.
///
/// The tracker only needs four primitives: read, atomic create-if-absent
/// with TTL, value-level compare-and-swap, and a prefix scan for the cleanup
/// sweep. Any backend with these semantics can sit behind this trait; the
/// CAS retry loop lives in the tracker, not here.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key` only if the key is absent. Returns whether
    /// the write happened. The TTL is applied atomically with the write.
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Replaces the value under `key` only if the current value equals
    /// `expected`. Returns whether the swap happened. A fresh TTL is applied
    /// on success.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
