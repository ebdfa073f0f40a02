//! Lock storage backends
//!
//! - **Memory**: In-process storage using DashMap (tests, single-instance)
//! - **Redis**: Shared storage for coordinating separate processes

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisLockStore;

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::time::Duration;

/// Single-key atomic primitives a lock is built on.
///
/// Each method must be atomic on its own at the store. Claims are written as
/// decimal integers and read back as raw strings; parsing is the caller's job.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` to `value` with `ttl` only if the key does not exist.
    /// Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<bool>;

    /// Read the current value of `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditionally set `key` to `value`, returning the previous value.
    ///
    /// The key loses any TTL it had.
    async fn swap(&self, key: &str, value: i64) -> StoreResult<Option<String>>;

    /// Refresh the TTL of an existing key. Returns `false` if the key is gone.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Atomically write `value` with `ttl` if `key` is absent or holds a
    /// non-zero claim strictly earlier than `now_nanos`.
    ///
    /// Returns whether the write happened. Stores that cannot do this in one
    /// step leave the default, which reports [`StoreError::Unsupported`].
    async fn swap_if_stale(
        &self,
        key: &str,
        value: i64,
        now_nanos: i64,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let _ = (key, value, now_nanos, ttl);
        Err(StoreError::Unsupported {
            store: self.store_type(),
            operation: "swap_if_stale",
        })
    }

    /// Whether [`swap_if_stale`](Self::swap_if_stale) is implemented.
    fn supports_swap_if_stale(&self) -> bool {
        false
    }

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}
