//! Distributed locks for keylock
//!
//! Independent processes coordinate exclusive access to a named resource
//! through a shared key-value store, without talking to each other.
//!
//! ## Features
//!
//! - **Expiration-stamped claims** - the value under a lock key is the instant
//!   the claim goes stale, so a crashed holder never blocks forever
//! - **Reclamation** - stale claims are taken over by swap-and-recheck, or by
//!   a single atomic compare-and-swap where the store offers one
//! - **Explicit retry policy** - choose whether store failures are retried
//!   alongside contention
//! - **Pluggable stores** - in-memory store included, Redis behind the
//!   `redis` feature
//!
//! ## Quick Start
//!
//! ```rust
//! use keylock_core::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), LockError> {
//! let store = Arc::new(MemoryStore::new());
//! let lock = Lock::new(store, 3, Duration::from_millis(50))?;
//!
//! // Hold "job-42" for ten seconds
//! let expire_at = lock.expire_after(Duration::from_secs(10));
//! lock.lock_with_retries("job-42", expire_at).await?;
//!
//! // A second claim fails until the first one goes stale
//! let err = lock.lock("job-42", lock.expire_after(Duration::from_secs(20))).await;
//! assert!(err.unwrap_err().is_lock_failed());
//! # Ok(())
//! # }
//! ```
//!
//! ### Redis
//!
//! ```rust,ignore
//! use keylock_core::*;
//! use keylock_redis::RedisConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::from_addrs(&["s3cret@127.0.0.1:6379"], 0)?;
//!     let store = Arc::new(RedisLockStore::connect(config).await?);
//!
//!     let lock = LockBuilder::from_config(LockConfig::from_env().build()?)
//!         .reclaim(ReclaimStrategy::CompareAndSwap)
//!         .build(store)?;
//!
//!     lock.lock_with_retries("nightly-report", lock.expire_after(Duration::from_secs(60)))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod lock;
pub mod stores;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DEFAULT_INTERVAL, DEFAULT_RETRIES, LockConfig, LockConfigBuilder, ReclaimStrategy, RetryOn,
    RetryPredicate,
};
pub use error::{LockError, LockResult, StoreError, StoreResult};
pub use lock::{DistributedLock, Lock, LockBuilder};
pub use stores::{LockStore, MemoryStore};

#[cfg(feature = "redis")]
pub use stores::RedisLockStore;
