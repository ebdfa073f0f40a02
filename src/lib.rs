// keylock - distributed mutual exclusion over a shared key-value store
//
// Processes coordinate through expiration-stamped claims written to the store;
// a claim left behind by a crashed holder is reclaimed once it goes stale.

// Re-export core functionality
pub use keylock_core::*;

// Re-export optional crates
#[cfg(feature = "redis")]
pub use keylock_redis;

#[cfg(feature = "redis")]
pub use keylock_redis::{RedisConfig, RedisService};

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Clock,
        DistributedLock,
        Lock,
        LockBuilder,
        LockConfig,
        LockError,
        LockResult,
        LockStore,
        MemoryStore,
        ReclaimStrategy,
        RetryOn,
        StoreError,
        SystemClock,
    };

    #[cfg(feature = "redis")]
    pub use crate::{RedisConfig, RedisLockStore};
}
