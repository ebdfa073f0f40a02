//! Distributed locks over a shared key-value store
//!
//! A claim is the absolute instant, in nanoseconds since the Unix epoch, at
//! which the holder's lock becomes stale. There is no owner identity and no
//! unlock: a claim ends when its key expires or when a contender reclaims it
//! after that instant.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock, expire_after};
use crate::config::{LockConfig, ReclaimStrategy, RetryOn};
use crate::error::{LockError, LockResult};
use crate::stores::LockStore;

/// Distributed lock trait
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Make one attempt to claim `key` until `expire_at_nanos`.
    async fn lock(&self, key: &str, expire_at_nanos: i64) -> LockResult<()>;

    /// Attempt up to `retries + 1` times, waiting the configured interval
    /// between attempts.
    async fn lock_with_retries(&self, key: &str, expire_at_nanos: i64) -> LockResult<()>;
}

/// Lock coordinator bound to a shared store
pub struct Lock<S: LockStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    retries: u32,
    interval: Duration,
    retry_on: RetryOn,
    reclaim: ReclaimStrategy,
}

impl<S: LockStore + ?Sized> Lock<S> {
    /// Create a coordinator with the default retry policy and reclaim strategy.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Config`] when `retries` is zero or `interval` is
    /// zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keylock_core::{Lock, MemoryStore};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let store = Arc::new(MemoryStore::new());
    /// let lock = Lock::new(store, 5, Duration::from_millis(20)).unwrap();
    /// assert_eq!(lock.retries(), 5);
    ///
    /// assert!(Lock::new(Arc::new(MemoryStore::new()), 0, Duration::from_millis(20)).is_err());
    /// ```
    pub fn new(store: Arc<S>, retries: u32, interval: Duration) -> LockResult<Self> {
        Self::with_config(store, LockConfig::new(retries, interval))
    }

    /// Create a coordinator from a full configuration.
    pub fn with_config(store: Arc<S>, config: LockConfig) -> LockResult<Self> {
        LockBuilder::from_config(config).build(store)
    }

    /// Attempts beyond the first
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Wait between attempts
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// How stale claims are taken over
    pub fn reclaim_strategy(&self) -> ReclaimStrategy {
        self.reclaim
    }

    /// The backing store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The instant `ttl` from now on this coordinator's clock, ready to pass
    /// as `expire_at_nanos`.
    pub fn expire_after(&self, ttl: Duration) -> i64 {
        expire_after(self.clock.as_ref(), ttl)
    }

    async fn try_lock(&self, key: &str, expire_at_nanos: i64) -> LockResult<()> {
        if key.is_empty() {
            return Err(LockError::InvalidKey(key.to_string()));
        }

        let now = self.clock.now_nanos();
        if expire_at_nanos <= now {
            return Err(LockError::InvalidExpiration {
                expire_at_nanos,
                now_nanos: now,
            });
        }
        // The key outlives the claim by one nanosecond
        let ttl = claim_ttl(expire_at_nanos, now);

        if self.store.set_if_absent(key, expire_at_nanos, ttl).await? {
            info!(key = %key, expire_at = expire_at_nanos, "Acquired lock");
            return Ok(());
        }

        let Some(current) = self.store.get(key).await? else {
            // Expired between the two calls; the next attempt takes the fast path
            debug!(key = %key, "Lock vanished while contended");
            return Err(LockError::lock_failed(key));
        };

        let held_until = parse_claim(key, &current)?;
        if held_until == 0 || now <= held_until {
            debug!(key = %key, held_until = held_until, "Lock held by a live claim");
            return Err(LockError::lock_failed(key));
        }

        match self.reclaim {
            ReclaimStrategy::SwapAndRecheck => {
                self.swap_and_recheck(key, expire_at_nanos, now, ttl).await
            }
            ReclaimStrategy::CompareAndSwap => {
                self.compare_and_swap(key, expire_at_nanos, now, ttl).await
            }
        }
    }

    async fn swap_and_recheck(
        &self,
        key: &str,
        expire_at_nanos: i64,
        now: i64,
        ttl: Duration,
    ) -> LockResult<()> {
        let swapped_out = self.store.swap(key, expire_at_nanos).await?;

        // The swap dropped the key's TTL and the stored claim is now ours
        // whatever the outcome, so its expiry is restored on every path
        self.restore_expiry(key, ttl).await;

        // Absent means the stale claim expired under us, which is as good as stale
        let was_stale = match &swapped_out {
            Some(previous) => now > parse_claim(key, previous)?,
            None => true,
        };

        if !was_stale {
            // A competitor reclaimed first and this swap overwrote its claim
            debug!(key = %key, previous = ?swapped_out, "Lost reclamation race");
            return Err(LockError::lock_failed(key));
        }

        info!(key = %key, expire_at = expire_at_nanos, "Reclaimed stale lock");
        Ok(())
    }

    async fn restore_expiry(&self, key: &str, ttl: Duration) {
        match self.store.set_expiry(key, ttl).await {
            Ok(true) => {}
            Ok(false) => warn!(key = %key, "Swapped lock vanished before its expiry was set"),
            Err(e) => warn!(key = %key, error = %e, "Failed to set expiry on swapped lock"),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expire_at_nanos: i64,
        now: i64,
        ttl: Duration,
    ) -> LockResult<()> {
        if self
            .store
            .swap_if_stale(key, expire_at_nanos, now, ttl)
            .await?
        {
            info!(key = %key, expire_at = expire_at_nanos, "Reclaimed stale lock");
            Ok(())
        } else {
            debug!(key = %key, "Stale lock was reclaimed by another contender");
            Err(LockError::lock_failed(key))
        }
    }
}

#[async_trait]
impl<S: LockStore + ?Sized> DistributedLock for Lock<S> {
    async fn lock(&self, key: &str, expire_at_nanos: i64) -> LockResult<()> {
        self.try_lock(key, expire_at_nanos).await
    }

    async fn lock_with_retries(&self, key: &str, expire_at_nanos: i64) -> LockResult<()> {
        let max_attempts = self.retries.saturating_add(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match self.try_lock(key, expire_at_nanos).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(key = %key, attempt = attempt, "Lock acquired after retry");
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            if !self.retry_on.should_retry(&error) {
                return Err(error);
            }

            if attempt >= max_attempts {
                warn!(
                    key = %key,
                    attempts = attempt,
                    error = %error,
                    "Lock acquisition exhausted"
                );
                return Err(LockError::AcquisitionExhausted {
                    key: key.to_string(),
                    attempts: attempt,
                    last_error: Box::new(error),
                });
            }

            debug!(
                key = %key,
                attempt = attempt,
                delay = ?self.interval,
                error = %error,
                "Lock attempt failed, waiting before retry"
            );
            tokio::time::sleep(self.interval).await;
        }
    }
}

impl<S: LockStore + ?Sized> Clone for Lock<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            retries: self.retries,
            interval: self.interval,
            retry_on: self.retry_on.clone(),
            reclaim: self.reclaim,
        }
    }
}

impl<S: LockStore + ?Sized> fmt::Debug for Lock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("store", &self.store.store_type())
            .field("retries", &self.retries)
            .field("interval", &self.interval)
            .field("retry_on", &self.retry_on)
            .field("reclaim", &self.reclaim)
            .finish()
    }
}

/// Distributed lock builder
pub struct LockBuilder {
    config: LockConfig,
    clock: Arc<dyn Clock>,
}

impl LockBuilder {
    /// Create new lock builder
    pub fn new() -> Self {
        Self::from_config(LockConfig::default())
    }

    /// Start from an existing configuration
    pub fn from_config(config: LockConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Set attempts beyond the first
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Set the wait between attempts
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set which failures are retried
    pub fn retry_on(mut self, retry_on: RetryOn) -> Self {
        self.config.retry_on = retry_on;
        self
    }

    /// Set the reclaim strategy
    pub fn reclaim(mut self, reclaim: ReclaimStrategy) -> Self {
        self.config.reclaim = reclaim;
        self
    }

    /// Read time from `clock` instead of the system clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the lock
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Config`] for an invalid configuration, or when
    /// [`ReclaimStrategy::CompareAndSwap`] is asked of a store without
    /// [`LockStore::swap_if_stale`].
    pub fn build<S: LockStore + ?Sized>(self, store: Arc<S>) -> LockResult<Lock<S>> {
        self.config.validate()?;

        if self.config.reclaim == ReclaimStrategy::CompareAndSwap
            && !store.supports_swap_if_stale()
        {
            return Err(LockError::config(format!(
                "{} store cannot reclaim with compare-and-swap",
                store.store_type()
            )));
        }

        Ok(Lock {
            store,
            clock: self.clock,
            retries: self.config.retries,
            interval: self.config.interval,
            retry_on: self.config.retry_on,
            reclaim: self.config.reclaim,
        })
    }
}

impl Default for LockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// TTL covering `expire_at_nanos` plus one nanosecond, measured from `now`
fn claim_ttl(expire_at_nanos: i64, now: i64) -> Duration {
    let nanos = i128::from(expire_at_nanos) + 1 - i128::from(now);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

fn parse_claim(key: &str, raw: &str) -> LockResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| crate::StoreError::invalid_value(key, raw).into())
}
