//! In-memory lock store
//!
//! Uses DashMap so each operation holds its key's shard lock for its whole
//! duration, which gives the per-key atomicity [`LockStore`] demands. Expiry
//! is evaluated lazily against the store's clock on every access.

use crate::clock::{Clock, SystemClock, duration_nanos};
use crate::error::{StoreError, StoreResult};
use crate::stores::LockStore;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// A stored value and its absolute expiry, if any
#[derive(Debug, Clone)]
struct Record {
    value: String,
    expires_at: Option<i64>,
}

impl Record {
    fn new(value: i64, ttl: Option<Duration>, now: i64) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| now.saturating_add(duration_nanos(ttl))),
        }
    }

    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory lock store
pub struct MemoryStore {
    records: DashMap<String, Record>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a store driven by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store whose TTLs run on `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        debug!("Creating new in-memory lock store");
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Write a raw value, bypassing every lock rule.
    ///
    /// Stands in for other processes (or corruption) in tests.
    pub fn insert_raw(&self, key: &str, value: impl Into<String>, ttl: Option<Duration>) {
        let now = self.clock.now_nanos();
        self.records.insert(
            key.to_string(),
            Record {
                value: value.into(),
                expires_at: ttl.map(|ttl| now.saturating_add(duration_nanos(ttl))),
            },
        );
    }

    /// Remaining TTL of a live key, `None` if absent or without expiry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_nanos();
        let record = self.records.get(key)?;
        if !record.is_live(now) {
            return None;
        }
        let at = record.expires_at?;
        Some(Duration::from_nanos(u64::try_from(at - now).unwrap_or(0)))
    }

    /// Whether a live key has an expiry set
    pub fn has_expiry(&self, key: &str) -> bool {
        let now = self.clock.now_nanos();
        self.records
            .get(key)
            .is_some_and(|r| r.is_live(now) && r.expires_at.is_some())
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = self.clock.now_nanos();
        self.records.iter().filter(|r| r.is_live(now)).count()
    }

    /// Whether no live keys remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired records
    pub fn purge_expired(&self) {
        let now = self.clock.now_nanos();
        self.records.retain(|_, r| r.is_live(now));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.records.len())
            .field("clock", &self.clock)
            .finish()
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<bool> {
        let now = self.clock.now_nanos();
        let record = Record::new(value, Some(ttl), now);

        let created = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    false
                } else {
                    occupied.insert(record);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                true
            }
        };

        trace!(key = %key, created = created, "Memory set_if_absent");
        Ok(created)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now_nanos();
        let value = self
            .records
            .get(key)
            .and_then(|r| r.is_live(now).then(|| r.value.clone()));

        if value.is_none() {
            self.records.remove_if(key, |_, r| !r.is_live(now));
        }

        Ok(value)
    }

    async fn swap(&self, key: &str, value: i64) -> StoreResult<Option<String>> {
        let now = self.clock.now_nanos();
        let record = Record::new(value, None, now);

        let previous = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let old = occupied.insert(record);
                old.is_live(now).then_some(old.value)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                None
            }
        };

        trace!(key = %key, previous = ?previous, "Memory swap");
        Ok(previous)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.clock.now_nanos();
        match self.records.get_mut(key) {
            Some(mut record) if record.is_live(now) => {
                record.expires_at = Some(now.saturating_add(duration_nanos(ttl)));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn swap_if_stale(
        &self,
        key: &str,
        value: i64,
        now_nanos: i64,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = self.clock.now_nanos();
        let record = Record::new(value, Some(ttl), now);

        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    let current = &occupied.get().value;
                    let held_until: i64 = current
                        .parse()
                        .map_err(|_| StoreError::invalid_value(key, current.clone()))?;
                    if held_until == 0 || now_nanos <= held_until {
                        return Ok(false);
                    }
                }
                occupied.insert(record);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(true)
            }
        }
    }

    fn supports_swap_if_stale(&self) -> bool {
        true
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(1_000_000_000);
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_set_if_absent_only_once() {
        let (store, _) = store();

        assert!(store.set_if_absent("k", 1, Duration::from_secs(1)).await.unwrap());
        assert!(!store.set_if_absent("k", 2, Duration::from_secs(1)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_key_expires_with_ttl() {
        let (store, clock) = store();

        store.set_if_absent("k", 1, Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_millis(999));
        assert!(store.get("k").await.unwrap().is_some());

        clock.advance(Duration::from_millis(1));
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());

        assert!(store.set_if_absent("k", 2, Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_swap_returns_previous_and_clears_ttl() {
        let (store, _) = store();

        assert_eq!(store.swap("k", 7).await.unwrap(), None);
        store.set_expiry("k", Duration::from_secs(5)).await.unwrap();
        assert!(store.has_expiry("k"));

        assert_eq!(store.swap("k", 8).await.unwrap().as_deref(), Some("7"));
        assert!(!store.has_expiry("k"));
    }

    #[tokio::test]
    async fn test_swap_over_expired_key_reports_none() {
        let (store, clock) = store();

        store.set_if_absent("k", 1, Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(store.swap("k", 2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_expiry_on_missing_key() {
        let (store, _) = store();
        assert!(!store.set_expiry("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_reports_remaining_time() {
        let (store, clock) = store();

        store.set_if_absent("k", 1, Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(4));

        assert_eq!(store.ttl("k"), Some(Duration::from_secs(6)));
        assert_eq!(store.ttl("missing"), None);
    }

    #[tokio::test]
    async fn test_swap_if_stale() {
        let (store, _) = store();
        let ttl = Duration::from_secs(1);

        // absent
        assert!(store.swap_if_stale("k", 50, 10, ttl).await.unwrap());
        // live claim at 50
        assert!(!store.swap_if_stale("k", 60, 50, ttl).await.unwrap());
        assert!(store.swap_if_stale("k", 60, 51, ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("60"));

        store.insert_raw("zero", "0", None);
        assert!(!store.swap_if_stale("zero", 60, 100, ttl).await.unwrap());

        store.insert_raw("junk", "not-a-number", None);
        let err = store.swap_if_stale("junk", 60, 100, ttl).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, clock) = store();

        store.insert_raw("short", "1", Some(Duration::from_secs(1)));
        store.insert_raw("forever", "1", None);
        clock.advance(Duration::from_secs(2));
        store.purge_expired();

        assert_eq!(store.len(), 1);
        assert_eq!(store.records.len(), 1);
    }
}
