//! Integration tests for common keylock workflows.
//!
//! These tests go through the facade crate the way an application would.

use keylock::prelude::*;
use keylock::ManualClock;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_lock_from_deserialized_config() {
    let config: LockConfig =
        serde_json::from_str(r#"{"retries": 2, "interval_ms": 10, "retry_on": "contention"}"#)
            .unwrap();

    let lock = Lock::with_config(Arc::new(MemoryStore::new()), config).unwrap();
    assert_eq!(lock.retries(), 2);
    assert_eq!(lock.interval(), Duration::from_millis(10));
    assert_eq!(lock.reclaim_strategy(), ReclaimStrategy::SwapAndRecheck);
}

#[test]
fn test_degenerate_config_fails_at_construction() {
    let store = Arc::new(MemoryStore::new());

    let err = Lock::new(store.clone(), 0, Duration::from_millis(10)).unwrap_err();
    assert!(matches!(err, LockError::Config(_)));

    let err = Lock::new(store, 3, Duration::ZERO).unwrap_err();
    assert!(matches!(err, LockError::Config(_)));
}

// =============================================================================
// Acquisition Workflows
// =============================================================================

#[tokio::test]
async fn test_worker_pool_runs_job_once() {
    init_tracing();

    let clock = ManualClock::starting_now();
    let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));

    // Three workers share one store, each with its own coordinator
    let workers: Vec<_> = (0..3)
        .map(|_| {
            LockBuilder::new()
                .retries(1)
                .interval(Duration::from_millis(1))
                .clock(Arc::new(clock.clone()))
                .build(Arc::clone(&store))
                .unwrap()
        })
        .collect();

    let mut ran = 0;
    for worker in &workers {
        let expire_at = worker.expire_after(Duration::from_secs(30));
        if worker.lock("nightly-report", expire_at).await.is_ok() {
            ran += 1;
        }
    }
    assert_eq!(ran, 1);

    // The holder crashed; once its claim is stale another worker takes over
    clock.advance(Duration::from_secs(31));
    let expire_at = workers[2].expire_after(Duration::from_secs(30));
    workers[2]
        .lock_with_retries("nightly-report", expire_at)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_trait_object_coordinator() {
    let store: Arc<dyn LockStore> = Arc::new(MemoryStore::new());
    let lock: Arc<dyn DistributedLock> =
        Arc::new(Lock::new(store, 1, Duration::from_millis(1)).unwrap());

    let expire_at = SystemClock.now_nanos() + 5_000_000_000;
    lock.lock("shared", expire_at).await.unwrap();
    assert!(lock.lock("shared", expire_at).await.unwrap_err().is_lock_failed());
}

// =============================================================================
// Redis Workflows
// =============================================================================

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_job_scenario() {
    init_tracing();

    let config = RedisConfig::from_addrs(&["127.0.0.1:6379"], 0).unwrap();
    let store = Arc::new(RedisLockStore::connect(config).await.unwrap());
    store.service().delete("keylock-it-job-42").await.unwrap();

    let lock = LockBuilder::new()
        .reclaim(ReclaimStrategy::CompareAndSwap)
        .build(store.clone())
        .unwrap();

    lock.lock("keylock-it-job-42", lock.expire_after(Duration::from_secs(1)))
        .await
        .unwrap();
    let err = lock
        .lock("keylock-it-job-42", lock.expire_after(Duration::from_secs(2)))
        .await
        .unwrap_err();
    assert!(err.is_lock_failed());

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    lock.lock("keylock-it-job-42", lock.expire_after(Duration::from_secs(2)))
        .await
        .unwrap();

    store.service().delete("keylock-it-job-42").await.unwrap();
}

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_reclaims_stale_claim_still_present() {
    init_tracing();

    for strategy in [ReclaimStrategy::SwapAndRecheck, ReclaimStrategy::CompareAndSwap] {
        let config = RedisConfig::from_addrs(&["127.0.0.1:6379"], 0).unwrap();
        let store = Arc::new(RedisLockStore::connect(config).await.unwrap());
        let key = "keylock-it-stale";

        // An abandoned claim that lost its TTL stays in Redis until reclaimed
        let stale = SystemClock.now_nanos() - 1_000_000_000;
        store.service().set(key, stale).await.unwrap();
        assert_eq!(store.service().pttl(key).await.unwrap(), None);

        let lock = LockBuilder::new().reclaim(strategy).build(store.clone()).unwrap();
        let expire_at = lock.expire_after(Duration::from_secs(5));
        lock.lock(key, expire_at).await.unwrap();

        assert_eq!(
            store.service().get_value::<String>(key).await.unwrap(),
            Some(expire_at.to_string())
        );
        let ttl = store.service().pttl(key).await.unwrap().unwrap();
        assert!(ttl > Duration::from_secs(4) && ttl <= Duration::from_millis(5_001), "{:?}", strategy);

        store.service().delete(key).await.unwrap();
    }
}
