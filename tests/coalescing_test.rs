//! Tests for [`CoalescingCache`] — single-flight, TTL, FIFO eviction,
//! never-cache-failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use vidgate::{CacheConfig, CoalescingCache, VidgateError};

/// A fetch closure that counts its invocations, sleeps, then yields.
fn counted_fetch(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
    value: &str,
) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = vidgate::Result<String>> + Send>>
+ Send
+ 'static {
    let calls = Arc::clone(calls);
    let value = value.to_string();
    move || {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(value)
        })
    }
}

fn new_cache(max_entries: usize) -> CoalescingCache<String> {
    CoalescingCache::new(CacheConfig::new().max_entries(max_entries)).unwrap()
}

// =========================================================================
// Configuration
// =========================================================================

#[test]
fn cache_config_defaults() {
    let config = CacheConfig::default();
    assert_eq!(config.max_entries, vidgate::DEFAULT_MAX_ENTRIES);
    assert!(config.sweep_interval.is_none());
}

#[test]
fn zero_capacity_rejected_at_construction() {
    let err = CoalescingCache::<String>::new(CacheConfig::new().max_entries(0)).unwrap_err();
    assert!(matches!(err, VidgateError::Configuration(_)));
}

#[test]
fn zero_sweep_interval_rejected_at_construction() {
    let err = CoalescingCache::<String>::new(
        CacheConfig::new().sweep_interval(Duration::ZERO),
    )
    .unwrap_err();
    assert!(matches!(err, VidgateError::Configuration(_)));
}

#[tokio::test]
async fn zero_ttl_rejected_per_call() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));

    let err = cache
        .get_or_compute("k", Duration::ZERO, counted_fetch(&calls, Duration::ZERO, "v"))
        .await
        .unwrap_err();

    assert!(matches!(err, VidgateError::Configuration(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "fetch must not run");
}

// =========================================================================
// Single-flight
// =========================================================================

#[tokio::test]
async fn concurrent_callers_share_one_fetch() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    let (a, b, c, d, e) = tokio::join!(
        cache.get_or_compute("k", ttl, counted_fetch(&calls, Duration::from_millis(50), "v")),
        cache.get_or_compute("k", ttl, counted_fetch(&calls, Duration::from_millis(50), "v")),
        cache.get_or_compute("k", ttl, counted_fetch(&calls, Duration::from_millis(50), "v")),
        cache.get_or_compute("k", ttl, counted_fetch(&calls, Duration::from_millis(50), "v")),
        cache.get_or_compute("k", ttl, counted_fetch(&calls, Duration::from_millis(50), "v")),
    );

    for result in [a, b, c, d, e] {
        assert_eq!(result.unwrap(), "v");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_keys_fetch_independently() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    let (a, b) = tokio::join!(
        cache.get_or_compute("k1", ttl, counted_fetch(&calls, Duration::from_millis(20), "v1")),
        cache.get_or_compute("k2", ttl, counted_fetch(&calls, Duration::from_millis(20), "v2")),
    );

    assert_eq!(a.unwrap(), "v1");
    assert_eq!(b.unwrap(), "v2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn waiters_all_receive_the_same_error() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    let failing = |calls: &Arc<AtomicUsize>| {
        let calls = Arc::clone(calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Err::<String, _>(VidgateError::ProcessFailed {
                exit_code: Some(1),
                stderr: "boom".into(),
            })
        }
    };

    let (a, b, c) = tokio::join!(
        cache.get_or_compute("k", ttl, failing(&calls)),
        cache.get_or_compute("k", ttl, failing(&calls)),
        cache.get_or_compute("k", ttl, failing(&calls)),
    );

    for result in [a, b, c] {
        match result.unwrap_err() {
            VidgateError::ProcessFailed { exit_code, stderr } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_caller_does_not_abort_the_shared_fetch() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    // Leader starts a 100ms fetch, then is aborted mid-flight.
    let leader = {
        let cache = cache.clone();
        let fetch = counted_fetch(&calls, Duration::from_millis(100), "v");
        tokio::spawn(async move { cache.get_or_compute("k", ttl, fetch).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second caller attaches to the in-flight fetch.
    let waiter = {
        let cache = cache.clone();
        let fetch = counted_fetch(&calls, Duration::from_millis(100), "v");
        tokio::spawn(async move { cache.get_or_compute("k", ttl, fetch).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    leader.abort();

    let result = waiter.await.unwrap();
    assert_eq!(result.unwrap(), "v");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // And the result was cached despite the leader's cancellation.
    assert_eq!(cache.get("k"), Some("v".to_string()));
}

#[tokio::test]
async fn panicking_fetch_rejects_waiters_and_allows_retry() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    let panicking = {
        let calls = Arc::clone(&calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if calls.load(Ordering::SeqCst) > 0 {
                panic!("fetch blew up");
            }
            Ok::<String, VidgateError>(String::new())
        }
    };

    let err = cache.get_or_compute("k", ttl, panicking).await.unwrap_err();
    assert!(matches!(err, VidgateError::FetchAborted));

    // The in-flight record was cleaned up; the key is fetchable again.
    let value = cache
        .get_or_compute("k", ttl, counted_fetch(&calls, Duration::ZERO, "v"))
        .await
        .unwrap();
    assert_eq!(value, "v");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =========================================================================
// TTL expiry
// =========================================================================

#[tokio::test]
async fn live_entry_is_returned_without_fetching() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    for _ in 0..5 {
        let value = cache
            .get_or_compute("k", ttl, counted_fetch(&calls, Duration::ZERO, "v"))
            .await
            .unwrap();
        assert_eq!(value, "v");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1, "only the first read fetches");
}

#[tokio::test]
async fn expired_entry_triggers_exactly_one_refetch() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_millis(80);

    cache
        .get_or_compute("k", ttl, counted_fetch(&calls, Duration::ZERO, "old"))
        .await
        .unwrap();

    // Still fresh.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let value = cache
        .get_or_compute("k", ttl, counted_fetch(&calls, Duration::ZERO, "new"))
        .await
        .unwrap();
    assert_eq!(value, "old");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Past the TTL.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let value = cache
        .get_or_compute("k", ttl, counted_fetch(&calls, Duration::ZERO, "new"))
        .await
        .unwrap();
    assert_eq!(value, "new");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =========================================================================
// Failure policy
// =========================================================================

#[tokio::test]
async fn failure_is_never_cached() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    let failing = {
        let calls = Arc::clone(&calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(VidgateError::Timeout {
                timeout: Duration::from_secs(30),
            })
        }
    };

    let err = cache.get_or_compute("k", ttl, failing).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(cache.is_empty(), "failures must not be stored");

    // The next call fetches again instead of replaying the failure.
    let value = cache
        .get_or_compute("k", ttl, counted_fetch(&calls, Duration::ZERO, "v"))
        .await
        .unwrap();
    assert_eq!(value, "v");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =========================================================================
// Capacity bound (FIFO eviction)
// =========================================================================

#[tokio::test]
async fn oldest_entry_is_evicted_at_capacity() {
    let cache = new_cache(3);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    for key in ["k1", "k2", "k3", "k4"] {
        cache
            .get_or_compute(key, ttl, counted_fetch(&calls, Duration::ZERO, key))
            .await
            .unwrap();
    }

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get("k1"), None, "oldest insertion is evicted first");
    for key in ["k2", "k3", "k4"] {
        assert_eq!(cache.get(key), Some(key.to_string()));
    }
}

#[tokio::test]
async fn replacing_an_existing_key_does_not_evict() {
    let cache = new_cache(2);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    cache
        .get_or_compute("k1", ttl, counted_fetch(&calls, Duration::ZERO, "v1"))
        .await
        .unwrap();
    cache
        .get_or_compute("k2", ttl, counted_fetch(&calls, Duration::ZERO, "v2"))
        .await
        .unwrap();

    // Force a fresh fetch for k1 by invalidating; the re-insert replaces,
    // it must not push k2 out.
    cache.invalidate("k1");
    cache
        .get_or_compute("k1", ttl, counted_fetch(&calls, Duration::ZERO, "v1b"))
        .await
        .unwrap();

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("k1"), Some("v1b".to_string()));
    assert_eq!(cache.get("k2"), Some("v2".to_string()));
}

// =========================================================================
// Explicit invalidation and sweeping
// =========================================================================

#[tokio::test]
async fn invalidate_forces_a_refetch() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    cache
        .get_or_compute("k", ttl, counted_fetch(&calls, Duration::ZERO, "v"))
        .await
        .unwrap();

    assert!(cache.invalidate("k"));
    assert!(!cache.invalidate("k"), "second invalidation is a no-op");

    cache
        .get_or_compute("k", ttl, counted_fetch(&calls, Duration::ZERO, "v"))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn purge_expired_drops_only_stale_entries() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_or_compute("stale1", Duration::from_millis(30), counted_fetch(&calls, Duration::ZERO, "a"))
        .await
        .unwrap();
    cache
        .get_or_compute("stale2", Duration::from_millis(30), counted_fetch(&calls, Duration::ZERO, "b"))
        .await
        .unwrap();
    cache
        .get_or_compute("fresh", Duration::from_secs(60), counted_fetch(&calls, Duration::ZERO, "c"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(cache.purge_expired(), 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("fresh"), Some("c".to_string()));
}

#[tokio::test]
async fn sweeper_removes_expired_entries_in_the_background() {
    let cache = CoalescingCache::new(
        CacheConfig::new()
            .max_entries(10)
            .sweep_interval(Duration::from_millis(40)),
    )
    .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_or_compute("k", Duration::from_millis(30), counted_fetch(&calls, Duration::ZERO, "v"))
        .await
        .unwrap();

    let sweeper = cache.spawn_sweeper().expect("interval configured");
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(cache.is_empty(), "sweeper should have purged the entry");
    sweeper.abort();
}

#[test]
fn sweeper_is_absent_without_an_interval() {
    // No interval configured: spawn_sweeper returns before touching the
    // runtime, so no runtime is needed here.
    let cache = new_cache(10);
    assert!(cache.spawn_sweeper().is_none());
}

// =========================================================================
// Scenario: five concurrent callers, then one after expiry (spec scenario)
// =========================================================================

#[tokio::test]
async fn coalesce_then_expire_scenario() {
    let cache: CoalescingCache<serde_json::Value> =
        CoalescingCache::new(CacheConfig::default()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_millis(1000);

    let fetch = |calls: &Arc<AtomicUsize>| {
        let calls = Arc::clone(calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(serde_json::json!({"id": "abc"}))
        }
    };

    let started = Instant::now();
    let (a, b, c, d, e) = tokio::join!(
        cache.get_or_compute("video:abc", ttl, fetch(&calls)),
        cache.get_or_compute("video:abc", ttl, fetch(&calls)),
        cache.get_or_compute("video:abc", ttl, fetch(&calls)),
        cache.get_or_compute("video:abc", ttl, fetch(&calls)),
        cache.get_or_compute("video:abc", ttl, fetch(&calls)),
    );
    for result in [a, b, c, d, e] {
        assert_eq!(result.unwrap(), serde_json::json!({"id": "abc"}));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A sixth caller at t=1500ms lands after expiry and refetches.
    let elapsed = started.elapsed();
    tokio::time::sleep(Duration::from_millis(1500).saturating_sub(elapsed)).await;
    let sixth = cache
        .get_or_compute("video:abc", ttl, fetch(&calls))
        .await
        .unwrap();
    assert_eq!(sixth, serde_json::json!({"id": "abc"}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
