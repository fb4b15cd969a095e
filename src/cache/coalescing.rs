//! Get-or-compute cache with single-flight de-duplication.
//!
//! See the [module docs](super) for the per-key state machine and the
//! concurrency contract.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::telemetry;
use crate::{Result, VidgateError};

/// Default maximum number of cache entries.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Configuration for [`CoalescingCache`].
///
/// ```rust
/// # use vidgate::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(200)
///     .sweep_interval(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before FIFO eviction. Default: 50.
    pub max_entries: usize,
    /// Interval for the optional proactive expiry sweep
    /// ([`CoalescingCache::spawn_sweeper()`]). `None` (the default)
    /// disables the sweeper; correctness never depends on it.
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            sweep_interval: None,
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Enable the proactive expiry sweep at the given interval.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }
}

/// One cached value. Logically absent once `expires_at` has passed.
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    /// Monotonic insertion sequence; eviction removes the smallest.
    /// A counter rather than an `Instant` so same-tick insertions still
    /// have a total order.
    inserted_seq: u64,
}

/// Shared state: the entry map and the in-flight map. Guarded by one
/// mutex, never held across an await.
struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    in_flight: HashMap<String, Vec<oneshot::Sender<Result<V>>>>,
    seq: u64,
}

/// Request-coalescing TTL cache.
///
/// [`get_or_compute()`](Self::get_or_compute) returns a live cached value,
/// or performs exactly one underlying fetch shared among all concurrent
/// callers for that key. Successful results are cached for the caller's
/// TTL; failures are never cached — the next call retries.
///
/// Per-key lifecycle: `Absent → InFlight → Cached` on success,
/// `Absent → InFlight → Absent` on failure, `Cached → Absent` on expiry
/// (checked lazily on read) or [`invalidate()`](Self::invalidate).
/// At most one entry and at most one in-flight fetch exist per key.
///
/// Cheap to clone; clones share the same state.
pub struct CoalescingCache<V> {
    inner: Arc<Mutex<Inner<V>>>,
    max_entries: usize,
    sweep_interval: Option<Duration>,
}

impl<V> std::fmt::Debug for CoalescingCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingCache")
            .field("max_entries", &self.max_entries)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl<V> Clone for CoalescingCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            max_entries: self.max_entries,
            sweep_interval: self.sweep_interval,
        }
    }
}

impl<V> CoalescingCache<V>
where
    V: Clone + Send + 'static,
{
    /// Create a cache from the given configuration.
    ///
    /// Fails fast with [`VidgateError::Configuration`] on a zero capacity
    /// or a zero sweep interval.
    pub fn new(config: CacheConfig) -> Result<Self> {
        if config.max_entries == 0 {
            return Err(VidgateError::Configuration(
                "cache capacity must be at least 1".into(),
            ));
        }
        if let Some(interval) = config.sweep_interval
            && interval.is_zero()
        {
            return Err(VidgateError::Configuration(
                "sweep interval must be positive".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                seq: 0,
            })),
            max_entries: config.max_entries,
            sweep_interval: config.sweep_interval,
        })
    }

    // A poisoned lock means a panic inside one of our own critical
    // sections, which contain no panicking operations; recover the guard
    // rather than hang every waiter behind the poison.
    fn locked(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached value for `key`, or compute it via `fetch`.
    ///
    /// - A live entry is returned immediately without suspending.
    /// - If another caller is already fetching `key`, this caller waits for
    ///   that fetch and receives the identical outcome; `fetch` is dropped
    ///   uninvoked.
    /// - Otherwise this caller becomes the leader: `fetch` runs in a
    ///   detached task (so no caller's cancellation can abort it), its
    ///   success is cached for `ttl`, and its outcome — success or failure —
    ///   is delivered to every waiter that arrived in the meantime.
    ///
    /// Failures are never cached. A zero `ttl` is rejected with
    /// [`VidgateError::Configuration`] before anything else happens. When
    /// concurrent callers pass different TTLs, the leader's applies.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if ttl.is_zero() {
            return Err(VidgateError::Configuration(format!(
                "ttl for key {key:?} must be positive"
            )));
        }

        let (rx, is_leader) = {
            let mut inner = self.locked();

            if let Some(entry) = inner.entries.get(key) {
                if Instant::now() < entry.expires_at {
                    metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                    return Ok(entry.value.clone());
                }
                // Lazy expiry: stale entries are removed on first read.
                inner.entries.remove(key);
                metrics::counter!(telemetry::CACHE_EXPIRED_TOTAL).increment(1);
            }
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);

            let (tx, rx) = oneshot::channel();
            match inner.in_flight.get_mut(key) {
                Some(waiters) => {
                    waiters.push(tx);
                    metrics::counter!(telemetry::CACHE_COALESCED_TOTAL).increment(1);
                    trace!(key, waiters = waiters.len(), "joined in-flight fetch");
                    (rx, false)
                }
                None => {
                    inner.in_flight.insert(key.to_string(), vec![tx]);
                    (rx, true)
                }
            }
        };

        if is_leader {
            let cache = self.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                // catch_unwind keeps a panicking fetch from stranding the
                // in-flight record (and with it, every waiter).
                let result = match AssertUnwindSafe(async move { fetch().await })
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(VidgateError::FetchAborted),
                };
                cache.settle(&key, ttl, result);
            });
        }

        // The task always settles its waiters; a closed channel means the
        // runtime tore the task down mid-flight.
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(VidgateError::FetchAborted),
        }
    }

    /// Promote a completed fetch: cache on success, and deliver the
    /// outcome to every waiter. Removing the in-flight record and
    /// inserting the entry happen in one critical section, so no caller
    /// can observe a key that is both cached and in flight.
    fn settle(&self, key: &str, ttl: Duration, result: Result<V>) {
        let waiters = {
            let mut inner = self.locked();
            let waiters = inner.in_flight.remove(key).unwrap_or_default();
            if let Ok(value) = &result {
                Self::insert_locked(&mut inner, self.max_entries, key, value.clone(), ttl);
            }
            waiters
        };
        trace!(key, waiters = waiters.len(), ok = result.is_ok(), "fetch settled");
        for waiter in waiters {
            // A closed receiver is a caller that gave up waiting; the
            // result still went to everyone else.
            let _ = waiter.send(result.clone());
        }
    }

    /// Insert under the capacity bound: when full, evict the entry with
    /// the oldest insertion first (FIFO, not LRU). Replacing an existing
    /// key never evicts.
    fn insert_locked(inner: &mut Inner<V>, max_entries: usize, key: &str, value: V, ttl: Duration) {
        if !inner.entries.contains_key(key) && inner.entries.len() >= max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_seq)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
                debug!(evicted = %oldest, "cache at capacity, evicted oldest entry");
            }
        }
        inner.seq += 1;
        let inserted_seq = inner.seq;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                inserted_seq,
            },
        );
    }

    /// Return the live cached value for `key`, if any, without fetching.
    /// Expired entries are removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.locked();
        let entry = inner.entries.get(key)?;
        if Instant::now() < entry.expires_at {
            return Some(entry.value.clone());
        }
        inner.entries.remove(key);
        metrics::counter!(telemetry::CACHE_EXPIRED_TOTAL).increment(1);
        None
    }

    /// Drop the entry for `key`, if present. Returns whether an entry was
    /// removed. Does not touch an in-flight fetch for the same key.
    pub fn invalidate(&self, key: &str) -> bool {
        self.locked().entries.remove(key).is_some()
    }

    /// Drop every entry. In-flight fetches are unaffected and will still
    /// populate the cache when they land.
    pub fn clear(&self) {
        self.locked().entries.clear();
    }

    /// Number of stored entries, including any that have expired but not
    /// yet been swept or read.
    pub fn len(&self) -> usize {
        self.locked().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry now; returns how many were dropped.
    /// Purely a memory bound — reads already treat expired entries as
    /// absent.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.locked();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| now < entry.expires_at);
        let purged = before - inner.entries.len();
        if purged > 0 {
            metrics::counter!(telemetry::CACHE_EXPIRED_TOTAL).increment(purged as u64);
            trace!(purged, "swept expired entries");
        }
        purged
    }

    /// Spawn the periodic expiry sweep, if the config asked for one.
    ///
    /// Returns the task handle so the owner can abort it on shutdown;
    /// `None` when no sweep interval is configured.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let interval = self.sweep_interval?;
        let cache = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                cache.purge_expired();
            }
        }))
    }
}
