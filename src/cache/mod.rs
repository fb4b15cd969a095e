//! Caching subsystem.
//!
//! One cache, one job: [`CoalescingCache`] wraps a slow, fallible fetch
//! (in practice, an [`ExternalExtractor`](crate::ExternalExtractor) call)
//! with get-or-compute semantics.
//!
//! # Per-key state machine
//!
//! ```text
//! Absent ──(miss, fetch starts)──> InFlight ──(success)──> Cached
//!                                     │
//!                                     └──(failure)──> Absent
//! Cached ──(TTL elapsed, next read)──> Absent
//! Cached ──(invalidate)──> Absent
//! ```
//!
//! At most one entry and at most one in-flight fetch exist per key; callers
//! that arrive during a fetch attach to it as waiters and all receive the
//! identical outcome. This is what keeps N concurrent requests for the same
//! resource from spawning N subprocesses.
//!
//! # Policies
//!
//! - **TTL** is per call, applied by the fetch leader; expiry is lazy on
//!   read, with an optional proactive sweep to bound memory.
//! - **Eviction** is FIFO by insertion order. The cache is a short-lived
//!   freshness bound, not a working-set cache, so access recency is
//!   deliberately not tracked.
//! - **Failures are never cached.** A failed fetch rejects its waiters and
//!   leaves the key absent, so the next request retries.

mod coalescing;

pub use coalescing::{CacheConfig, CoalescingCache, DEFAULT_MAX_ENTRIES};
