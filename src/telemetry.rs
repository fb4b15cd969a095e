//! Telemetry metric name constants.
//!
//! Centralised metric names for vidgate operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `vidgate_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `mode` — extraction mode ("single" | "search" | "flat_listing")
//! - `status` — outcome: "ok" or "error"

/// Total cache reads answered from a live entry.
pub const CACHE_HITS_TOTAL: &str = "vidgate_cache_hits_total";

/// Total cache reads that missed (expired or absent).
pub const CACHE_MISSES_TOTAL: &str = "vidgate_cache_misses_total";

/// Total callers that attached to another caller's in-flight fetch
/// instead of starting their own.
pub const CACHE_COALESCED_TOTAL: &str = "vidgate_cache_coalesced_total";

/// Total entries evicted to honour the capacity bound.
pub const CACHE_EVICTIONS_TOTAL: &str = "vidgate_cache_evictions_total";

/// Total expired entries removed (lazily on read or by the sweeper).
pub const CACHE_EXPIRED_TOTAL: &str = "vidgate_cache_expired_total";

/// Total external extractor invocations.
///
/// Labels: `mode`, `status` ("ok" | "error").
pub const EXTRACTIONS_TOTAL: &str = "vidgate_extractions_total";

/// External extractor wall-clock duration in seconds.
///
/// Labels: `mode`.
pub const EXTRACTION_DURATION_SECONDS: &str = "vidgate_extraction_duration_seconds";
