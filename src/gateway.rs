//! MediaGateway — the cache and the extractor wired together.
//!
//! The gateway is what a route handler holds: one
//! [`CoalescingCache`] instance above one [`Extractor`], constructed once
//! at process start and shared by reference. It derives a cache key from
//! each request (`"<mode>:<target>"`), picks the TTL for the request's
//! category, and funnels the call through
//! [`CoalescingCache::get_or_compute()`].
//!
//! ```rust,no_run
//! use vidgate::{ExtractionRequest, MediaGateway};
//!
//! #[tokio::main]
//! async fn main() -> vidgate::Result<()> {
//!     let gateway = MediaGateway::builder().build()?;
//!
//!     let video = gateway
//!         .lookup(ExtractionRequest::single("https://example.com/watch?v=abc"))
//!         .await?;
//!
//!     println!("{video}");
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheConfig, CoalescingCache};
use crate::extractor::{ExtractMode, ExternalExtractor, ExtractionRequest, ExtractorConfig};
use crate::traits::Extractor;
use crate::{Result, VidgateError};

/// Per-category cache TTLs.
///
/// Single-item metadata changes rarely and search results churn quickly,
/// so they get different freshness bounds. Defaults: 1 hour for single
/// items, 10 minutes for searches, 1 hour for flat listings.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    /// TTL for [`ExtractMode::Single`] lookups.
    pub single: Duration,
    /// TTL for [`ExtractMode::Search`] lookups.
    pub search: Duration,
    /// TTL for [`ExtractMode::FlatListing`] lookups.
    pub listing: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            single: Duration::from_secs(3600),
            search: Duration::from_secs(600),
            listing: Duration::from_secs(3600),
        }
    }
}

impl TtlPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the single-item TTL.
    pub fn single(mut self, ttl: Duration) -> Self {
        self.single = ttl;
        self
    }

    /// Set the search TTL.
    pub fn search(mut self, ttl: Duration) -> Self {
        self.search = ttl;
        self
    }

    /// Set the flat-listing TTL.
    pub fn listing(mut self, ttl: Duration) -> Self {
        self.listing = ttl;
        self
    }

    /// TTL for a request's mode.
    pub fn for_mode(&self, mode: ExtractMode) -> Duration {
        match mode {
            ExtractMode::Single => self.single,
            ExtractMode::Search => self.search,
            ExtractMode::FlatListing => self.listing,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, ttl) in [
            ("single", self.single),
            ("search", self.search),
            ("listing", self.listing),
        ] {
            if ttl.is_zero() {
                return Err(VidgateError::Configuration(format!(
                    "{name} ttl must be positive"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`MediaGateway`].
#[derive(Default)]
pub struct MediaGatewayBuilder {
    extractor_config: Option<ExtractorConfig>,
    cache_config: Option<CacheConfig>,
    ttl_policy: Option<TtlPolicy>,
    extractor: Option<Arc<dyn Extractor>>,
}

impl MediaGatewayBuilder {
    /// Configure the external extractor (ignored when a custom
    /// [`extractor()`](Self::extractor) is supplied).
    pub fn extractor_config(mut self, config: ExtractorConfig) -> Self {
        self.extractor_config = Some(config);
        self
    }

    /// Configure the cache.
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = Some(config);
        self
    }

    /// Configure per-category TTLs.
    pub fn ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = Some(policy);
        self
    }

    /// Substitute a custom extractor implementation (tests, alternative
    /// resolvers).
    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Build the gateway. All configuration is validated here —
    /// construction is the only place a [`VidgateError::Configuration`]
    /// for capacity or TTL policy can surface.
    pub fn build(self) -> Result<MediaGateway> {
        let ttl = self.ttl_policy.unwrap_or_default();
        ttl.validate()?;

        let cache = CoalescingCache::new(self.cache_config.unwrap_or_default())?;
        let extractor = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(ExternalExtractor::new(
                self.extractor_config.unwrap_or_default(),
            )),
        };

        Ok(MediaGateway {
            cache,
            extractor,
            ttl,
        })
    }
}

/// Facade owning one [`CoalescingCache`] and one [`Extractor`].
pub struct MediaGateway {
    cache: CoalescingCache<Value>,
    extractor: Arc<dyn Extractor>,
    ttl: TtlPolicy,
}

impl std::fmt::Debug for MediaGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaGateway")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl MediaGateway {
    /// Start building a gateway.
    pub fn builder() -> MediaGatewayBuilder {
        MediaGatewayBuilder::default()
    }

    /// Resolve a request through the cache.
    ///
    /// Returns the cached document when fresh; otherwise performs (or
    /// attaches to) the single in-flight extraction for this request's
    /// cache key. An empty target is rejected up front with
    /// [`VidgateError::InvalidInput`] — it never reaches the cache or the
    /// external tool.
    pub async fn lookup(&self, request: ExtractionRequest) -> Result<Value> {
        if request.target.trim().is_empty() {
            return Err(VidgateError::InvalidInput(
                "extraction target must not be empty".into(),
            ));
        }

        let key = cache_key(&request);
        let ttl = self.ttl.for_mode(request.mode);
        debug!(%key, ?ttl, "gateway lookup");

        let extractor = Arc::clone(&self.extractor);
        self.cache
            .get_or_compute(&key, ttl, move || async move {
                extractor.extract(&request).await
            })
            .await
    }

    /// Drop the cached document for a request, forcing the next lookup to
    /// re-extract. Returns whether anything was cached.
    pub fn invalidate(&self, request: &ExtractionRequest) -> bool {
        self.cache.invalidate(&cache_key(request))
    }

    /// The underlying cache, e.g. to start its sweeper or inspect size.
    pub fn cache(&self) -> &CoalescingCache<Value> {
        &self.cache
    }
}

/// `"<mode>:<target>"` — one resource, one key, across every route that
/// resolves it.
fn cache_key(request: &ExtractionRequest) -> String {
    format!("{}:{}", request.mode.as_str(), request.target)
}
