//! Extractor trait — the seam between the cache/gateway layers and the
//! external process.
//!
//! [`ExternalExtractor`](crate::ExternalExtractor) is the production
//! implementation. Consumers stub this trait in tests to avoid spawning
//! real processes, and could substitute an HTTP-API-backed resolver without
//! touching the cache layer.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::extractor::{ExternalExtractor, ExtractionRequest};

/// Resolves an [`ExtractionRequest`] into a JSON document.
///
/// Implementations must be safe to call concurrently; each call is
/// independent and owns whatever resources it needs.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resolve one request. Shape validation of the returned document is
    /// the caller's responsibility.
    async fn extract(&self, request: &ExtractionRequest) -> Result<Value>;
}

#[async_trait]
impl Extractor for ExternalExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Value> {
        ExternalExtractor::extract(self, request).await
    }
}
