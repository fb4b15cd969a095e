//! Vidgate - Coalescing TTL cache over an external media extractor
//!
//! This crate provides the caching core of a media metadata backend: a
//! [`CoalescingCache`] that de-duplicates concurrent identical requests
//! (single-flight), bounds entry count with FIFO eviction, and expires
//! entries per-TTL; and an [`ExternalExtractor`] that wraps a slow,
//! fallible command-line tool (yt-dlp by default) with timeout enforcement
//! and typed error translation. [`MediaGateway`] wires the two together
//! behind the one call an HTTP layer needs.
//!
//! # Gateway Example
//!
//! ```rust,no_run
//! use vidgate::{ExtractionRequest, MediaGateway, TtlPolicy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> vidgate::Result<()> {
//!     let gateway = MediaGateway::builder()
//!         .ttl_policy(TtlPolicy::new().search(Duration::from_secs(600)))
//!         .build()?;
//!
//!     // Five concurrent callers for the same target share one subprocess.
//!     let results = gateway
//!         .lookup(ExtractionRequest::search("ytsearch20:rust async"))
//!         .await?;
//!
//!     println!("{results}");
//!     Ok(())
//! }
//! ```
//!
//! # Cache Example
//!
//! The cache is generic and usable without the extractor:
//!
//! ```rust
//! use vidgate::{CacheConfig, CoalescingCache};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> vidgate::Result<()> {
//!     let cache = CoalescingCache::new(CacheConfig::new().max_entries(50))?;
//!
//!     let value = cache
//!         .get_or_compute("greeting", Duration::from_secs(60), || async {
//!             Ok("hello".to_string())
//!         })
//!         .await?;
//!
//!     assert_eq!(value, "hello");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod telemetry;
pub mod traits;

// Re-export main types at crate root
pub use cache::{CacheConfig, CoalescingCache, DEFAULT_MAX_ENTRIES};
pub use error::{Result, VidgateError};
pub use extractor::{
    DEFAULT_MAX_STDERR_BYTES, DEFAULT_PROGRAM, DEFAULT_TIMEOUT, ExtractMode, ExtractionRequest,
    ExternalExtractor, ExtractorConfig,
};
pub use gateway::{MediaGateway, MediaGatewayBuilder, TtlPolicy};
pub use traits::Extractor;
