//! Vidgate error types

use std::time::Duration;

/// Vidgate error types
///
/// All variants are `Clone`: when concurrent callers are coalesced onto a
/// single in-flight fetch, the one settled outcome is delivered verbatim to
/// every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VidgateError {
    // Extraction errors
    /// The external process did not exit before its deadline and was killed.
    #[error("extractor timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The external process exited nonzero (or was killed by a signal, in
    /// which case `exit_code` is `None`). `stderr` is truncated to the
    /// configured excerpt length.
    #[error("extractor exited with {exit_code:?}: {stderr}")]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The external process exited zero but its stdout was not valid JSON.
    /// Indicates a breaking change in the tool's output format.
    #[error("extractor produced unparseable output: {0}")]
    MalformedOutput(String),

    /// The executable could not be launched at all (missing binary,
    /// permission denied).
    #[error("failed to spawn extractor: {0}")]
    Spawn(String),

    // Caller errors
    /// The request was rejected before reaching the cache or the external
    /// tool (e.g. empty target). A caller error, not an extraction failure.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Cache/configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The in-flight fetch task died (panic, runtime shutdown) before
    /// delivering a result. Never cached; the next call for the key retries.
    #[error("in-flight fetch aborted before completing")]
    FetchAborted,
}

impl VidgateError {
    /// Whether the failure is worth a single bounded retry by the caller.
    ///
    /// Only timeouts qualify: the tool was healthy enough to start but slow.
    /// `ProcessFailed` and `MalformedOutput` indicate a persistent fault and
    /// are surfaced as-is. Retry (if any) belongs to the consuming layer —
    /// the cache never retries internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VidgateError::Timeout { .. })
    }
}

/// Result type alias for vidgate operations
pub type Result<T> = std::result::Result<T, VidgateError>;
