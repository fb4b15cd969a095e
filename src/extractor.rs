//! External extractor invocation.
//!
//! [`ExternalExtractor`] wraps a command-line media extractor (yt-dlp by
//! default) behind a single suspending call: spawn the process with a
//! fully-formed argument list, wait for it under a deadline, and turn its
//! stdout into parsed JSON or a typed error.
//!
//! The component is deliberately thin:
//!
//! - Stateless — safe to share and call concurrently; every call owns its
//!   own process handle.
//! - One process per call, no internal retry. Retry policy belongs to the
//!   consumer (bounded to at most one attempt for timeouts — see
//!   [`VidgateError::is_retryable()`]).
//! - Shape validation of the JSON (single object vs. an `entries` listing)
//!   is the caller's responsibility; the extractor returns the document
//!   as-is.
//!
//! Timeout enforcement rides on `kill_on_drop`: the child's
//! `wait_with_output()` future is raced against `tokio::time::timeout`, and
//! losing the race drops the handle, which kills the process. Nothing
//! outlives its deadline.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::telemetry;
use crate::{Result, VidgateError};

/// Default executable name, resolved via `PATH`.
pub const DEFAULT_PROGRAM: &str = "yt-dlp";

/// Default per-call deadline for the external process.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on the stderr excerpt carried inside
/// [`VidgateError::ProcessFailed`].
pub const DEFAULT_MAX_STDERR_BYTES: usize = 4096;

/// Expected output shape of an extraction, and the flags that go with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
    /// One JSON object describing a single item.
    Single,
    /// A listing under `entries`, resolved without per-entry metadata.
    Search,
    /// A playlist/channel listing under `entries`.
    FlatListing,
}

impl ExtractMode {
    /// Stable lowercase name, used for metric labels and cache key prefixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractMode::Single => "single",
            ExtractMode::Search => "search",
            ExtractMode::FlatListing => "flat_listing",
        }
    }

    /// Whether this mode asks the tool to skip per-entry resolution.
    fn is_flat(&self) -> bool {
        matches!(self, ExtractMode::Search | ExtractMode::FlatListing)
    }
}

/// One extraction to perform. Transient — built per call, never stored.
///
/// `target` is opaque to this crate: a URL, a search expression, a playlist
/// reference — whatever the external tool understands. Constructing targets
/// for a specific platform is the consumer's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Identifier/query/URL handed to the tool verbatim, as the last argument.
    pub target: String,
    /// Expected output shape; selects listing flags.
    pub mode: ExtractMode,
    /// Per-call deadline override. `None` uses the extractor's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl ExtractionRequest {
    /// Request a single item.
    pub fn single(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            mode: ExtractMode::Single,
            timeout: None,
        }
    }

    /// Request a search listing.
    pub fn search(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            mode: ExtractMode::Search,
            timeout: None,
        }
    }

    /// Request a flat playlist/channel listing.
    pub fn flat_listing(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            mode: ExtractMode::FlatListing,
            timeout: None,
        }
    }

    /// Override the per-call deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Configuration for [`ExternalExtractor`].
///
/// ```rust
/// # use vidgate::ExtractorConfig;
/// # use std::time::Duration;
/// let config = ExtractorConfig::new()
///     .program("/usr/local/bin/yt-dlp")
///     .timeout(Duration::from_secs(20));
/// ```
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Path or name of the executable. Default: `yt-dlp`.
    pub program: PathBuf,
    /// Arguments passed on every invocation, before mode flags and the
    /// target. Default: `-J --no-warnings`.
    pub base_args: Vec<String>,
    /// Deadline applied when the request carries no override. Default: 30s.
    pub timeout: Duration,
    /// Cap on the stderr excerpt kept for diagnostics. Default: 4 KiB.
    pub max_stderr_bytes: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            base_args: vec!["-J".into(), "--no-warnings".into()],
            timeout: DEFAULT_TIMEOUT,
            max_stderr_bytes: DEFAULT_MAX_STDERR_BYTES,
        }
    }
}

impl ExtractorConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the environment: `VIDGATE_EXTRACTOR` for the
    /// executable, `VIDGATE_TIMEOUT_SECS` for the default deadline.
    /// Unset or unparseable variables leave the defaults in place.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(program) = std::env::var("VIDGATE_EXTRACTOR")
            && !program.is_empty()
        {
            config.program = PathBuf::from(program);
        }
        if let Ok(secs) = std::env::var("VIDGATE_TIMEOUT_SECS")
            && let Ok(secs) = secs.parse::<u64>()
            && secs > 0
        {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }

    /// Set the executable path or name.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Replace the arguments passed on every invocation.
    pub fn base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default per-call deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the stderr excerpt cap.
    pub fn max_stderr_bytes(mut self, bytes: usize) -> Self {
        self.max_stderr_bytes = bytes;
        self
    }
}

/// Invokes the external extractor executable and parses its JSON output.
///
/// Stateless beyond its configuration; wrap in an `Arc` to share.
#[derive(Debug, Clone)]
pub struct ExternalExtractor {
    config: ExtractorConfig,
}

impl ExternalExtractor {
    /// Create an extractor from the given configuration.
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Build the full argument list for a request: base args, listing flag
    /// when the mode wants one, then the target verbatim.
    fn build_args(&self, request: &ExtractionRequest) -> Vec<String> {
        let mut args = self.config.base_args.clone();
        if request.mode.is_flat() {
            args.push("--flat-playlist".into());
        }
        args.push(request.target.clone());
        args
    }

    /// Run the external tool for `request` and return its parsed output.
    ///
    /// Spawns exactly one OS process. The process is killed if it has not
    /// exited by the deadline ([`VidgateError::Timeout`]); a nonzero exit
    /// becomes [`VidgateError::ProcessFailed`] with a bounded stderr
    /// excerpt; a zero exit with unparseable stdout becomes
    /// [`VidgateError::MalformedOutput`].
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<Value> {
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let args = self.build_args(request);
        let mode = request.mode.as_str();

        debug!(
            program = %self.config.program.display(),
            target = %request.target,
            mode,
            ?timeout,
            "invoking extractor"
        );

        let started = Instant::now();
        let result = self.run(&args, timeout).await;
        let elapsed = started.elapsed();

        metrics::histogram!(telemetry::EXTRACTION_DURATION_SECONDS, "mode" => mode)
            .record(elapsed.as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::EXTRACTIONS_TOTAL, "mode" => mode, "status" => status)
            .increment(1);

        match &result {
            Ok(_) => debug!(target = %request.target, mode, ?elapsed, "extraction complete"),
            // Output-format breakage outranks ordinary process failures:
            // it means the tool changed underneath us, not that one target
            // was bad.
            Err(err @ VidgateError::MalformedOutput(_)) => {
                error!(target = %request.target, mode, %err, "extractor output unparseable")
            }
            Err(err) => warn!(target = %request.target, mode, %err, "extraction failed"),
        }

        result
    }

    async fn run(&self, args: &[String], timeout: Duration) -> Result<Value> {
        let mut command = Command::new(&self.config.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must take the process
            // with it; nothing may keep running past the deadline.
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| VidgateError::Spawn(e.to_string()))?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(VidgateError::Spawn(e.to_string())),
            Err(_) => return Err(VidgateError::Timeout { timeout }),
        };

        if !output.status.success() {
            return Err(VidgateError::ProcessFailed {
                exit_code: output.status.code(),
                stderr: excerpt(&output.stderr, self.config.max_stderr_bytes),
            });
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| VidgateError::MalformedOutput(e.to_string()))
    }
}

impl Default for ExternalExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

/// Lossy-decode at most `max_bytes` of subprocess stderr, trimmed.
fn excerpt(bytes: &[u8], max_bytes: usize) -> String {
    let cut = bytes.len().min(max_bytes);
    String::from_utf8_lossy(&bytes[..cut]).trim().to_string()
}
