//! Constants for the download module (timeouts, progress, naming).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default timeout for the byte transfer (5 minutes for large media).
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Default timeout for metadata probes and negotiation requests.
pub const PROBE_TIMEOUT_SECS: u64 = 60;

/// Minimum change in percent between two progress events.
pub const PROGRESS_STEP_PERCENT: f64 = 5.0;

/// Extension given to generated placeholder filenames.
pub const PLACEHOLDER_EXTENSION: &str = ".unknown";

/// Suffix of the temporary file a fetch streams into before the final rename.
pub const PARTIAL_SUFFIX: &str = ".part";

/// File extensions (lowercase, without dot) expanded after download.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip"];
