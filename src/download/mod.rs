//! Fetching files into the cache root.
//!
//! This module covers everything between a resolved link and bytes on disk:
//! the HTTP client, the path guard, archive expansion, and the batch engine
//! that runs one pipeline task per requested URL.
//!
//! # Features
//!
//! - Streaming downloads into a hidden `.part` file, renamed on completion
//! - File names from Content-Disposition, the URL tail, or a `<uuid>.unknown` placeholder
//! - Every destination (including archive entries) checked against the root
//! - Zip payloads expanded in place and removed
//! - Exactly-once batch completion callback
//!
//! # Example
//!
//! ```no_run
//! use songcache_core::download::HttpClient;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let fetched = client
//!     .fetch_to_file("https://example.com/song.mp3", Path::new("./Boombox Music/song.mp3"), None)
//!     .await?;
//! println!("Downloaded {} bytes", fetched.bytes);
//! # Ok(())
//! # }
//! ```

pub mod archive;
mod client;
pub mod constants;
mod engine;
mod error;
pub mod filename;
pub mod guard;
mod task;

pub use archive::expand_archive;
pub use client::{
    FetchProgress, FetchedFile, HttpClient, ProbeMetadata, ProgressObserver, ProgressThrottle,
    RedirectProbe, SharedProgressObserver,
};
pub use engine::{
    BatchHandle, BatchReport, BatchState, CompletionCallback, DEFAULT_CONCURRENCY,
    DownloaderService, EngineError, PendingGuard,
};
pub use error::{ArchiveError, DownloadError, GuardError};
pub use guard::resolve_within;
pub use task::TaskOutcome;

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
