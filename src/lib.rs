//! Songcache Core Library
//!
//! Fetches a list of remote song files into a local cache directory,
//! negotiating the file-hosting service's redirect and "can't scan this file"
//! interstitial where needed, and records what was fetched so repeat runs
//! skip it.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - HTTP client, path guard, archive expansion, batch engine
//! - [`resolver`] - link classification and indirection negotiation
//! - [`ledger`] - durable record of fetched content identifiers
//! - [`library`] - enumeration of playable files in the cache directory
//! - [`config`] - configuration file loading

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod ledger;
pub mod library;
pub mod resolver;
pub mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{AppConfig, Verbosity, load_config};
pub use download::{
    BatchHandle, BatchReport, CompletionCallback, DEFAULT_CONCURRENCY, DownloadError,
    DownloaderService, EngineError, HttpClient, TaskOutcome,
};
pub use ledger::{DownloadLedger, LedgerEntry, LedgerError, LedgerUpdate};
pub use library::{AudioKind, LibraryError, TrackEntry, TrackLibrary};
pub use resolver::{DriveEndpoints, LinkClass, LinkClassifier};
