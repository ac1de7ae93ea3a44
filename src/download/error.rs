//! Error types for the download module.
//!
//! This module defines structured errors for fetch, path validation and
//! archive expansion, each carrying the URL or path it concerns.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the path safety guard.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The candidate path resolves outside the allowed root.
    #[error("path escapes root: '{candidate}' is not inside {root}")]
    EscapesRoot {
        /// Canonical root the candidate was checked against.
        root: PathBuf,
        /// Candidate relative path as supplied by the caller.
        candidate: PathBuf,
    },

    /// The root itself could not be canonicalized (missing, unreadable).
    #[error("cannot resolve root directory {root}: {source}")]
    Root {
        /// The root that failed to resolve.
        root: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl GuardError {
    /// Creates an escape error.
    pub fn escapes_root(root: impl Into<PathBuf>, candidate: impl Into<PathBuf>) -> Self {
        Self::EscapesRoot {
            root: root.into(),
            candidate: candidate.into(),
        }
    }

    /// Creates a root resolution error.
    pub fn root(root: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Root {
            root: root.into(),
            source,
        }
    }
}

/// Errors that can occur during HTTP requests and file fetches.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server answered with success but sent no bytes.
    #[error("empty body downloading {url}")]
    EmptyBody {
        /// The URL that produced an empty body.
        url: String,
    },

    /// File system error while writing the download.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error, promoting reqwest timeouts to [`DownloadError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an empty body error.
    pub fn empty_body(url: impl Into<String>) -> Self {
        Self::EmptyBody { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

/// Errors raised while expanding a fetched archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive file could not be opened.
    #[error("cannot open archive {path}: {source}")]
    Open {
        /// Archive path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The archive is corrupt or an entry could not be read.
    #[error("cannot read archive {path}: {source}")]
    Read {
        /// Archive path.
        path: PathBuf,
        /// The underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// Writing an entry to disk failed.
    #[error("IO error expanding entry to {path}: {source}")]
    Io {
        /// Destination of the entry that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An entry tried to escape the destination root. Aborts the whole expansion.
    #[error("unsafe archive entry '{entry}': {source}")]
    UnsafeEntry {
        /// Entry name as stored in the archive.
        entry: String,
        /// The guard rejection.
        #[source]
        source: GuardError,
    },
}

impl ArchiveError {
    /// Returns true when expansion was aborted by the path safety guard.
    #[must_use]
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::UnsafeEntry {
                source: GuardError::EscapesRoot { .. },
                ..
            }
        )
    }
}
