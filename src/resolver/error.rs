//! Error types for resolver operations.

use thiserror::Error;

use crate::download::DownloadError;

/// Errors that end the indirection negotiation for one link.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The metadata (HEAD) request failed or returned a non-success status.
    #[error("metadata request failed for '{url}': {source}")]
    Metadata {
        /// The link being resolved.
        url: String,
        /// What went wrong.
        #[source]
        source: DownloadError,
    },

    /// The no-redirect GET could not be sent.
    #[error("request failed for '{url}': {source}")]
    Request {
        /// The link being resolved.
        url: String,
        /// What went wrong.
        #[source]
        source: DownloadError,
    },

    /// The no-redirect GET returned neither success nor a followable redirect.
    #[error("unexpected HTTP {status} resolving '{url}'")]
    UnexpectedStatus {
        /// The link being resolved.
        url: String,
        /// The status received.
        status: u16,
    },

    /// A redirect arrived without a usable `Location` header.
    #[error("redirect without Location header resolving '{url}'")]
    MissingLocation {
        /// The link being resolved.
        url: String,
    },

    /// No registered resolver accepts this link.
    #[error("no resolver found for '{url}'")]
    NoResolver {
        /// The link nobody could handle.
        url: String,
    },
}

impl ResolveError {
    /// Creates a `Metadata` error.
    #[must_use]
    pub fn metadata(url: &str, source: DownloadError) -> Self {
        Self::Metadata {
            url: url.to_string(),
            source,
        }
    }

    /// Creates a `Request` error.
    #[must_use]
    pub fn request(url: &str, source: DownloadError) -> Self {
        Self::Request {
            url: url.to_string(),
            source,
        }
    }

    /// Creates an `UnexpectedStatus` error.
    #[must_use]
    pub fn unexpected_status(url: &str, status: u16) -> Self {
        Self::UnexpectedStatus {
            url: url.to_string(),
            status,
        }
    }

    /// Creates a `MissingLocation` error.
    #[must_use]
    pub fn missing_location(url: &str) -> Self {
        Self::MissingLocation {
            url: url.to_string(),
        }
    }

    /// Creates a `NoResolver` error.
    #[must_use]
    pub fn no_resolver(url: &str) -> Self {
        Self::NoResolver {
            url: url.to_string(),
        }
    }
}
