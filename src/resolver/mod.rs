//! Link resolution: turning a requested URL into a fetchable URL and file name.
//!
//! # Architecture
//!
//! - [`LinkClassifier`] - decides whether a link needs the indirection protocol
//! - [`Resolver`] - async trait that individual resolvers implement
//! - [`ResolverRegistry`] - priority-ordered collection of resolvers
//! - [`DriveResolver`] - redirect / interstitial negotiation for the file-hosting service
//! - [`DirectResolver`] - passthrough for plain links
//! - [`scrape`] - pure parsing of the interstitial page

mod classify;
mod direct;
mod drive;
mod error;
mod registry;
pub mod scrape;
mod utils;

pub use classify::{
    DEFAULT_INDIRECTION_HOSTS, LinkClass, LinkClassifier, extract_file_id, identifier_from_url,
};
pub use direct::DirectResolver;
pub use drive::{DriveEndpoints, DriveResolver};
pub use error::ResolveError;
pub use registry::ResolverRegistry;
pub use utils::hosts_match;

use async_trait::async_trait;

use crate::download::HttpClient;

/// Builds the default registry: the indirection resolver first, then passthrough.
#[must_use]
pub fn build_default_resolver_registry(
    client: HttpClient,
    endpoints: DriveEndpoints,
) -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();
    registry.register(Box::new(DriveResolver::new(client.clone(), endpoints)));
    registry.register(Box::new(DirectResolver::new(client)));
    registry
}

/// Priority level for resolver ordering.
///
/// Derives `Ord` so that `Specialized < Fallback` for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolverPriority {
    /// Host-specific negotiation.
    Specialized = 0,
    /// Direct URL passthrough.
    Fallback = 1,
}

/// How a link reached its final URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePath {
    /// The original URL is fetched as-is.
    Direct,
    /// A non-interstitial redirect target is fetched.
    Redirected,
    /// A URL composed from the interstitial form is fetched.
    WarningPage,
    /// The interstitial could not be scraped; the redirect target is tried once.
    Fallback,
}

/// Input to one resolution.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// The link as requested.
    pub url: String,
    /// Its classification.
    pub class: LinkClass,
}

impl ResolveRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(url: impl Into<String>, class: LinkClass) -> Self {
        Self {
            url: url.into(),
            class,
        }
    }
}

/// A link resolved to something the fetcher can download.
#[derive(Debug, Clone)]
pub struct ResolvedDownload {
    /// URL to fetch.
    pub url: String,
    /// Usable file name (single path segment, no illegal characters).
    pub file_name: String,
    /// Content identifier, if known after resolution.
    pub identifier: Option<String>,
    /// A second identifier discovered during resolution, recorded as a ledger alias.
    pub alias: Option<String>,
    /// How the final URL was reached.
    pub via: ResolvePath,
}

/// Trait that all resolvers implement.
///
/// Uses `async_trait` so resolvers can live in the registry as `Box<dyn Resolver>`.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns the resolver's name (e.g., "drive", "direct").
    fn name(&self) -> &str;

    /// Returns the resolver's priority level.
    fn priority(&self) -> ResolverPriority;

    /// Returns true if this resolver can handle the classified link.
    fn can_handle(&self, class: &LinkClass) -> bool;

    /// Resolves the link to a fetchable URL and file name.
    async fn resolve(&self, request: &ResolveRequest) -> Result<ResolvedDownload, ResolveError>;
}
