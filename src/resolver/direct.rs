//! Direct URL resolver - passthrough for plain links.
//!
//! The [`DirectResolver`] fetches the requested URL unchanged. It only probes
//! the link with HEAD to pick a file name; servers that reject HEAD still get
//! fetched under the name derived from the URL.

use async_trait::async_trait;
use tracing::{instrument, warn};

use super::{
    LinkClass, ResolveError, ResolvePath, ResolveRequest, ResolvedDownload, Resolver,
    ResolverPriority,
};
use crate::download::HttpClient;
use crate::download::filename::choose_filename;

/// A resolver that passes URLs through unchanged.
#[derive(Debug, Clone)]
pub struct DirectResolver {
    client: HttpClient,
}

impl DirectResolver {
    /// Creates a new `DirectResolver`.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resolver for DirectResolver {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn priority(&self) -> ResolverPriority {
        ResolverPriority::Fallback
    }

    fn can_handle(&self, _class: &LinkClass) -> bool {
        true
    }

    #[instrument(skip(self, request), fields(resolver = "direct", url = %request.url))]
    async fn resolve(&self, request: &ResolveRequest) -> Result<ResolvedDownload, ResolveError> {
        let content_disposition = match self.client.probe_metadata(&request.url).await {
            Ok(metadata) => metadata.content_disposition,
            Err(error) => {
                warn!(error = %error, "metadata probe failed; naming file from URL");
                None
            }
        };

        Ok(ResolvedDownload {
            url: request.url.clone(),
            file_name: choose_filename(content_disposition.as_deref(), &request.url),
            identifier: request.class.identifier.clone(),
            alias: None,
            via: ResolvePath::Direct,
        })
    }
}
