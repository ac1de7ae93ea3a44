//! Resolver for the file-hosting service's redirect and interstitial protocol.
//!
//! Negotiation for one link:
//!
//! 1. HEAD the link for a Content-Disposition file name. Failure ends the task.
//! 2. GET it with redirects disabled. 2xx means the link is directly
//!    fetchable; 302/303 yields a candidate URL from `Location`.
//! 3. A candidate on the content host whose URL carries the download marker
//!    is fetched as text. If it is the un-scannable file interstitial, the
//!    hidden form is scraped and the final URL composed from it; otherwise
//!    the candidate itself is fetched.
//! 4. An interstitial that cannot be scraped falls back to one fetch of the
//!    candidate.

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::scrape::{self, DOWNLOAD_MARKER, FORM_FIELDS};
use super::utils::{hosts_match, url_host};
use super::{
    LinkClass, ResolveError, ResolvePath, ResolveRequest, ResolvedDownload, Resolver,
    ResolverPriority,
};
use crate::download::HttpClient;
use crate::download::filename::choose_filename;

/// Content-delivery host serving the interstitial and the final bytes.
pub const DEFAULT_CONTENT_HOST: &str = "drive.usercontent.google.com";

/// Endpoint the scraped form values are submitted to.
pub const DEFAULT_DOWNLOAD_URL: &str = "https://drive.usercontent.google.com/download";

/// Where the service delivers content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveEndpoints {
    /// Host a redirect must point at to be checked for the interstitial.
    pub content_host: String,
    /// Base URL the final link is composed on.
    pub download_url: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            content_host: DEFAULT_CONTENT_HOST.to_string(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
        }
    }
}

impl DriveEndpoints {
    /// Custom endpoints, e.g. a local mock server.
    #[must_use]
    pub fn new(content_host: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            content_host: content_host.into(),
            download_url: download_url.into(),
        }
    }

    /// True if `candidate` is a content-host download URL worth checking for the interstitial.
    #[must_use]
    pub fn is_content_download(&self, candidate: &str) -> bool {
        url_host(candidate).is_some_and(|host| hosts_match(&host, &self.content_host))
            && candidate.contains(DOWNLOAD_MARKER)
    }

    /// Composes the final download URL from the four form values (in [`FORM_FIELDS`] order).
    #[must_use]
    pub fn compose_download_url(&self, values: [&str; 4]) -> String {
        let query = FORM_FIELDS
            .iter()
            .zip(values)
            .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.download_url)
    }
}

/// Resolver for links on the indirection hosts.
#[derive(Debug, Clone)]
pub struct DriveResolver {
    client: HttpClient,
    endpoints: DriveEndpoints,
}

impl DriveResolver {
    /// Creates a resolver using `client` for every request.
    #[must_use]
    pub fn new(client: HttpClient, endpoints: DriveEndpoints) -> Self {
        Self { client, endpoints }
    }

    /// Inspects a content-host candidate and decides the final URL.
    async fn follow_candidate(
        &self,
        request: &ResolveRequest,
        candidate: String,
        file_name: String,
    ) -> ResolvedDownload {
        let identifier = request.class.identifier.clone();

        let page = match self.client.get_text(&candidate).await {
            Ok(page) => page,
            Err(error) => {
                warn!(
                    candidate = %candidate,
                    error = %error,
                    "interstitial check failed; fetching original link"
                );
                return ResolvedDownload {
                    url: request.url.clone(),
                    file_name,
                    identifier,
                    alias: None,
                    via: ResolvePath::Direct,
                };
            }
        };

        if !scrape::is_warning_page(&page) {
            debug!(candidate = %candidate, "no interstitial; fetching redirect target");
            return ResolvedDownload {
                url: candidate,
                file_name,
                identifier,
                alias: None,
                via: ResolvePath::Redirected,
            };
        }

        info!(candidate = %candidate, "virus scan interstitial detected");
        let file_name = scrape::extract_file_name(&page).unwrap_or(file_name);
        let form = scrape::scrape_form(&page);

        let alias = match (&identifier, &form.id) {
            (Some(known), Some(scraped)) if known != scraped => Some(scraped.clone()),
            _ => None,
        };
        let identifier = identifier.or_else(|| form.id.clone());

        match (form.complete(), &identifier) {
            (Some(values), Some(_)) => {
                let url = self.endpoints.compose_download_url(values);
                info!(url = %url, "composed final download URL");
                ResolvedDownload {
                    url,
                    file_name,
                    identifier,
                    alias,
                    via: ResolvePath::WarningPage,
                }
            }
            _ => {
                warn!(
                    candidate = %candidate,
                    missing = ?form.missing_fields(),
                    "required form fields missing; retrying redirect target once"
                );
                ResolvedDownload {
                    url: candidate,
                    file_name,
                    identifier,
                    alias,
                    via: ResolvePath::Fallback,
                }
            }
        }
    }
}

#[async_trait]
impl Resolver for DriveResolver {
    fn name(&self) -> &'static str {
        "drive"
    }

    fn priority(&self) -> ResolverPriority {
        ResolverPriority::Specialized
    }

    fn can_handle(&self, class: &LinkClass) -> bool {
        class.needs_indirection
    }

    #[instrument(skip(self, request), fields(resolver = "drive", url = %request.url))]
    async fn resolve(&self, request: &ResolveRequest) -> Result<ResolvedDownload, ResolveError> {
        let url = request.url.as_str();

        let metadata = self
            .client
            .probe_metadata(url)
            .await
            .map_err(|e| ResolveError::metadata(url, e))?;
        let file_name = choose_filename(metadata.content_disposition.as_deref(), url);
        info!(
            file_name = %file_name,
            id = request.class.identifier.as_deref().unwrap_or("-"),
            "remote file metadata"
        );

        let probe = self
            .client
            .get_without_redirect(url)
            .await
            .map_err(|e| ResolveError::request(url, e))?;

        if probe.is_success() {
            debug!("no redirect; fetching link directly");
            return Ok(ResolvedDownload {
                url: url.to_string(),
                file_name,
                identifier: request.class.identifier.clone(),
                alias: None,
                via: ResolvePath::Direct,
            });
        }
        if !probe.is_redirect() {
            return Err(ResolveError::unexpected_status(url, probe.status));
        }

        let candidate = probe
            .location
            .ok_or_else(|| ResolveError::missing_location(url))?;
        info!(candidate = %candidate, "redirect detected");

        if !self.endpoints.is_content_download(&candidate) {
            return Ok(ResolvedDownload {
                url: candidate,
                file_name,
                identifier: request.class.identifier.clone(),
                alias: None,
                via: ResolvePath::Redirected,
            });
        }

        Ok(self.follow_candidate(request, candidate, file_name).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let endpoints = DriveEndpoints::default();
        assert!(endpoints.is_content_download(
            "https://drive.usercontent.google.com/download?id=XYZ&export=download"
        ));
        assert!(!endpoints.is_content_download("https://drive.usercontent.google.com/open?id=XYZ"));
        assert!(!endpoints.is_content_download("https://cdn.example.com/download/xyz"));
        assert!(!endpoints.is_content_download("not a url download"));
    }

    #[test]
    fn test_compose_download_url_encodes_values() {
        let url =
            DriveEndpoints::default().compose_download_url(["XYZ", "download", "t", "a b&c"]);
        assert_eq!(
            url,
            concat!(
                "https://drive.usercontent.google.com/download",
                "?id=XYZ&export=download&confirm=t&uuid=a%20b%26c"
            )
        );
    }

    #[test]
    fn test_can_handle_only_indirection_links() {
        let resolver = DriveResolver::new(HttpClient::new(), DriveEndpoints::default());
        assert!(resolver.can_handle(&LinkClass {
            identifier: None,
            needs_indirection: true,
        }));
        assert!(!resolver.can_handle(&LinkClass::unresolvable()));
    }
}
