//! Link classification: which URLs need the hosting-service indirection
//! protocol, and what content identifier they carry.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::utils::{compile_static_regex, hosts_match};

/// Hosts whose links go through the redirect / warning-page negotiation.
pub const DEFAULT_INDIRECTION_HOSTS: &[&str] = &["drive.google.com", "docs.google.com"];

/// `id=<token>` query parameter carrying the service's file id.
static FILE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"[?&]id=([a-zA-Z0-9_-]+)"));

/// Result of classifying one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkClass {
    /// Content identifier extracted from the query string, if any.
    pub identifier: Option<String>,
    /// True if the URL's host is one of the indirection hosts.
    pub needs_indirection: bool,
}

impl LinkClass {
    /// Classification of a malformed or host-less URL.
    #[must_use]
    pub fn unresolvable() -> Self {
        Self {
            identifier: None,
            needs_indirection: false,
        }
    }
}

/// Classifies URLs against a host allow-list.
#[derive(Debug, Clone)]
pub struct LinkClassifier {
    indirection_hosts: Vec<String>,
}

impl Default for LinkClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkClassifier {
    /// Classifier for the hosting service's public domains.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hosts(DEFAULT_INDIRECTION_HOSTS.iter().copied())
    }

    /// Classifier with a custom allow-list (mirrors and test servers).
    #[must_use]
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            indirection_hosts: hosts.into_iter().map(Into::into).collect(),
        }
    }

    /// Classifies `url`.
    ///
    /// Malformed URLs and URLs without a host classify as
    /// [`LinkClass::unresolvable`].
    #[must_use]
    pub fn classify(&self, url: &str) -> LinkClass {
        let Ok(parsed) = Url::parse(url) else {
            return LinkClass::unresolvable();
        };
        let Some(host) = parsed.host_str() else {
            return LinkClass::unresolvable();
        };

        let needs_indirection = self
            .indirection_hosts
            .iter()
            .any(|known| hosts_match(host, known));

        LinkClass {
            identifier: extract_file_id(url),
            needs_indirection,
        }
    }
}

/// Extracts the `id=` query token from `url`.
#[must_use]
pub fn extract_file_id(url: &str) -> Option<String> {
    FILE_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Derives a ledger identifier for a generic link from its normalized URL.
///
/// The identifier is `host[:port]/path[?query]` with the scheme and fragment
/// dropped. Commas are percent-encoded so the result fits in one ledger field.
/// Returns `None` for malformed or host-less URLs, and for bare host roots.
#[must_use]
pub fn identifier_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let has_segment = parsed
        .path_segments()
        .is_some_and(|mut segments| segments.any(|segment| !segment.is_empty()));
    if !has_segment && parsed.query().is_none() {
        return None;
    }

    let mut identifier = host.to_ascii_lowercase();
    if let Some(port) = parsed.port() {
        identifier.push_str(&format!(":{port}"));
    }
    identifier.push_str(parsed.path());
    if let Some(query) = parsed.query() {
        identifier.push('?');
        identifier.push_str(query);
    }
    Some(identifier.replace(',', "%2C"))
}
