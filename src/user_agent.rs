//! Shared User-Agent strings for probe and fetch HTTP clients.
//!
//! Probes (HEAD, no-redirect GET, warning-page fetch) identify the tool. The
//! byte transfer itself goes out with a browser User-Agent because the hosting
//! service rejects non-browser clients for large files.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/songcache";

/// Browser User-Agent sent with every file fetch.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default User-Agent for metadata and negotiation requests.
#[must_use]
pub(crate) fn default_probe_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("songcache/{version} (+{PROJECT_UA_URL})")
}
