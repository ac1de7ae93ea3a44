//! Pure scraping of the hosting service's "can't scan this file" interstitial.
//!
//! The page carries a hidden form whose `id`, `export`, `confirm` and `uuid`
//! values make up the real download link. All marker strings live here so a
//! site layout change touches one file.

use std::sync::LazyLock;

use regex::Regex;

use super::utils::compile_static_regex;
use crate::download::filename::sanitize_filename;

/// Exact caption shown on the un-scannable file interstitial.
pub const WARNING_PHRASE: &str =
    r#"<p class="uc-warning-caption">Google Drive can't scan this file for viruses.</p>"#;

/// Path marker a content-host redirect must contain to be checked for the interstitial.
pub const DOWNLOAD_MARKER: &str = "download";

/// Hidden form fields, in the order they are composed into the final URL.
pub const FORM_FIELDS: [&str; 4] = ["id", "export", "confirm", "uuid"];

/// Anchor showing the human-readable file name next to its size.
static FILE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"<span class="uc-name-size"><a href="/open\?id=[^"]+">([^<]+)</a>"#)
});

/// Hidden form values scraped from the interstitial.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarningForm {
    /// Service file id.
    pub id: Option<String>,
    /// Export mode (usually `download`).
    pub export: Option<String>,
    /// Confirmation token.
    pub confirm: Option<String>,
    /// Per-request uuid.
    pub uuid: Option<String>,
}

impl WarningForm {
    /// Names of the fields that were not found.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        FORM_FIELDS
            .into_iter()
            .zip([&self.id, &self.export, &self.confirm, &self.uuid])
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect()
    }

    /// Field values in [`FORM_FIELDS`] order, if all four are present.
    #[must_use]
    pub fn complete(&self) -> Option<[&str; 4]> {
        Some([
            self.id.as_deref()?,
            self.export.as_deref()?,
            self.confirm.as_deref()?,
            self.uuid.as_deref()?,
        ])
    }
}

/// True if `html` is the un-scannable file interstitial.
#[must_use]
pub fn is_warning_page(html: &str) -> bool {
    html.contains(WARNING_PHRASE)
}

/// Reads the quoted value following `name="<field>" value="`.
///
/// Returns `None` if the marker is absent, the value is unterminated, or empty.
#[must_use]
pub fn extract_form_field(html: &str, field: &str) -> Option<String> {
    let marker = format!(r#"name="{field}" value=""#);
    let start = html.find(&marker)? + marker.len();
    let len = html[start..].find('"')?;
    let value = &html[start..start + len];
    (!value.is_empty()).then(|| value.to_string())
}

/// Scrapes all four hidden form fields.
#[must_use]
pub fn scrape_form(html: &str) -> WarningForm {
    WarningForm {
        id: extract_form_field(html, "id"),
        export: extract_form_field(html, "export"),
        confirm: extract_form_field(html, "confirm"),
        uuid: extract_form_field(html, "uuid"),
    }
}

/// Scrapes the displayed file name, decoded and sanitized for use on disk.
#[must_use]
pub fn extract_file_name(html: &str) -> Option<String> {
    let raw = FILE_NAME_RE.captures(html)?.get(1)?.as_str().trim();
    if raw.is_empty() {
        return None;
    }
    Some(sanitize_filename(&decode_entities(raw)))
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
