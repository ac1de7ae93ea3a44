//! Filename extraction, sanitization, and placeholder naming for downloads.
//!
//! Names come from Content-Disposition headers, the tail of the source URL, or
//! the hosting service's warning page. Whatever the source, the result is a
//! single path segment with no filesystem-illegal characters.

use std::path::Path;

use uuid::Uuid;

use super::constants::{ARCHIVE_EXTENSIONS, PLACEHOLDER_EXTENSION};

/// Characters rejected by at least one supported filesystem.
const ILLEGAL_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Parses Content-Disposition header to extract filename.
///
/// Handles:
/// - `attachment; filename="example.mp3"`
/// - `attachment; filename=example.mp3`
/// - `attachment; filename*=UTF-8''example.mp3` (RFC 5987)
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + "filename*=".len()..].trim();
        // charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    let pos = header.find("filename=")?;
    let value = header[pos + "filename=".len()..].trim();
    if let Some(stripped) = value.strip_prefix('"') {
        return stripped.find('"').map(|end| stripped[..end].to_string());
    }
    let end = value.find(';').unwrap_or(value.len());
    let filename = value[..end].trim();
    (!filename.is_empty()).then(|| filename.to_string())
}

/// Returns true if `name` can be used as-is for a file directly under the root.
#[must_use]
pub fn is_usable_filename(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name
            .chars()
            .any(|c| ILLEGAL_FILENAME_CHARS.contains(&c) || c.is_control())
}

/// Replaces every filesystem-illegal character with `_`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if ILLEGAL_FILENAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    match sanitized.as_str() {
        "" => "_".to_string(),
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}

/// Generates a unique placeholder filename (`<uuid>.unknown`).
#[must_use]
pub fn placeholder_filename() -> String {
    format!("{}{PLACEHOLDER_EXTENSION}", Uuid::new_v4())
}

/// The text after the last `/` of the URL, query string included.
#[must_use]
pub fn default_filename_from_url(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Picks the filename for a download from the probe result.
///
/// The Content-Disposition name wins over the URL tail. Anything empty or
/// carrying an illegal character is replaced with a placeholder.
#[must_use]
pub fn choose_filename(content_disposition: Option<&str>, url: &str) -> String {
    let candidate = content_disposition
        .and_then(parse_content_disposition)
        .unwrap_or_else(|| default_filename_from_url(url).to_string());

    if is_usable_filename(&candidate) {
        candidate
    } else {
        placeholder_filename()
    }
}

/// Returns true if the file name carries an archive extension that is expanded after download.
#[must_use]
pub fn is_archive(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
