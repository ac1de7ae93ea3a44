//! Payload builders: zip archives and interstitial pages.

use std::io::{Cursor, Write};

use songcache_core::resolver::scrape::WARNING_PHRASE;
use zip::write::FileOptions;

/// Builds an uncompressed zip in memory. Names ending in `/` become directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("add directory");
        } else {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(data).expect("write entry");
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

/// An un-scannable file interstitial carrying the given hidden form fields.
pub fn warning_page(file_name: &str, fields: &[(&str, &str)]) -> String {
    let inputs: String = fields
        .iter()
        .map(|(name, value)| format!(r#"<input type="hidden" name="{name}" value="{value}">"#))
        .collect();
    format!(
        concat!(
            "<!DOCTYPE html><html><body>{}",
            r#"<span class="uc-name-size"><a href="/open?id=XYZ">{}</a> (512M)</span>"#,
            r#"<form id="download-form" action="/download" method="get">{}</form>"#,
            "</body></html>"
        ),
        WARNING_PHRASE, file_name, inputs
    )
}
