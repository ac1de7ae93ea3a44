//! Discovery of playable files in the cache directory.
//!
//! Decoding is left to the caller; this module only enumerates what a batch
//! left on disk and tags each file with its audio container.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from scanning the cache directory.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The directory does not exist.
    #[error("track directory {path} does not exist")]
    MissingDirectory {
        /// Scanned directory.
        path: PathBuf,
    },

    /// Listing the directory failed.
    #[error("cannot read track directory {path}: {source}")]
    Read {
        /// Scanned directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Supported audio containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioKind {
    /// `.wav`
    Wav,
    /// `.ogg`
    OggVorbis,
    /// `.mp3`
    Mpeg,
}

impl AudioKind {
    /// Detects the container from the file extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "wav" => Some(Self::Wav),
            "ogg" => Some(Self::OggVorbis),
            "mp3" => Some(Self::Mpeg),
            _ => None,
        }
    }
}

/// One playable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackEntry {
    /// Full path.
    pub path: PathBuf,
    /// File name, used for ordering and display.
    pub name: String,
    /// Audio container.
    pub kind: AudioKind,
}

/// Playable files found in one directory, sorted by name.
#[derive(Debug, Clone, Serialize)]
pub struct TrackLibrary {
    /// Scanned directory.
    pub directory: PathBuf,
    /// Whether the decoder should stream from disk rather than load fully.
    pub stream_from_disk: bool,
    /// Tracks in name order.
    pub tracks: Vec<TrackEntry>,
}

impl TrackLibrary {
    /// Scans the regular files directly inside `directory`.
    ///
    /// Files with unsupported extensions are logged and skipped; subdirectories
    /// are ignored.
    ///
    /// # Errors
    ///
    /// - [`LibraryError::MissingDirectory`] if `directory` does not exist
    /// - [`LibraryError::Read`] if it cannot be listed
    pub async fn scan(directory: &Path, stream_from_disk: bool) -> Result<Self, LibraryError> {
        if !tokio::fs::try_exists(directory).await.unwrap_or(false) {
            return Err(LibraryError::MissingDirectory {
                path: directory.to_path_buf(),
            });
        }

        let read_err = |source: std::io::Error| LibraryError::Read {
            path: directory.to_path_buf(),
            source,
        };

        let mut tracks = Vec::new();
        let mut entries = tokio::fs::read_dir(directory).await.map_err(read_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let file_type = entry.file_type().await.map_err(read_err)?;
            if !file_type.is_file() {
                continue;
            }

            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            match AudioKind::from_path(&path) {
                Some(kind) => {
                    debug!(name = %name, ?kind, "found track");
                    tracks.push(TrackEntry { path, name, kind });
                }
                None => warn!(name = %name, "skipping unsupported file type"),
            }
        }

        tracks.sort_by(|a, b| a.name.cmp(&b.name));
        info!(
            directory = %directory.display(),
            tracks = tracks.len(),
            stream_from_disk,
            "track library scanned"
        );

        Ok(Self {
            directory: directory.to_path_buf(),
            stream_from_disk,
            tracks,
        })
    }

    /// Number of tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True if no playable files were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
