//! Zip expansion into the cache root.
//!
//! Every entry destination goes through the path guard before anything is
//! written. One unsafe entry aborts the whole archive.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use zip::ZipArchive;

use super::error::ArchiveError;
use super::guard::resolve_within;

/// Expands the zip at `archive_path` under `destination_root`.
///
/// Directory entries are skipped; existing files are overwritten. All entry
/// names are validated up front, so a rejected archive writes nothing.
/// Returns the number of files written.
///
/// This is blocking; async callers run it on `spawn_blocking`.
///
/// # Errors
///
/// - [`ArchiveError::Open`] / [`ArchiveError::Read`] for unreadable or corrupt archives
/// - [`ArchiveError::UnsafeEntry`] if any entry resolves outside the root
/// - [`ArchiveError::Io`] if an entry cannot be written
pub fn expand_archive(archive_path: &Path, destination_root: &Path) -> Result<usize, ArchiveError> {
    debug!(
        archive = %archive_path.display(),
        root = %destination_root.display(),
        "expanding archive"
    );

    let file = File::open(archive_path).map_err(|source| ArchiveError::Open {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|source| ArchiveError::Read {
        path: archive_path.to_path_buf(),
        source,
    })?;

    let plan = plan_entries(&mut archive, archive_path, destination_root)?;

    for (index, destination) in &plan {
        let mut entry = archive.by_index(*index).map_err(|source| ArchiveError::Read {
            path: archive_path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ArchiveError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut outfile = File::create(destination).map_err(|source| ArchiveError::Io {
            path: destination.clone(),
            source,
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|source| ArchiveError::Io {
            path: destination.clone(),
            source,
        })?;
        debug!(path = %destination.display(), "expanded entry");
    }

    info!(
        archive = %archive_path.display(),
        entries = plan.len(),
        "archive expanded"
    );
    Ok(plan.len())
}

/// Resolves the destination of every file entry, failing on the first unsafe one.
fn plan_entries(
    archive: &mut ZipArchive<File>,
    archive_path: &Path,
    destination_root: &Path,
) -> Result<Vec<(usize, PathBuf)>, ArchiveError> {
    let mut plan = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(|source| ArchiveError::Read {
            path: archive_path.to_path_buf(),
            source,
        })?;
        let name = entry.name().to_string();
        if is_directory_entry(&name) {
            continue;
        }

        match resolve_within(destination_root, Path::new(&name)) {
            Ok(destination) => plan.push((index, destination)),
            Err(source) => {
                error!(
                    archive = %archive_path.display(),
                    entry = %name,
                    "archive entry escapes destination root"
                );
                return Err(ArchiveError::UnsafeEntry {
                    entry: name,
                    source,
                });
            }
        }
    }
    Ok(plan)
}

fn is_directory_entry(name: &str) -> bool {
    name.is_empty() || name.ends_with('/') || name.ends_with('\\')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("music");
        std::fs::create_dir_all(&root).unwrap();
        let archive = root.join("songs.zip");
        (temp_dir, root, archive)
    }

    #[test]
    fn test_expand_writes_all_entries_including_nested() {
        let (_guard, root, archive) = setup();
        write_zip(
            &archive,
            &[
                ("a.mp3", b"aaa"),
                ("b.ogg", b"bbb"),
                ("nested/", b""),
                ("nested/c.wav", b"ccc"),
            ],
        );

        let written = expand_archive(&archive, &root).unwrap();

        assert_eq!(written, 3);
        assert_eq!(std::fs::read(root.join("a.mp3")).unwrap(), b"aaa");
        assert_eq!(std::fs::read(root.join("b.ogg")).unwrap(), b"bbb");
        assert_eq!(std::fs::read(root.join("nested/c.wav")).unwrap(), b"ccc");
    }

    #[test]
    fn test_expand_overwrites_existing_files() {
        let (_guard, root, archive) = setup();
        std::fs::write(root.join("a.mp3"), b"old").unwrap();
        write_zip(&archive, &[("a.mp3", b"new")]);

        expand_archive(&archive, &root).unwrap();

        assert_eq!(std::fs::read(root.join("a.mp3")).unwrap(), b"new");
    }

    #[test]
    fn test_traversal_entry_aborts_before_any_write() {
        let (temp_dir, root, archive) = setup();
        write_zip(&archive, &[("fine.mp3", b"ok"), ("../evil.txt", b"pwned")]);

        let err = expand_archive(&archive, &root).unwrap_err();

        assert!(err.is_security_violation(), "got: {err}");
        assert!(!temp_dir.path().join("evil.txt").exists());
        assert!(!root.join("fine.mp3").exists());
    }

    #[test]
    fn test_corrupt_archive_is_read_error() {
        let (_guard, root, archive) = setup();
        std::fs::write(&archive, b"not a zip at all").unwrap();

        let err = expand_archive(&archive, &root).unwrap_err();
        assert!(matches!(err, ArchiveError::Read { .. }), "got: {err}");
    }

    #[test]
    fn test_missing_archive_is_open_error() {
        let (_guard, root, archive) = setup();
        let err = expand_archive(&archive, &root).unwrap_err();
        assert!(matches!(err, ArchiveError::Open { .. }), "got: {err}");
    }

    #[test]
    fn test_directory_entry_detection() {
        assert!(is_directory_entry("album/"));
        assert!(is_directory_entry("album\\"));
        assert!(is_directory_entry(""));
        assert!(!is_directory_entry("album/a.mp3"));
    }
}
