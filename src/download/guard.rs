//! Path safety guard for every write under the cache root.
//!
//! Destination paths come from untrusted sources (Content-Disposition headers,
//! scraped HTML, archive entry names). Each one is joined onto the canonical
//! root, normalized without touching the filesystem, re-anchored on the
//! deepest ancestor that exists (so symlinks are followed), and must then be a
//! strict descendant of the root.

use std::path::{Component, Path, PathBuf};

use tracing::error;

use super::error::GuardError;

/// Resolves `candidate` under `root`, rejecting anything outside it.
///
/// Returns the absolute destination path on success. The root must exist.
///
/// # Errors
///
/// - [`GuardError::Root`] if the root cannot be canonicalized
/// - [`GuardError::EscapesRoot`] if the resolved path is not a strict
///   descendant of the root
pub fn resolve_within(root: &Path, candidate: &Path) -> Result<PathBuf, GuardError> {
    let canonical_root =
        std::fs::canonicalize(root).map_err(|source| GuardError::root(root, source))?;

    let normalized = normalize_lexically(&canonical_root.join(candidate));
    let resolved = anchor_on_existing_ancestor(&normalized);

    if is_strict_descendant(&resolved, &canonical_root) {
        Ok(resolved)
    } else {
        error!(
            root = %canonical_root.display(),
            candidate = %candidate.display(),
            "path escapes root"
        );
        Err(GuardError::escapes_root(canonical_root, candidate))
    }
}

/// Collapses `.` and `..` components without consulting the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalizes the longest existing prefix of `path` and re-appends the rest.
fn anchor_on_existing_ancestor(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        let Ok(canonical) = std::fs::canonicalize(ancestor) else {
            continue;
        };
        return match path.strip_prefix(ancestor) {
            Ok(rest) if rest.as_os_str().is_empty() => canonical,
            Ok(rest) => canonical.join(rest),
            Err(_) => path.to_path_buf(),
        };
    }
    path.to_path_buf()
}

#[cfg(any(windows, target_os = "macos"))]
fn is_strict_descendant(path: &Path, root: &Path) -> bool {
    let path = PathBuf::from(path.to_string_lossy().to_lowercase());
    let root = PathBuf::from(root.to_string_lossy().to_lowercase());
    path != root && path.starts_with(&root)
}

#[cfg(not(any(windows, target_os = "macos")))]
fn is_strict_descendant(path: &Path, root: &Path) -> bool {
    path != root && path.starts_with(root)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn root() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("cache");
        std::fs::create_dir_all(&root).unwrap();
        (temp_dir, root)
    }

    #[test]
    fn test_plain_filename_is_accepted() {
        let (_guard, root) = root();
        let resolved = resolve_within(&root, Path::new("song.mp3")).unwrap();
        assert_eq!(
            resolved,
            std::fs::canonicalize(&root).unwrap().join("song.mp3")
        );
    }

    #[test]
    fn test_nested_relative_path_is_accepted() {
        let (_guard, root) = root();
        let resolved = resolve_within(&root, Path::new("album/disc1/track.ogg")).unwrap();
        assert!(resolved.ends_with("album/disc1/track.ogg"));
    }

    #[test]
    fn test_dot_segments_that_stay_inside_are_accepted() {
        let (_guard, root) = root();
        let resolved = resolve_within(&root, Path::new("a/./b/../song.wav")).unwrap();
        assert!(resolved.ends_with("a/song.wav"));
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let (_guard, root) = root();
        let result = resolve_within(&root, Path::new("../../etc/passwd"));
        assert!(matches!(result, Err(GuardError::EscapesRoot { .. })));
    }

    #[test]
    fn test_traversal_into_sibling_with_shared_prefix_is_rejected() {
        let (temp_dir, root) = root();
        std::fs::create_dir_all(temp_dir.path().join("cache2")).unwrap();
        let result = resolve_within(&root, Path::new("../cache2/song.mp3"));
        assert!(matches!(result, Err(GuardError::EscapesRoot { .. })));
    }

    #[test]
    fn test_absolute_candidate_is_rejected() {
        let (_guard, root) = root();
        let result = resolve_within(&root, Path::new("/etc/passwd"));
        assert!(matches!(result, Err(GuardError::EscapesRoot { .. })));
    }

    #[test]
    fn test_root_itself_is_rejected() {
        let (_guard, root) = root();
        assert!(resolve_within(&root, Path::new("")).is_err());
        assert!(resolve_within(&root, Path::new(".")).is_err());
        assert!(resolve_within(&root, Path::new("sub/..")).is_err());
    }

    #[test]
    fn test_missing_root_reports_root_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = resolve_within(&temp_dir.path().join("absent"), Path::new("a.mp3"));
        assert!(matches!(result, Err(GuardError::Root { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_pointing_outside_root_is_rejected() {
        let (temp_dir, root) = root();
        let outside = temp_dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let result = resolve_within(&root, Path::new("link/song.mp3"));
        assert!(matches!(result, Err(GuardError::EscapesRoot { .. })));
    }

    #[test]
    fn test_normalize_lexically_never_climbs_above_root_component() {
        assert_eq!(
            normalize_lexically(Path::new("/cache/../../etc")),
            PathBuf::from("/etc")
        );
    }
}
