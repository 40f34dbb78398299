// src/watch/path_utils.rs

//! Path helpers for matching watcher events against root-relative globs.

use std::path::Path;

/// Render a relative path with `/` separators.
pub fn to_slash(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// Convert `path` into a string relative to `root`, with forward slashes.
///
/// Falls back to comparing canonicalized paths, since watchers on some
/// platforms report a different absolute prefix for the same directory
/// (macOS `/private/var/...`). Returns `None` when `path` is outside
/// `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slash(rel));
    }

    let root_canon = root.canonicalize().ok()?;
    // Removed files cannot be canonicalized; try their parent instead.
    let path_canon = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => path.parent()?.canonicalize().ok()?.join(path.file_name()?),
    };
    path_canon.strip_prefix(&root_canon).ok().map(to_slash)
}
