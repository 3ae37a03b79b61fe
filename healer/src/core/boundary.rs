//! Lexical repository-boundary check for untrusted relative paths.

use std::path::{Component, Path, PathBuf};

/// Resolve `candidate` against a repository root without touching the filesystem.
///
/// Returns the normalized relative path if it names a strict descendant of the
/// root. Absolute paths, drive prefixes, empty paths, and `..` sequences that
/// climb above the root are rejected. Interior `..` that stays inside is folded
/// (`a/../b.txt` resolves to `b.txt`).
pub fn resolve_within_root(candidate: &str) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(candidate).components() {
        match component {
            Component::Normal(name) => parts.push(name),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.into_iter().collect())
}
