//! Patch applier: write model-proposed files inside the repository root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::boundary::resolve_within_root;
use crate::core::types::Patch;

/// Per-patch results of an apply pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Paths written, in patch order.
    pub applied: Vec<String>,
    /// Paths skipped because they resolve outside the repository.
    pub rejected: Vec<String>,
    /// Paths whose write failed, with the error.
    pub failed: Vec<(String, String)>,
}

impl ApplyReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// Write each patch under `root`, overwriting whole files.
///
/// Paths that are not strict descendants of `root` are skipped with a warning.
/// A failed write does not stop the remaining patches.
#[instrument(skip_all, fields(root = %root.display(), patches = patches.len()))]
pub fn apply_patches(root: &Path, patches: &[Patch]) -> Result<ApplyReport> {
    let canonical_root = root
        .canonicalize()
        .with_context(|| format!("resolve repository root {}", root.display()))?;
    let mut report = ApplyReport::default();

    for patch in patches {
        let target = match resolve_target(&canonical_root, &patch.path) {
            Ok(target) => target,
            Err(err) => {
                warn!(path = %patch.path, err = %err, "skipping path outside repo");
                report.rejected.push(patch.path.clone());
                continue;
            }
        };
        match write_patch(&target, &patch.content) {
            Ok(()) => {
                info!(path = %patch.path, "applied patch");
                report.applied.push(patch.path.clone());
            }
            Err(err) => {
                warn!(path = %patch.path, err = %format!("{err:#}"), "failed to apply patch");
                report.failed.push((patch.path.clone(), format!("{err:#}")));
            }
        }
    }

    Ok(report)
}

/// Resolve `candidate` to an absolute path that stays under `root`.
///
/// Every existing symlink on the way is resolved and must land inside `root`.
/// Dangling links are refused because writing through one creates its target.
fn resolve_target(root: &Path, candidate: &str) -> Result<PathBuf> {
    let relative = resolve_within_root(candidate)
        .ok_or_else(|| anyhow!("path escapes repository: {candidate}"))?;
    let target = root.join(&relative);
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        // A component that cannot be inspected has nothing below it to follow;
        // the write itself reports the error.
        let Ok(metadata) = fs::symlink_metadata(&current) else {
            break;
        };
        if !metadata.file_type().is_symlink() {
            continue;
        }
        let resolved = current
            .canonicalize()
            .map_err(|_| anyhow!("path goes through a dangling symlink: {candidate}"))?;
        if !resolved.starts_with(root) {
            return Err(anyhow!("path escapes repository via symlink: {candidate}"));
        }
        if resolved == root && current == target {
            return Err(anyhow!("path resolves to repository root: {candidate}"));
        }
    }
    Ok(target)
}

fn write_patch(target: &Path, content: &str) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(target, content).with_context(|| format!("write {}", target.display()))
}
