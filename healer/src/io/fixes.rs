//! Apply deterministic fixers to the target file in place.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::fixers::{Fixer, triggered_fixers};
use crate::core::types::FixResult;

/// Run `fixer` over `target`, writing the file only if it changed.
///
/// A missing target is reported as unchanged.
pub fn apply_fixer(target: &Path, fixer: &Fixer) -> Result<bool> {
    if !target.is_file() {
        debug!(fixer = fixer.name, target = %target.display(), "fixer target missing");
        return Ok(false);
    }
    let text =
        fs::read_to_string(target).with_context(|| format!("read {}", target.display()))?;
    let rewrite = fixer.apply(&text);
    if !rewrite.changed {
        debug!(fixer = fixer.name, "fixer made no change");
        return Ok(false);
    }
    fs::write(target, rewrite.text).with_context(|| format!("write {}", target.display()))?;
    info!(fixer = fixer.name, target = %target.display(), "builtin fix applied");
    Ok(true)
}

/// Run every fixer whose trigger matches `logs` against `target`, in registry order.
#[instrument(skip_all, fields(target = %target.display()))]
pub fn run_fixers(target: &Path, logs: &str) -> Result<Vec<FixResult>> {
    let mut results = Vec::new();
    for fixer in triggered_fixers(logs) {
        let changed = apply_fixer(target, fixer)?;
        results.push(FixResult {
            fixer: fixer.name,
            changed,
        });
    }
    Ok(results)
}
