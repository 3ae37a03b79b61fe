//! Commit-and-push step shared by the deterministic and AI repair paths.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::io::config::CommitConfig;
use crate::io::git::Git;
use crate::io::process::CommandOutput;
use crate::io::scratch::clear_dir;

/// Git step that rejected the publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Commit,
    Push,
}

/// Result of a publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Working tree was clean; nothing was committed.
    NoChanges,
    /// Changes were committed and pushed.
    Pushed {
        /// Paths reported by `git status` before staging.
        changed: Vec<String>,
        /// Combined commit and push output.
        output: String,
    },
    /// Commit or push exited non-zero. Reported, never raised.
    Failed { stage: PublishStage, detail: String },
}

/// Commit every working-tree change and push it to `branch`.
///
/// `scratch_dir` is removed first so downloaded logs can never be staged.
/// A clean tree is a no-op, which makes re-running after a successful heal safe.
#[instrument(skip_all, fields(branch = %branch))]
pub fn commit_and_push(
    git: &Git,
    scratch_dir: &Path,
    branch: &str,
    commit: &CommitConfig,
) -> Result<PublishOutcome> {
    clear_dir(scratch_dir)?;

    let status = git.status_porcelain()?;
    if status.is_empty() {
        info!("no changes to commit");
        return Ok(PublishOutcome::NoChanges);
    }
    for entry in &status {
        debug!(code = %entry.code, path = %entry.path, "changed");
    }
    let changed: Vec<String> = status.into_iter().map(|entry| entry.path).collect();
    info!(files = changed.len(), "publishing changes");

    git.set_identity(&commit.user_name, &commit.user_email)?;
    git.add_all()?;

    let committed = git.commit(&commit.message)?;
    log_output("commit", &committed);
    if !committed.success {
        return Ok(failed(PublishStage::Commit, &committed));
    }

    let pushed = git.push(&commit.remote, branch)?;
    log_output("push", &pushed);
    if !pushed.success {
        return Ok(failed(PublishStage::Push, &pushed));
    }

    let mut output = committed.combined();
    let push_text = pushed.combined();
    if !push_text.is_empty() {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&push_text);
    }
    Ok(PublishOutcome::Pushed { changed, output })
}

fn log_output(step: &str, output: &CommandOutput) {
    info!(step, exit_code = ?output.code, output = %output.combined(), "git {step} finished");
}

fn failed(stage: PublishStage, output: &CommandOutput) -> PublishOutcome {
    let detail = if output.timed_out {
        format!("timed out\n{}", output.combined())
    } else {
        output.combined()
    };
    warn!(stage = ?stage, detail = %detail, "publish failed");
    PublishOutcome::Failed { stage, detail }
}
