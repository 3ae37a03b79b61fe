//! Git adapter for the commit/push step.
//!
//! Every call is a non-interactive `git` subprocess with captured output and a
//! fixed timeout, so a hung push cannot stall the pipeline.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::io::process::{CommandOutput, DEFAULT_OUTPUT_LIMIT_BYTES, run_with_timeout};

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    timeout: Duration,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_checked(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.stdout.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Set the local commit identity for this repository.
    #[instrument(skip_all)]
    pub fn set_identity(&self, name: &str, email: &str) -> Result<()> {
        self.run_checked(&["config", "user.name", name])?;
        self.run_checked(&["config", "user.email", email])?;
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Commit staged changes. A rejected commit is returned, not raised.
    #[instrument(skip_all)]
    pub fn commit(&self, message: &str) -> Result<CommandOutput> {
        debug!("committing staged changes");
        self.run(&["commit", "-m", message])
    }

    /// Push `branch` to `remote`. A rejected push is returned, not raised.
    #[instrument(skip_all, fields(remote = %remote, branch = %branch))]
    pub fn push(&self, remote: &str, branch: &str) -> Result<CommandOutput> {
        debug!(remote, branch, "pushing");
        self.run(&["push", remote, branch])
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(args)?;
        if !output.success {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                output.stderr.trim()
            ));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0");
        run_with_timeout(cmd, self.timeout, DEFAULT_OUTPUT_LIMIT_BYTES)
            .map_err(|err| err.context(format!("git {}", args.join(" "))))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_modified_line() {
        let e = parse_status_line(" M tools/common.ps1").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: " M".to_string(),
                path: "tools/common.ps1".to_string()
            }
        );
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn rejects_short_line() {
        assert!(parse_status_line("M").is_err());
    }
}
