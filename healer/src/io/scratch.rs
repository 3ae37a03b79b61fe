//! Scratch directory for downloaded run logs.
//!
//! The directory is owned by one pipeline invocation: cleared and recreated on
//! acquire, removed on release, and removed again on drop so logs never linger
//! into a commit on any exit path.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::types::{LogBundle, LogEntry};

pub const DEFAULT_SCRATCH_DIR: &str = "gh_run_logs";

#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    released: bool,
}

impl ScratchDir {
    /// Clear any stale contents at `path` and create it fresh.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        clear_dir(&path)?;
        fs::create_dir_all(&path)
            .with_context(|| format!("create scratch dir {}", path.display()))?;
        debug!(dir = %path.display(), "scratch dir acquired");
        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop everything extracted so far, keeping the directory.
    pub fn reset(&self) -> Result<()> {
        clear_dir(&self.path)?;
        fs::create_dir_all(&self.path)
            .with_context(|| format!("recreate scratch dir {}", self.path.display()))
    }

    /// Write a text file at the top of the scratch directory.
    pub fn write_text(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path.join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn read_bundle(&self) -> Result<LogBundle> {
        read_bundle(&self.path)
    }

    /// Remove the directory now.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        clear_dir(&self.path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = clear_dir(&self.path) {
            warn!(dir = %self.path.display(), err = %err, "failed to remove scratch dir");
        }
    }
}

/// Remove `dir` and everything in it; missing is fine.
pub fn clear_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!(dir = %dir.display(), "removing dir");
        fs::remove_dir_all(dir).with_context(|| format!("remove dir {}", dir.display()))?;
    }
    Ok(())
}

/// Read every regular file under `dir` into a bundle sorted by relative path.
///
/// Files that cannot be read are skipped.
pub fn read_bundle(dir: &Path) -> Result<LogBundle> {
    let mut entries = Vec::new();
    collect_files(dir, dir, &mut entries)?;
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(LogBundle::new(entries))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<LogEntry>) -> Result<()> {
    let read = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
    for entry in read {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), err = %err, "skipping unreadable log file");
                continue;
            }
        };
        out.push(LogEntry {
            path: relative_slash_path(root, &path),
            bytes,
        });
    }
    Ok(())
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_clears_stale_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("logs");
        fs::create_dir_all(&dir).expect("create");
        fs::write(dir.join("stale.txt"), "old run").expect("write stale");

        let scratch = ScratchDir::acquire(&dir).expect("acquire");
        assert!(scratch.path().is_dir());
        assert!(!dir.join("stale.txt").exists());
    }

    #[test]
    fn release_and_drop_remove_the_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let released = temp.path().join("released");
        let dropped = temp.path().join("dropped");

        let scratch = ScratchDir::acquire(&released).expect("acquire");
        scratch.write_text("a.txt", "a").expect("write");
        scratch.release().expect("release");
        assert!(!released.exists());

        {
            let scratch = ScratchDir::acquire(&dropped).expect("acquire");
            scratch.write_text("b.txt", "b").expect("write");
        }
        assert!(!dropped.exists());
    }

    #[test]
    fn read_bundle_walks_nested_files_in_lexical_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scratch = ScratchDir::acquire(temp.path().join("logs")).expect("acquire");
        fs::create_dir_all(scratch.path().join("build")).expect("mkdir");
        fs::write(scratch.path().join("build/2_test.txt"), "t").expect("write");
        fs::write(scratch.path().join("1_setup.txt"), "s").expect("write");

        let bundle = scratch.read_bundle().expect("bundle");
        let paths: Vec<&str> = bundle.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["1_setup.txt", "build/2_test.txt"]);
        assert_eq!(bundle.entries[1].bytes, b"t");
    }
}
