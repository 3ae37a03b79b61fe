//! Shared deterministic types for the healing pipeline.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use serde::{Deserialize, Serialize};

/// Full-file replacement proposed by the model.
///
/// `path` is untrusted until checked against the repository boundary.
/// `content` always ends with exactly one trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub path: String,
    pub content: String,
}

/// Patches in order of appearance in a model response.
///
/// Later patches to the same path overwrite earlier ones at apply time.
pub type PatchSet = Vec<Patch>;

/// A single file extracted from a run's log archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// `/`-separated path relative to the scratch directory.
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Files extracted from a run's log archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBundle {
    pub entries: Vec<LogEntry>,
}

impl LogBundle {
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How strictly the pipeline treats missing configuration and empty model output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Fail fast on missing required configuration or a response with no patches.
    Strict,
    /// Degrade to a clean no-op and continue.
    #[default]
    Lenient,
}

impl ErrorPolicy {
    pub fn is_strict(self) -> bool {
        self == ErrorPolicy::Strict
    }
}

/// Outcome of one deterministic fixer against the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixResult {
    pub fixer: &'static str,
    pub changed: bool,
}

/// True if any fixer in the batch modified the target file.
pub fn any_changed(results: &[FixResult]) -> bool {
    results.iter().any(|result| result.changed)
}
