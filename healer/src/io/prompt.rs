//! Prompt builder for the AI repair path.
//!
//! The prompt is a fixed-structure document: instruction preamble, reduced
//! log, then the contents of a fixed, ordered list of repository files. Missing
//! or empty files are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

const SELF_HEAL_TEMPLATE: &str = include_str!("prompts/self_heal.md");

/// Default repository files included as context, in prompt order.
pub const DEFAULT_CONTEXT_FILES: &[&str] = &[
    "config/lab.json",
    ".github/workflows/azure-fgt-lab.yml",
    "tools/common.ps1",
    "scripts/01_hub_fgt_deploy.sh",
    "scripts/02_spoke_routing.sh",
    "scripts/stage1.ps1",
    "scripts/stage2.ps1",
    "scripts/stage3.ps1",
    "scripts/03_fgt_min_config_snippet.sh",
    "scripts/04_validate_env.sh",
];

/// One repository file rendered into the prompt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

/// Builds prompts from a fixed list of repository-relative context files.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    context_files: Vec<String>,
}

impl PromptBuilder {
    pub fn new(context_files: Vec<String>) -> Self {
        Self { context_files }
    }

    /// Read the context files under `root` and render the prompt.
    pub fn build(&self, root: &Path, reduced_log: &str) -> Result<String> {
        let files = self.read_context(root)?;
        debug!(
            included = files.len(),
            configured = self.context_files.len(),
            "prompt context loaded"
        );
        render_prompt(reduced_log, &files)
    }

    fn read_context(&self, root: &Path) -> Result<Vec<ContextFile>> {
        let mut files = Vec::new();
        for rel in &self.context_files {
            let Some(content) = read_optional(root.join(rel))? else {
                continue;
            };
            if content.is_empty() {
                continue;
            }
            files.push(ContextFile {
                path: rel.clone(),
                content,
            });
        }
        Ok(files)
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_FILES.iter().map(|s| s.to_string()).collect())
    }
}

/// Render the prompt from already-loaded inputs.
pub fn render_prompt(reduced_log: &str, files: &[ContextFile]) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("self_heal.md", SELF_HEAL_TEMPLATE)
        .context("load self-heal prompt template")?;
    let template = env.get_template("self_heal.md")?;
    let rendered = template
        .render(context! {
            logs => reduced_log,
            files => files,
        })
        .context("render self-heal prompt")?;
    Ok(rendered)
}

/// Read file contents if it exists, returning `None` for missing files.
fn read_optional(path: impl Into<PathBuf>) -> Result<Option<String>> {
    let path = path.into();
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(&path).with_context(|| format!("read prompt input {}", path.display()))?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_sections_appear_in_fixed_order() {
        let files = vec![
            ContextFile {
                path: "config/lab.json".to_string(),
                content: "{\"hub\": true}\n".to_string(),
            },
            ContextFile {
                path: "tools/common.ps1".to_string(),
                content: "function X {}\n".to_string(),
            },
        ];
        let prompt = render_prompt("--- job.txt ---\nERROR here\n", &files).expect("render");

        let format_pos = prompt.find("FILE: relative/path").expect("format directive");
        let logs_pos = prompt.find("ERROR here").expect("logs");
        let lab_pos = prompt.find("FILE_CONTENT: config/lab.json").expect("lab");
        let common_pos = prompt.find("FILE_CONTENT: tools/common.ps1").expect("common");

        assert!(format_pos < logs_pos);
        assert!(logs_pos < lab_pos);
        assert!(lab_pos < common_pos);
        assert!(prompt.contains("{\"hub\": true}"), "content is not escaped");
        assert!(prompt.contains("<<<END_FILE"));
        assert!(prompt.contains("non-overlapping"));
    }

    #[test]
    fn build_skips_missing_and_empty_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("scripts")).expect("mkdir");
        fs::write(root.join("scripts/stage1.ps1"), "Write-Host stage1\n").expect("write");
        fs::write(root.join("scripts/stage2.ps1"), "").expect("write");

        let prompt = PromptBuilder::default().build(root, "logs").expect("build");
        assert!(prompt.contains("FILE_CONTENT: scripts/stage1.ps1"));
        assert!(prompt.contains("Write-Host stage1"));
        assert!(!prompt.contains("FILE_CONTENT: scripts/stage2.ps1"));
        assert!(!prompt.contains("FILE_CONTENT: config/lab.json"));
    }

    #[test]
    fn build_is_deterministic() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("tools")).expect("mkdir");
        fs::write(temp.path().join("tools/common.ps1"), "x\n").expect("write");
        let builder = PromptBuilder::default();
        let a = builder.build(temp.path(), "same logs").expect("a");
        let b = builder.build(temp.path(), "same logs").expect("b");
        assert_eq!(a, b);
    }
}
