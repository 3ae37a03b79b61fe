//! Healer configuration stored in `.healer.toml` at the repository root.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::boundary::resolve_within_root;
use crate::core::reduce::DEFAULT_MAX_LOG_CHARS;
use crate::core::types::ErrorPolicy;
use crate::io::prompt::DEFAULT_CONTEXT_FILES;
use crate::io::scratch::DEFAULT_SCRATCH_DIR;

pub const CONFIG_FILE: &str = ".healer.toml";

/// Healer configuration (TOML).
///
/// Missing fields default to the values the CI workflow expects, so an absent
/// file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealerConfig {
    /// `strict` fails fast on missing config and empty model output; `lenient` degrades.
    pub policy: ErrorPolicy,

    /// Keep at most this many trailing characters of the combined run log.
    pub max_log_chars: usize,

    /// Scratch directory for downloaded logs, relative to the repository root.
    pub scratch_dir: String,

    /// Timeout for each network call (log download, model completion).
    pub http_timeout_secs: u64,

    /// Timeout for each git subprocess.
    pub git_timeout_secs: u64,

    pub github: GithubConfig,
    pub model: ModelConfig,
    pub prompt: PromptConfig,
    pub fixers: FixersConfig,
    pub commit: CommitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    pub api_version: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            api_version: "2022-11-28".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Chat completions endpoint.
    pub endpoint: String,
    pub name: String,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            name: "gpt-4.1-mini".to_string(),
            temperature: 0.1,
            system_prompt: "You are a precise CI fixer. Respond only with file replacements in the specified format.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// Repository files included in the prompt, in order.
    pub context_files: Vec<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            context_files: DEFAULT_CONTEXT_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixersConfig {
    /// File the deterministic fixers patch, relative to the repository root.
    pub target: String,
}

impl Default for FixersConfig {
    fn default() -> Self {
        Self {
            target: "tools/common.ps1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommitConfig {
    pub user_name: String,
    pub user_email: String,
    pub message: String,
    pub remote: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            user_name: "agentic-bot".to_string(),
            user_email: "agentic-bot@local".to_string(),
            message: "Self-heal: fix pipeline".to_string(),
            remote: "origin".to_string(),
        }
    }
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            policy: ErrorPolicy::default(),
            max_log_chars: DEFAULT_MAX_LOG_CHARS,
            scratch_dir: DEFAULT_SCRATCH_DIR.to_string(),
            http_timeout_secs: 60,
            git_timeout_secs: 120,
            github: GithubConfig::default(),
            model: ModelConfig::default(),
            prompt: PromptConfig::default(),
            fixers: FixersConfig::default(),
            commit: CommitConfig::default(),
        }
    }
}

impl HealerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_log_chars == 0 {
            return Err(anyhow!("max_log_chars must be > 0"));
        }
        if self.http_timeout_secs == 0 {
            return Err(anyhow!("http_timeout_secs must be > 0"));
        }
        if self.git_timeout_secs == 0 {
            return Err(anyhow!("git_timeout_secs must be > 0"));
        }
        // Both are removed or rewritten in place, so they must stay strictly
        // below the repository root.
        if resolve_within_root(&self.scratch_dir).is_none() {
            return Err(anyhow!(
                "scratch_dir must be a relative path inside the repository, got '{}'",
                self.scratch_dir
            ));
        }
        if resolve_within_root(&self.fixers.target).is_none() {
            return Err(anyhow!(
                "fixers.target must be a relative path inside the repository, got '{}'",
                self.fixers.target
            ));
        }
        if self.model.name.trim().is_empty() || self.model.endpoint.trim().is_empty() {
            return Err(anyhow!("model.name and model.endpoint must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(anyhow!("model.temperature must be within 0.0..=2.0"));
        }
        let commit = &self.commit;
        if [&commit.user_name, &commit.user_email, &commit.message, &commit.remote]
            .iter()
            .any(|value| value.trim().is_empty())
        {
            return Err(anyhow!(
                "commit.user_name, commit.user_email, commit.message and commit.remote must not be empty"
            ));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HealerConfig::default()`.
pub fn load_config(path: &Path) -> Result<HealerConfig> {
    if !path.exists() {
        let cfg = HealerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HealerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
