//! Run context sourced from the CI environment.

use std::env;

use anyhow::{Result, anyhow};

use crate::core::types::ErrorPolicy;

pub const REPOSITORY_VAR: &str = "GITHUB_REPOSITORY";
pub const RUN_ID_VAR: &str = "GITHUB_RUN_ID";
pub const BRANCH_VAR: &str = "GITHUB_REF_NAME";
pub const MODEL_KEY_VAR: &str = "OPENAI_API_KEY";
pub const WRITE_TOKEN_VAR: &str = "REPO_WRITE_TOKEN";

/// Identity of the failed run plus the credentials available to heal it.
#[derive(Clone, PartialEq, Eq)]
pub struct RunContext {
    /// `owner/name` slug.
    pub repo: String,
    pub run_id: String,
    pub branch: String,
    pub model_key: Option<String>,
    pub write_token: Option<String>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("repo", &self.repo)
            .field("run_id", &self.run_id)
            .field("branch", &self.branch)
            .field("model_key", &self.model_key.as_ref().map(|_| "<redacted>"))
            .field("write_token", &self.write_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RunContext {
    /// Read the context from process environment variables.
    pub fn from_env(policy: ErrorPolicy) -> Result<Self> {
        Self::from_lookup(policy, |name| env::var(name).ok())
    }

    /// Build the context from an arbitrary variable lookup.
    ///
    /// Empty values count as absent. The repository, run id and branch are
    /// always required; strict policy also requires the write token.
    pub fn from_lookup(policy: ErrorPolicy, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let missing: Vec<&str> = [REPOSITORY_VAR, RUN_ID_VAR, BRANCH_VAR]
            .into_iter()
            .filter(|name| get(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(anyhow!(
                "missing required environment: {}",
                missing.join(", ")
            ));
        }

        let write_token = get(WRITE_TOKEN_VAR);
        if policy.is_strict() && write_token.is_none() {
            return Err(anyhow!(
                "{WRITE_TOKEN_VAR} is required in strict mode"
            ));
        }

        Ok(Self {
            repo: get(REPOSITORY_VAR).unwrap_or_default(),
            run_id: get(RUN_ID_VAR).unwrap_or_default(),
            branch: get(BRANCH_VAR).unwrap_or_default(),
            model_key: get(MODEL_KEY_VAR),
            write_token,
        })
    }
}
