//! Orchestration for one self-heal attempt.
//!
//! Sequence: fetch logs, reduce, run deterministic fixers, and only if none
//! of them changed anything fall back to the model. Both repair paths end in
//! [`commit_and_push`].

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::protocol::parse_patches;
use crate::core::reduce::reduce_logs;
use crate::core::types::any_changed;
use crate::io::apply::{ApplyReport, apply_patches};
use crate::io::config::HealerConfig;
use crate::io::env::RunContext;
use crate::io::fixes::run_fixers;
use crate::io::git::Git;
use crate::io::logs::{LogFetcher, LogRequest, retrieve_logs};
use crate::io::model::{CompletionRequest, ModelClient};
use crate::io::prompt::PromptBuilder;
use crate::io::scratch::ScratchDir;
use crate::publish::{PublishOutcome, commit_and_push};

/// Why a run ended without attempting a repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No write credential: logs cannot be downloaded nor fixes pushed.
    MissingWriteToken,
    /// No deterministic fix applied and no model credential to ask for one.
    MissingModelKey,
    /// The model answered without any patch blocks.
    NoPatches,
}

/// Terminal state of [`run_heal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealOutcome {
    /// At least one deterministic fixer changed the target file.
    Fixed {
        fixers: Vec<&'static str>,
        publish: PublishOutcome,
    },
    /// Model patches were applied.
    Patched {
        report: ApplyReport,
        publish: PublishOutcome,
    },
    Skipped(SkipReason),
}

/// Run the full pipeline for the failed run described by `ctx`.
///
/// Errors are returned to the caller; use [`run_heal_guarded`] to downgrade
/// them to a warning.
#[instrument(skip_all, fields(repo = %ctx.repo, run_id = %ctx.run_id, branch = %ctx.branch))]
pub fn run_heal<F: LogFetcher, M: ModelClient>(
    root: &Path,
    ctx: &RunContext,
    config: &HealerConfig,
    fetcher: &F,
    model: &M,
) -> Result<HealOutcome> {
    config.validate()?;
    let Some(token) = ctx.write_token.as_deref() else {
        if config.policy.is_strict() {
            return Err(anyhow!("missing write token"));
        }
        warn!("no write token; cannot download logs or push fixes");
        return Ok(HealOutcome::Skipped(SkipReason::MissingWriteToken));
    };

    let scratch = ScratchDir::acquire(root.join(&config.scratch_dir))?;
    let bundle = retrieve_logs(
        fetcher,
        &LogRequest {
            repo: &ctx.repo,
            run_id: &ctx.run_id,
            token,
        },
        &scratch,
    )?;
    if bundle.is_empty() {
        info!("log archive contained no files");
    }
    let reduced = reduce_logs(&bundle, config.max_log_chars);
    scratch.release()?;
    info!(entries = bundle.entries.len(), chars = reduced.chars().count(), "logs reduced");

    let git = Git::new(root).with_timeout(config.git_timeout());
    let publish = || {
        commit_and_push(
            &git,
            &root.join(&config.scratch_dir),
            &ctx.branch,
            &config.commit,
        )
    };

    let fixes = run_fixers(&root.join(&config.fixers.target), &reduced)?;
    if any_changed(&fixes) {
        let fixers = fixes
            .iter()
            .filter(|result| result.changed)
            .map(|result| result.fixer)
            .collect();
        return Ok(HealOutcome::Fixed {
            fixers,
            publish: publish()?,
        });
    }

    let Some(api_key) = ctx.model_key.as_deref() else {
        info!("no deterministic fix and no model key; nothing to do");
        return Ok(HealOutcome::Skipped(SkipReason::MissingModelKey));
    };

    let prompt = PromptBuilder::new(config.prompt.context_files.clone()).build(root, &reduced)?;
    let response = model.complete(&CompletionRequest {
        api_key,
        system: &config.model.system_prompt,
        prompt: &prompt,
    })?;
    let patches = parse_patches(&response).context("parse model response")?;
    if patches.is_empty() {
        if config.policy.is_strict() {
            return Err(anyhow!("model returned no patches"));
        }
        info!("model returned no patches");
        return Ok(HealOutcome::Skipped(SkipReason::NoPatches));
    }

    let report = apply_patches(root, &patches)?;
    info!(
        applied = report.applied_count(),
        rejected = report.rejected.len(),
        failed = report.failed.len(),
        "model patches applied"
    );
    Ok(HealOutcome::Patched {
        report,
        publish: publish()?,
    })
}

/// Run [`run_heal`], logging any error as a warning instead of returning it.
///
/// A failed heal attempt must not fail the run that invoked it.
pub fn run_heal_guarded<F: LogFetcher, M: ModelClient>(
    root: &Path,
    ctx: &RunContext,
    config: &HealerConfig,
    fetcher: &F,
    model: &M,
) -> Option<HealOutcome> {
    match run_heal(root, ctx, config, fetcher, model) {
        Ok(outcome) => {
            info!(outcome = ?outcome, "self-heal finished");
            Some(outcome)
        }
        Err(err) => {
            warn!(err = %format!("{err:#}"), "self-heal failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ErrorPolicy;
    use crate::io::logs::Hop;
    use crate::test_support::{ScriptedLogFetcher, ScriptedModel, TestRepo, zip_bytes};

    fn context(model_key: Option<&str>, write_token: Option<&str>) -> RunContext {
        RunContext {
            repo: "acme/lab".to_string(),
            run_id: "7".to_string(),
            branch: "main".to_string(),
            model_key: model_key.map(str::to_string),
            write_token: write_token.map(str::to_string),
        }
    }

    #[test]
    fn missing_write_token_skips_before_fetching() {
        let repo = TestRepo::new().expect("repo");
        let fetcher = ScriptedLogFetcher::failing("must not be called");
        let model = ScriptedModel::new(Vec::new());

        let outcome = run_heal(
            repo.path(),
            &context(Some("sk"), None),
            &HealerConfig::default(),
            &fetcher,
            &model,
        )
        .expect("heal");
        assert_eq!(outcome, HealOutcome::Skipped(SkipReason::MissingWriteToken));
        assert_eq!(fetcher.calls(), 0);
        assert!(!repo.path().join("gh_run_logs").exists());
    }

    #[test]
    fn scratch_dir_outside_the_repository_is_refused_before_any_delete() {
        let repo = TestRepo::new().expect("repo");
        repo.write_file("tools/keep.ps1", "keep\n").expect("seed");
        let sibling = repo.path().parent().expect("parent").join("sibling");
        std::fs::create_dir_all(&sibling).expect("mkdir sibling");
        std::fs::write(sibling.join("precious.txt"), "x").expect("seed sibling");

        for scratch_dir in [".", "../sibling"] {
            let config = HealerConfig {
                scratch_dir: scratch_dir.to_string(),
                ..HealerConfig::default()
            };
            let fetcher = ScriptedLogFetcher::archive(Hop::Direct, zip_bytes(&[]));
            let err = run_heal(
                repo.path(),
                &context(None, Some("ghp")),
                &config,
                &fetcher,
                &ScriptedModel::new(Vec::new()),
            )
            .expect_err(scratch_dir);
            assert!(err.to_string().contains("scratch_dir"), "{err}");
            assert_eq!(fetcher.calls(), 0);
        }
        assert_eq!(repo.read_file("tools/keep.ps1").expect("kept"), "keep\n");
        assert!(sibling.join("precious.txt").exists());
    }

    #[test]
    fn strict_policy_rejects_missing_write_token() {
        let repo = TestRepo::new().expect("repo");
        let config = HealerConfig {
            policy: ErrorPolicy::Strict,
            ..HealerConfig::default()
        };
        let err = run_heal(
            repo.path(),
            &context(Some("sk"), None),
            &config,
            &ScriptedLogFetcher::failing("unused"),
            &ScriptedModel::new(Vec::new()),
        )
        .expect_err("strict");
        assert!(err.to_string().contains("write token"));
    }

    #[test]
    fn empty_model_answer_depends_on_policy() {
        let repo = TestRepo::new().expect("repo");
        let archive = zip_bytes(&[("build/1_step.txt", "nothing recognizable\n")]);

        let lenient = run_heal(
            repo.path(),
            &context(Some("sk"), Some("ghp")),
            &HealerConfig::default(),
            &ScriptedLogFetcher::archive(Hop::Direct, archive.clone()),
            &ScriptedModel::new(vec!["I could not find a fix.".to_string()]),
        )
        .expect("lenient");
        assert_eq!(lenient, HealOutcome::Skipped(SkipReason::NoPatches));

        let strict = HealerConfig {
            policy: ErrorPolicy::Strict,
            ..HealerConfig::default()
        };
        let err = run_heal(
            repo.path(),
            &context(Some("sk"), Some("ghp")),
            &strict,
            &ScriptedLogFetcher::archive(Hop::Direct, archive),
            &ScriptedModel::new(vec!["I could not find a fix.".to_string()]),
        )
        .expect_err("strict");
        assert!(err.to_string().contains("no patches"));
    }

    #[test]
    fn protocol_violation_applies_nothing_and_guard_swallows_it() {
        let repo = TestRepo::new().expect("repo");
        let model = ScriptedModel::new(vec![
            "FILE: a.txt\nfirst\n<<<END_FILE\nFILE: b.txt\nhalf".to_string(),
        ]);

        let outcome = run_heal_guarded(
            repo.path(),
            &context(Some("sk"), Some("ghp")),
            &HealerConfig::default(),
            &ScriptedLogFetcher::archive(Hop::Direct, zip_bytes(&[])),
            &model,
        );
        assert!(outcome.is_none());
        assert!(!repo.path().join("a.txt").exists());
        assert!(!repo.path().join("b.txt").exists());
        assert!(!repo.path().join("gh_run_logs").exists());
    }

    #[test]
    fn model_failure_is_swallowed_by_guard() {
        let repo = TestRepo::new().expect("repo");
        let model = ScriptedModel::new(Vec::new());
        let outcome = run_heal_guarded(
            repo.path(),
            &context(Some("sk"), Some("ghp")),
            &HealerConfig::default(),
            &ScriptedLogFetcher::failing("connection refused"),
            &model,
        );
        assert!(outcome.is_none());
        assert_eq!(model.prompts().len(), 1);
        assert!(model.prompts()[0].contains("Logs download failed"));
    }
}
