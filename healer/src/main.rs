//! `healer`: self-heal a failed CI run.
//!
//! `healer run` is meant to be the last step of a failing workflow. It always
//! exits 0 once configuration has been read, so a failed heal attempt never
//! fails the run that invoked it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, warn};

use healer::core::protocol::parse_patches;
use healer::core::reduce::{DEFAULT_MAX_LOG_CHARS, reduce_logs};
use healer::core::types::ErrorPolicy;
use healer::exit_codes;
use healer::heal::run_heal_guarded;
use healer::io::config::{CONFIG_FILE, HealerConfig, load_config};
use healer::io::env::RunContext;
use healer::io::fixes::run_fixers;
use healer::io::logs::GithubLogFetcher;
use healer::io::model::ChatCompletionsClient;
use healer::io::scratch::read_bundle;
use healer::logging;

#[derive(Parser)]
#[command(name = "healer", version, about = "Self-healing patch engine for failed CI runs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Heal the failed run described by the CI environment.
    Run {
        /// Repository root.
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Config file (default: `<root>/.healer.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Fail fast on missing configuration and empty model output.
        #[arg(long, conflicts_with = "lenient")]
        strict: bool,
        /// Degrade and continue (default).
        #[arg(long)]
        lenient: bool,
    },
    /// Run the deterministic fixers against a saved log file. Does not commit.
    Fix {
        /// Log text to match fixer signatures against.
        #[arg(long)]
        logs: PathBuf,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Parse a saved model response and list its patches.
    Parse { file: PathBuf },
    /// Print the reduced log of an extracted log directory.
    Reduce {
        dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MAX_LOG_CHARS)]
        max_chars: usize,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run {
            root,
            config,
            strict,
            lenient,
        } => cmd_run(&root, config.as_deref(), policy_override(strict, lenient)),
        Command::Fix { logs, root, config } => report(cmd_fix(&logs, &root, config.as_deref())),
        Command::Parse { file } => report(cmd_parse(&file)),
        Command::Reduce { dir, max_chars } => report(cmd_reduce(&dir, max_chars)),
    };
    std::process::exit(code);
}

fn policy_override(strict: bool, lenient: bool) -> Option<ErrorPolicy> {
    match (strict, lenient) {
        (true, _) => Some(ErrorPolicy::Strict),
        (_, true) => Some(ErrorPolicy::Lenient),
        _ => None,
    }
}

fn report(result: Result<()>) -> i32 {
    match result {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    }
}

fn load_for(root: &Path, config: Option<&Path>) -> Result<HealerConfig> {
    let path = config.map_or_else(|| root.join(CONFIG_FILE), Path::to_path_buf);
    load_config(&path)
}

fn cmd_run(root: &Path, config: Option<&Path>, policy: Option<ErrorPolicy>) -> i32 {
    let mut cfg = match load_for(root, config) {
        Ok(cfg) => cfg,
        Err(err) => return configuration_failure(policy.unwrap_or_default(), &err),
    };
    if let Some(policy) = policy {
        cfg.policy = policy;
    }
    let ctx = match RunContext::from_env(cfg.policy) {
        Ok(ctx) => ctx,
        Err(err) => return configuration_failure(cfg.policy, &err),
    };

    let fetcher = GithubLogFetcher::new(
        &cfg.github.api_base,
        &cfg.github.api_version,
        cfg.http_timeout(),
    );
    let model = ChatCompletionsClient::new(
        &cfg.model.endpoint,
        &cfg.model.name,
        cfg.model.temperature,
        cfg.http_timeout(),
    );
    if let Some(outcome) = run_heal_guarded(root, &ctx, &cfg, &fetcher, &model) {
        println!("{outcome:?}");
    }
    exit_codes::OK
}

fn configuration_failure(policy: ErrorPolicy, err: &anyhow::Error) -> i32 {
    if policy.is_strict() {
        error!(err = %format!("{err:#}"), "invalid configuration");
        eprintln!("{err:#}");
        return exit_codes::INVALID;
    }
    warn!(err = %format!("{err:#}"), "configuration incomplete; skipping self-heal");
    exit_codes::OK
}

fn cmd_fix(logs: &Path, root: &Path, config: Option<&Path>) -> Result<()> {
    let cfg = load_for(root, config)?;
    let bytes = fs::read(logs).with_context(|| format!("read {}", logs.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let results = run_fixers(&root.join(&cfg.fixers.target), &text)?;
    for result in results {
        let state = if result.changed { "changed" } else { "unchanged" };
        println!("{}\t{state}", result.fixer);
    }
    Ok(())
}

fn cmd_parse(file: &Path) -> Result<()> {
    let response =
        fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let patches = parse_patches(&response)?;
    for patch in patches {
        println!("{}\t{} bytes", patch.path, patch.content.len());
    }
    Ok(())
}

fn cmd_reduce(dir: &Path, max_chars: usize) -> Result<()> {
    let bundle = read_bundle(dir)?;
    print!("{}", reduce_logs(&bundle, max_chars));
    Ok(())
}
