//! Test-only helpers: throwaway git repositories and scripted network adapters.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::logs::{Hop, LogFetcher, LogRequest, LogResponse};
use crate::io::model::{CompletionRequest, ModelClient};

/// Working repository on branch `main` whose `origin` is a local bare repo.
///
/// The initial commit (a README) is already pushed, so the tree starts clean.
pub struct TestRepo {
    _temp: TempDir,
    root: PathBuf,
    remote: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let remote = temp.path().join("remote.git");
        let root = temp.path().join("work");
        fs::create_dir_all(&root).context("create work dir")?;

        run_git(temp.path(), &["init", "--bare", "-q", "remote.git"])?;
        run_git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"])?;

        run_git(&root, &["init", "-q"])?;
        run_git(&root, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        run_git(&root, &["config", "user.name", "Test User"])?;
        run_git(&root, &["config", "user.email", "test@example.com"])?;
        run_git(&root, &["config", "commit.gpgsign", "false"])?;
        fs::write(root.join("README.md"), "# lab\n").context("write README")?;
        run_git(&root, &["add", "-A"])?;
        run_git(&root, &["commit", "-q", "-m", "initial"])?;
        let remote_url = remote.to_string_lossy().to_string();
        run_git(&root, &["remote", "add", "origin", &remote_url])?;
        run_git(&root, &["push", "-q", "-u", "origin", "main"])?;

        Ok(Self {
            _temp: temp,
            root,
            remote,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read_file(&self, rel: &str) -> Result<String> {
        let path = self.root.join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Commit everything in the working tree and push it, as the test user.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        self.git(&["push", "-q", "origin", "main"])?;
        Ok(())
    }

    /// Run git in the working repository and return stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        run_git(&self.root, args)
    }

    pub fn remote_commit_count(&self) -> Result<usize> {
        let out = run_git(&self.remote, &["rev-list", "--count", "main"])?;
        out.trim()
            .parse()
            .with_context(|| format!("parse commit count '{}'", out.trim()))
    }

    pub fn remote_head_subject(&self) -> Result<String> {
        Ok(run_git(&self.remote, &["log", "-1", "--format=%s", "main"])?
            .trim()
            .to_string())
    }

    pub fn remote_head_author(&self) -> Result<String> {
        Ok(run_git(&self.remote, &["log", "-1", "--format=%an", "main"])?
            .trim()
            .to_string())
    }

    /// Content of `rel` at the tip of the remote `main`.
    pub fn remote_file(&self, rel: &str) -> Result<String> {
        run_git(&self.remote, &["show", &format!("main:{rel}")])
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Build an in-memory zip archive from `(name, contents)` pairs.
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    for (name, contents) in files {
        writer
            .start_file(*name, options)
            .expect("start zip entry");
        writer
            .write_all(contents.as_bytes())
            .expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

enum FetchScript {
    Respond(LogResponse),
    Fail(String),
}

/// Log fetcher returning the same scripted result on every call.
pub struct ScriptedLogFetcher {
    script: FetchScript,
    calls: Cell<usize>,
}

impl ScriptedLogFetcher {
    /// Respond 200 with `bytes`.
    pub fn archive(hop: Hop, bytes: Vec<u8>) -> Self {
        Self::response(hop, 200, bytes)
    }

    pub fn response(hop: Hop, status: u16, body: Vec<u8>) -> Self {
        Self {
            script: FetchScript::Respond(LogResponse { hop, status, body }),
            calls: Cell::new(0),
        }
    }

    /// Fail with a transport error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            script: FetchScript::Fail(message.to_string()),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl LogFetcher for ScriptedLogFetcher {
    fn download(&self, _request: &LogRequest<'_>) -> Result<LogResponse> {
        self.calls.set(self.calls.get() + 1);
        match &self.script {
            FetchScript::Respond(response) => Ok(response.clone()),
            FetchScript::Fail(message) => Err(anyhow!("{message}")),
        }
    }
}

/// Model client that pops scripted responses in order and records every prompt.
///
/// Running out of responses is an error, like a failed API call.
pub struct ScriptedModel {
    responses: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        self.prompts.borrow_mut().push(request.prompt.to_string());
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted model response left"))
    }
}
