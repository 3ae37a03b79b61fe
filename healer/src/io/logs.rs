//! Run log retrieval from the CI provider.
//!
//! The [`LogFetcher`] trait isolates the HTTP transport so the degradation
//! policy in [`retrieve_logs`] can be tested with scripted responses. Any
//! failure to obtain a valid archive becomes a placeholder file in the scratch
//! directory rather than an error.

use std::fs;
use std::io::{Cursor, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, LOCATION};
use reqwest::redirect::Policy;
use tracing::{debug, info, instrument, warn};

use crate::core::types::LogBundle;
use crate::io::scratch::ScratchDir;

pub const UNAVAILABLE_PLACEHOLDER: &str = "logs_unavailable.txt";
pub const REDIRECT_FAILED_PLACEHOLDER: &str = "logs_download_failed.txt";
const PLACEHOLDER_BODY_CHARS: usize = 2_000;

/// Identifies the run whose logs should be fetched.
#[derive(Debug, Clone)]
pub struct LogRequest<'a> {
    /// `owner/name` repository slug.
    pub repo: &'a str,
    pub run_id: &'a str,
    pub token: &'a str,
}

/// How the final response was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    Direct,
    Redirected,
}

/// Final HTTP response for a log archive request.
#[derive(Debug, Clone)]
pub struct LogResponse {
    pub hop: Hop,
    pub status: u16,
    pub body: Vec<u8>,
}

/// Abstraction over the CI provider's log download endpoint.
pub trait LogFetcher {
    /// Download the archive, following at most one redirect to a signed URL.
    fn download(&self, request: &LogRequest<'_>) -> Result<LogResponse>;
}

/// Fetcher for the GitHub Actions run-logs endpoint.
pub struct GithubLogFetcher {
    api_base: String,
    api_version: String,
    timeout: Duration,
}

impl GithubLogFetcher {
    pub fn new(
        api_base: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            api_version: api_version.into(),
            timeout,
        }
    }

    fn logs_url(&self, request: &LogRequest<'_>) -> String {
        format!(
            "{}/repos/{}/actions/runs/{}/logs",
            self.api_base.trim_end_matches('/'),
            request.repo,
            request.run_id
        )
    }
}

impl LogFetcher for GithubLogFetcher {
    #[instrument(skip_all, fields(repo = request.repo, run_id = request.run_id))]
    fn download(&self, request: &LogRequest<'_>) -> Result<LogResponse> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("healer/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::none())
            .build()
            .context("build http client")?;

        let url = self.logs_url(request);
        debug!(url = %url, "requesting run logs");
        let resp = client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", request.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", self.api_version.as_str())
            .send()
            .with_context(|| format!("GET {url}"))?;

        let status = resp.status();
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
            && let Some(location) = location
        {
            // The signed URL must not receive the bearer token.
            debug!("following redirect to signed archive url");
            let resp = client
                .get(&location)
                .send()
                .context("GET redirected log archive")?;
            let status = resp.status().as_u16();
            let body = resp.bytes().context("read redirected log archive")?;
            return Ok(LogResponse {
                hop: Hop::Redirected,
                status,
                body: body.to_vec(),
            });
        }

        let body = resp.bytes().context("read log archive")?;
        Ok(LogResponse {
            hop: Hop::Direct,
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

/// Fetch and extract a run's logs into `scratch`, then read them back.
///
/// Transport errors, non-200 responses, and archives that fail to decompress
/// degrade to a placeholder entry so downstream stages can still run.
#[instrument(skip_all, fields(repo = request.repo, run_id = request.run_id))]
pub fn retrieve_logs<F: LogFetcher>(
    fetcher: &F,
    request: &LogRequest<'_>,
    scratch: &ScratchDir,
) -> Result<LogBundle> {
    match fetcher.download(request) {
        Ok(response) => store_response(&response, scratch)?,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "log download failed");
            scratch.write_text(
                UNAVAILABLE_PLACEHOLDER,
                &format!("Logs download failed: {err:#}\n"),
            )?;
        }
    }
    scratch.read_bundle()
}

fn store_response(response: &LogResponse, scratch: &ScratchDir) -> Result<()> {
    if response.status == 200 {
        match extract_archive(&response.body, scratch) {
            Ok(count) => {
                info!(files = count, "extracted run logs");
                return Ok(());
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "log archive did not extract");
                scratch.reset()?;
            }
        }
    } else {
        warn!(status = response.status, hop = ?response.hop, "logs endpoint did not return an archive");
    }

    let snippet = body_snippet(&response.body);
    let (name, contents) = match response.hop {
        Hop::Redirected => (
            REDIRECT_FAILED_PLACEHOLDER,
            format!(
                "Redirected logs download failed: {}\n{snippet}\n",
                response.status
            ),
        ),
        Hop::Direct => (
            UNAVAILABLE_PLACEHOLDER,
            format!(
                "Logs endpoint did not return zip. status={}\n{snippet}\n",
                response.status
            ),
        ),
    };
    scratch.write_text(name, &contents)?;
    Ok(())
}

/// Extract a zip archive into the scratch directory. Returns the file count.
///
/// Entries whose names would escape the directory are skipped.
fn extract_archive(bytes: &[u8], scratch: &ScratchDir) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("open zip archive")?;
    let mut count = 0usize;
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .with_context(|| format!("read zip entry {index}"))?;
        let Some(name) = file.enclosed_name().map(|p| p.to_path_buf()) else {
            warn!(entry = file.name(), "skipping zip entry outside archive root");
            continue;
        };
        let target = scratch.path().join(&name);
        if file.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("create {}", target.display()))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .with_context(|| format!("decompress {}", name.display()))?;
        fs::write(&target, contents).with_context(|| format!("write {}", target.display()))?;
        count += 1;
    }
    Ok(count)
}

fn body_snippet(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(PLACEHOLDER_BODY_CHARS)
        .collect()
}
