//! GitHub contents API adapter over the `gh` CLI.
//!
//! Authentication is whatever `gh auth` already holds; the adapter never
//! reads tokens itself.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use tracing::{debug, instrument};

use crate::io::process::{ProcessRequest, run_captured};

const GH_TIMEOUT: Duration = Duration::from_secs(60);
const GH_OUTPUT_LIMIT: usize = 1_000_000;

/// The two contents API calls file writeback needs.
pub trait GithubApi: Send + Sync {
    /// Blob sha of `path` on `branch`, or `None` when the file does not exist.
    fn file_sha(&self, repo: &str, path: &str, branch: &str) -> Result<Option<String>>;

    /// Create or update `path` on `branch`. `sha` is required for updates.
    fn put_file(&self, request: &PutFile<'_>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutFile<'a> {
    pub repo: &'a str,
    pub path: &'a str,
    pub branch: &'a str,
    pub message: &'a str,
    pub content: &'a str,
    pub sha: Option<&'a str>,
}

/// `gh api` subprocess wrapper.
#[derive(Debug, Clone)]
pub struct GhCli {
    program: String,
}

impl Default for GhCli {
    fn default() -> Self {
        Self {
            program: "gh".to_string(),
        }
    }
}

impl GhCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn api(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<(bool, String, String)> {
        let mut argv = vec![self.program.clone(), "api".to_string()];
        argv.extend(args.iter().map(|arg| (*arg).to_string()));
        let mut request = ProcessRequest::new(&argv, GH_TIMEOUT, GH_OUTPUT_LIMIT);
        request.stdin = stdin;
        let output = run_captured(&request).with_context(|| format!("gh api {}", args.join(" ")))?;
        if output.timed_out {
            return Err(anyhow!("gh api {} timed out", args.join(" ")));
        }
        Ok((output.success(), output.stdout_text(), output.stderr_text()))
    }
}

/// Accept only `owner/name` with two plain segments.
fn check_repo(repo: &str) -> Result<()> {
    let plain = |segment: &str| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    match repo.split_once('/') {
        Some((owner, name)) if plain(owner) && plain(name) => Ok(()),
        _ => bail!("repository must look like 'owner/name', got '{repo}'"),
    }
}

fn contents_endpoint(repo: &str, path: &str) -> Result<String> {
    check_repo(repo)?;
    let path: Vec<_> = path
        .trim_start_matches('/')
        .split('/')
        .map(urlencoding::encode)
        .collect();
    Ok(format!("repos/{repo}/contents/{}", path.join("/")))
}

fn ref_query(branch: &str) -> String {
    format!("ref={}", urlencoding::encode(branch))
}

impl GithubApi for GhCli {
    #[instrument(skip(self))]
    fn file_sha(&self, repo: &str, path: &str, branch: &str) -> Result<Option<String>> {
        let endpoint = format!("{}?{}", contents_endpoint(repo, path)?, ref_query(branch));
        let (ok, stdout, stderr) = self.api(&[&endpoint, "--jq", ".sha"], None)?;
        if !ok {
            if stderr.contains("404") || stderr.contains("Not Found") {
                debug!("file not present on branch");
                return Ok(None);
            }
            return Err(anyhow!("gh api GET {endpoint} failed: {}", stderr.trim()));
        }
        let sha = stdout.trim();
        Ok((!sha.is_empty()).then(|| sha.to_string()))
    }

    #[instrument(skip_all, fields(repo = request.repo, path = request.path, branch = request.branch))]
    fn put_file(&self, request: &PutFile<'_>) -> Result<()> {
        let endpoint = contents_endpoint(request.repo, request.path)?;
        let mut body = json!({
            "message": request.message,
            "content": STANDARD.encode(request.content.as_bytes()),
            "branch": request.branch,
        });
        if let Some(sha) = request.sha {
            body["sha"] = json!(sha);
        }
        let body = serde_json::to_vec(&body).context("serialize contents body")?;
        let (ok, _stdout, stderr) =
            self.api(&["--method", "PUT", &endpoint, "--input", "-"], Some(&body))?;
        if !ok {
            return Err(anyhow!("gh api PUT {endpoint} failed: {}", stderr.trim()));
        }
        debug!("file written");
        Ok(())
    }
}
