use std::sync::Arc;

use anyhow::{Result, bail};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use super::{Tool, no_files, object, require_str, str_field};
use crate::core::types::{Action, Payload};
use crate::error::render_chain;
use crate::io::config::GithubConfig;
use crate::io::gh::{GithubApi, PutFile};
use crate::io::workspace::{files_from_input, safe_relative_path};

/// Writes files to a GitHub repository through the contents API.
pub struct GithubWritebackTool {
    api: Arc<dyn GithubApi>,
    default_branch: String,
    commit_message: String,
    require_passing_tests: bool,
}

impl GithubWritebackTool {
    pub fn new(api: Arc<dyn GithubApi>, config: &GithubConfig) -> Self {
        Self {
            api,
            default_branch: config.default_branch.clone(),
            commit_message: config.commit_message.clone(),
            require_passing_tests: config.require_passing_tests,
        }
    }

    fn write_one(&self, repo: &str, branch: &str, message: &str, path: &str, content: &str) -> Result<()> {
        safe_relative_path(path)?;
        let sha = self.api.file_sha(repo, path, branch)?;
        self.api.put_file(&PutFile {
            repo,
            path,
            branch,
            message: &format!("{message}: {path}"),
            content,
            sha: sha.as_deref(),
        })
    }
}

fn tests_passed(input: &Payload) -> bool {
    input
        .get("context")
        .and_then(|context| context.get("run_tests"))
        .and_then(|tests| tests.get("passed"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

impl Tool for GithubWritebackTool {
    fn action(&self) -> Action {
        Action::GithubWriteback
    }

    #[instrument(skip_all)]
    fn run(&self, input: &Payload) -> Result<Payload> {
        let repo = require_str(input, "repo", Action::GithubWriteback)?;
        if self.require_passing_tests && !tests_passed(input) {
            bail!("refusing to write to {repo}: no passing run_tests result in this run");
        }
        let files = files_from_input(input)?;
        if files.is_empty() {
            return Ok(no_files(json!({
                "success": false,
                "files_written": [],
                "errors": [],
            })));
        }
        let branch = str_field(input, "branch").unwrap_or(self.default_branch.as_str());
        let message = str_field(input, "message").unwrap_or(self.commit_message.as_str());

        let mut files_written = Vec::new();
        let mut errors = Vec::new();
        for (path, content) in &files {
            match self.write_one(repo, branch, message, path, content) {
                Ok(()) => files_written.push(path.clone()),
                Err(err) => {
                    let rendered = render_chain(&*err);
                    warn!(repo, path = %path, error = %rendered, "writeback failed");
                    errors.push(json!({"file": path, "error": rendered}));
                }
            }
        }
        info!(repo, branch, written = files_written.len(), failed = errors.len(), "writeback finished");
        Ok(object(json!({
            "success": errors.is_empty(),
            "files_written": files_written,
            "errors": errors,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGithub;

    fn tool(github: &Arc<FakeGithub>, require_passing_tests: bool) -> GithubWritebackTool {
        let config = GithubConfig {
            require_passing_tests,
            ..GithubConfig::default()
        };
        GithubWritebackTool::new(github.clone(), &config)
    }

    #[test]
    fn refuses_without_passing_tests() {
        let github = Arc::new(FakeGithub::default());
        let input = object(json!({
            "repo": "octo/repo",
            "files": {"a.py": "x = 1"},
            "context": {"run_tests": {"passed": false}},
        }));
        let err = tool(&github, true).run(&input).unwrap_err();
        assert!(err.to_string().contains("no passing run_tests result"));
        assert!(github.puts().is_empty());
    }

    #[test]
    fn updates_existing_and_creates_new_files() {
        let github = Arc::new(FakeGithub::with_existing([("a.py", "abc123")]));
        let input = object(json!({
            "repo": "octo/repo",
            "files": {"a.py": "x = 1", "b.py": "y = 2"},
            "message": "sync",
            "context": {"run_tests": {"passed": true}},
        }));
        let result = tool(&github, true).run(&input).expect("run");
        assert_eq!(
            Value::Object(result),
            json!({"success": true, "files_written": ["a.py", "b.py"], "errors": []})
        );

        let puts = github.puts();
        assert_eq!(puts.len(), 2);
        assert_eq!(puts[0].path, "a.py");
        assert_eq!(puts[0].sha.as_deref(), Some("abc123"));
        assert_eq!(puts[0].message, "sync: a.py");
        assert_eq!(puts[0].branch, "main");
        assert_eq!(puts[1].sha, None);
    }

    #[test]
    fn per_file_failures_are_collected() {
        let github = Arc::new(FakeGithub::default());
        let input = object(json!({
            "repo": "octo/repo",
            "files": {"../escape.py": "x", "ok.py": "y"},
        }));
        let result = tool(&github, false).run(&input).expect("run");
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["files_written"], json!(["ok.py"]));
        assert_eq!(result["errors"][0]["file"], json!("../escape.py"));
    }

    #[test]
    fn missing_repo_is_an_error() {
        let github = Arc::new(FakeGithub::default());
        let err = tool(&github, false).run(&Payload::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "github_writeback requires a non-empty 'repo'"
        );
    }
}
