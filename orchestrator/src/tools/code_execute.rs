use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, instrument};

use super::{Tool, no_files, object, str_field, u64_field};
use crate::core::types::{Action, Payload};
use crate::io::process::{ProcessRequest, run_captured};
use crate::io::workspace::{files_from_input, materialize, safe_relative_path};

const DEFAULT_ENTRY: &str = "main.py";

/// Runs an entry script with the configured interpreter in a scratch directory.
pub struct CodeExecuteTool {
    python: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CodeExecuteTool {
    pub fn new(python: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            python,
            timeout,
            output_limit_bytes,
        }
    }
}

fn failure(error: String) -> Payload {
    object(json!({
        "success": false,
        "error": error,
        "stdout": "",
        "stderr": "",
        "returncode": -1,
    }))
}

impl Tool for CodeExecuteTool {
    fn action(&self) -> Action {
        Action::CodeExecute
    }

    #[instrument(skip_all)]
    fn run(&self, input: &Payload) -> Result<Payload> {
        let files = files_from_input(input)?;
        if files.is_empty() {
            return Ok(no_files(json!({
                "success": false,
                "stdout": "",
                "stderr": "",
                "returncode": -1,
            })));
        }
        let entry = str_field(input, "entry").unwrap_or(DEFAULT_ENTRY);
        safe_relative_path(entry)?;
        if !files.contains_key(entry) {
            return Ok(failure(format!("entry '{entry}' is not among the files")));
        }
        let timeout = u64_field(input, "timeout").map_or(self.timeout, Duration::from_secs);

        let sandbox = tempfile::tempdir().context("create sandbox directory")?;
        materialize(sandbox.path(), &files)?;
        let mut argv = self.python.clone();
        argv.push(entry.to_string());
        let mut request = ProcessRequest::new(&argv, timeout, self.output_limit_bytes);
        request.workdir = Some(sandbox.path());
        let output = run_captured(&request).context("run sandboxed code")?;

        if output.timed_out {
            let mut result = failure(format!("execution timed out after {}s", timeout.as_secs()));
            result.insert("stdout".to_string(), json!(output.stdout_text()));
            result.insert("stderr".to_string(), json!(output.stderr_text()));
            return Ok(result);
        }
        info!(entry, returncode = output.returncode(), "execution finished");
        Ok(object(json!({
            "success": output.success(),
            "stdout": output.stdout_text(),
            "stderr": output.stderr_text(),
            "returncode": output.returncode(),
        })))
    }
}
