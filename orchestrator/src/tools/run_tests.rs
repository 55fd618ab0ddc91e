use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, instrument};

use super::{Tool, no_files, object, u64_field};
use crate::core::types::{Action, Payload};
use crate::io::process::{ProcessRequest, run_captured};
use crate::io::workspace::{files_from_input, materialize};

/// Runs the configured test command in a scratch directory holding the files.
pub struct RunTestsTool {
    test_command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl RunTestsTool {
    pub fn new(test_command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            test_command,
            timeout,
            output_limit_bytes,
        }
    }
}

impl Tool for RunTestsTool {
    fn action(&self) -> Action {
        Action::RunTests
    }

    #[instrument(skip_all)]
    fn run(&self, input: &Payload) -> Result<Payload> {
        let files = files_from_input(input)?;
        if files.is_empty() {
            return Ok(no_files(json!({
                "passed": false,
                "output": "",
                "errors": "",
                "returncode": -1,
            })));
        }
        let timeout = u64_field(input, "timeout").map_or(self.timeout, Duration::from_secs);

        let scratch = tempfile::tempdir().context("create test directory")?;
        materialize(scratch.path(), &files)?;
        let mut request = ProcessRequest::new(&self.test_command, timeout, self.output_limit_bytes);
        request.workdir = Some(scratch.path());
        let output = run_captured(&request).context("run test command")?;

        let mut result = object(json!({
            "passed": output.success(),
            "output": output.stdout_text(),
            "errors": output.stderr_text(),
            "returncode": output.returncode(),
        }));
        if output.timed_out {
            result.insert(
                "error".to_string(),
                json!(format!("tests timed out after {}s", timeout.as_secs())),
            );
        }
        info!(passed = output.success(), files = files.len(), "tests finished");
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::Value;

    fn tool(script: &str) -> RunTestsTool {
        RunTestsTool::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(5),
            4096,
        )
    }

    #[test]
    fn runs_inside_directory_with_files() {
        let result = tool("cat test_a.txt; echo warn >&2")
            .run(&object(json!({"files": {"test_a.txt": "ok"}})))
            .expect("run");
        assert_eq!(
            Value::Object(result),
            json!({"passed": true, "output": "ok", "errors": "warn\n", "returncode": 0})
        );
    }

    #[test]
    fn failing_command_is_reported_not_raised() {
        let result = tool("exit 4")
            .run(&object(json!({"files": {"t.py": ""}})))
            .expect("run");
        assert_eq!(result["passed"], json!(false));
        assert_eq!(result["returncode"], json!(4));
    }

    #[test]
    fn payload_timeout_overrides_default() {
        let result = tool("sleep 5")
            .run(&object(json!({"files": {"t.py": ""}, "timeout": 0})))
            .expect("run");
        assert_eq!(result["passed"], json!(false));
        assert_eq!(result["error"], json!("tests timed out after 0s"));
    }

    #[test]
    fn no_files_is_reported() {
        let result = tool("true").run(&Payload::new()).expect("run");
        assert_eq!(result["error"], json!("no files provided"));
        assert_eq!(result["passed"], json!(false));
    }
}
