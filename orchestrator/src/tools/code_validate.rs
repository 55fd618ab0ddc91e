use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{Tool, object};
use crate::core::types::{Action, Payload};
use crate::io::process::{ProcessRequest, run_captured};
use crate::io::workspace::files_from_input;

/// Reads source on stdin; prints one JSON error object and exits 1 on a syntax error.
const PYTHON_CHECK: &str = r#"import ast, json, sys
source = sys.stdin.read()
try:
    ast.parse(source)
except SyntaxError as err:
    print(json.dumps({"line": err.lineno, "offset": err.offset, "error": err.msg or str(err)}))
    sys.exit(1)
"#;

/// Syntax check by file extension.
pub struct CodeValidateTool {
    python: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CodeValidateTool {
    pub fn new(python: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            python,
            timeout,
            output_limit_bytes,
        }
    }

    /// `Ok(None)` when valid, `Ok(Some(error))` on a syntax error.
    fn check(&self, name: &str, source: &str) -> Result<Option<Value>> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let error = match extension {
            "json" => serde_json::from_str::<Value>(source).err().map(|err| {
                json!({"line": err.line(), "offset": err.column(), "error": err.to_string()})
            }),
            "toml" => toml::from_str::<toml::Table>(source)
                .err()
                .map(|err| json!({"error": err.message()})),
            "py" => self.check_python(source)?,
            other => Some(json!({"error": format!("unsupported file type '.{other}'")})),
        };
        Ok(error.map(|mut error| {
            error["file"] = json!(name);
            error
        }))
    }

    fn check_python(&self, source: &str) -> Result<Option<Value>> {
        let mut argv = self.python.clone();
        argv.extend(["-c".to_string(), PYTHON_CHECK.to_string()]);
        let mut request = ProcessRequest::new(&argv, self.timeout, self.output_limit_bytes);
        request.stdin = Some(source.as_bytes());
        let output = run_captured(&request).context("run python syntax check")?;
        if output.timed_out {
            return Err(anyhow!("python syntax check timed out after {:?}", self.timeout));
        }
        match output.status.code() {
            Some(0) => Ok(None),
            Some(1) => {
                let reported = output.stdout_text();
                serde_json::from_str(reported.trim())
                    .map(Some)
                    .with_context(|| {
                        format!(
                            "python syntax check failed: {}",
                            output.stderr_text().trim()
                        )
                    })
            }
            code => Err(anyhow!(
                "python syntax check exited with {code:?}: {}",
                output.stderr_text().trim()
            )),
        }
    }
}

impl Tool for CodeValidateTool {
    fn action(&self) -> Action {
        Action::CodeValidate
    }

    #[instrument(skip_all)]
    fn run(&self, input: &Payload) -> Result<Payload> {
        let files = files_from_input(input)?;
        if files.is_empty() {
            return Ok(object(json!({
                "valid": false,
                "errors": [{"error": "no files provided"}],
            })));
        }

        let mut errors = Vec::new();
        for (name, source) in &files {
            if let Some(error) = self.check(name, source)? {
                errors.push(error);
            }
        }
        debug!(files = files.len(), errors = errors.len(), "validation finished");

        if errors.is_empty() {
            Ok(object(json!({"valid": true})))
        } else {
            Ok(object(json!({"valid": false, "errors": errors})))
        }
    }
}
