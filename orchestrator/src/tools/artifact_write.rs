use std::path::PathBuf;

use anyhow::Result;
use serde_json::json;
use tracing::{info, instrument};

use super::{Tool, no_files, object, str_field};
use crate::core::types::{Action, Payload};
use crate::io::workspace::{files_from_input, materialize, safe_relative_path};

/// Writes files under the artifacts directory.
///
/// File names and `output_dir` must be relative and stay inside the
/// artifacts directory; each file is written atomically.
pub struct ArtifactWriteTool {
    artifacts_dir: PathBuf,
}

impl ArtifactWriteTool {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
        }
    }
}

impl Tool for ArtifactWriteTool {
    fn action(&self) -> Action {
        Action::ArtifactWrite
    }

    #[instrument(skip_all)]
    fn run(&self, input: &Payload) -> Result<Payload> {
        let files = files_from_input(input)?;
        if files.is_empty() {
            return Ok(no_files(json!({"success": false, "written": []})));
        }
        let output_dir = match str_field(input, "output_dir") {
            Some(dir) => self.artifacts_dir.join(safe_relative_path(dir)?),
            None => self.artifacts_dir.clone(),
        };
        for name in files.keys() {
            safe_relative_path(name)?;
        }

        let written: Vec<String> = materialize(&output_dir, &files)?
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        info!(count = written.len(), dir = %output_dir.display(), "artifacts written");
        Ok(object(json!({
            "success": true,
            "written": written,
            "output_dir": output_dir.display().to_string(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_files_under_output_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = ArtifactWriteTool::new(temp.path());
        let result = tool
            .run(&object(json!({
                "files": {"report.md": "# done\n", "data/out.json": "{}"},
                "output_dir": "run1",
            })))
            .expect("run");
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["written"].as_array().map(Vec::len), Some(2));
        assert_eq!(
            fs::read_to_string(temp.path().join("run1/data/out.json")).expect("read"),
            "{}"
        );
    }

    #[test]
    fn rejects_escaping_names_before_writing_anything() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = ArtifactWriteTool::new(temp.path().join("artifacts"));
        let err = tool
            .run(&object(json!({"files": {"a.txt": "a", "../b.txt": "b"}})))
            .unwrap_err();
        assert!(err.to_string().contains("escapes its directory"));
        assert!(!temp.path().join("artifacts/a.txt").exists());

        let err = tool
            .run(&object(json!({"files": {"a.txt": "a"}, "output_dir": "/tmp"})))
            .unwrap_err();
        assert!(err.to_string().contains("must be relative"));
    }

    #[test]
    fn no_files_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = ArtifactWriteTool::new(temp.path())
            .run(&Payload::new())
            .expect("run");
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["error"], json!("no files provided"));
    }
}
