use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::{Tool, object, require_str, str_field};
use crate::core::types::{Action, Payload};
use crate::io::prompt::PromptEngine;
use crate::io::workspace::FileSet;
use crate::providers::{CandidateOutput, Generator};

const GENERATION_TEMPERATURE: f32 = 0.0;
const FILE_MARKER: &str = "# FILE:";

/// Code generation through the shared generator.
pub struct CodeGenerateTool {
    generator: Arc<dyn Generator>,
    prompts: PromptEngine,
}

impl CodeGenerateTool {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            prompts: PromptEngine::new(),
        }
    }
}

fn extension_for(language: &str) -> &'static str {
    match language.to_ascii_lowercase().as_str() {
        "python" | "py" => "py",
        "rust" | "rs" => "rs",
        "javascript" | "js" => "js",
        "typescript" | "ts" => "ts",
        "go" => "go",
        "json" => "json",
        "toml" => "toml",
        "shell" | "bash" | "sh" => "sh",
        _ => "txt",
    }
}

/// Split generator output on `# FILE: <name>` header lines.
///
/// Markdown fence lines are dropped. Output without any header becomes a
/// single `main.<ext>` file.
pub fn parse_generated_files(output: &str, language: &str) -> FileSet {
    let mut files = FileSet::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in output.lines() {
        if let Some(name) = line.strip_prefix(FILE_MARKER) {
            if let Some((name, lines)) = current.take() {
                files.insert(name, finish(&lines));
            }
            current = Some((name.trim().to_string(), Vec::new()));
        } else if line.trim_start().starts_with("```") {
            continue;
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some((name, lines)) = current {
        files.insert(name, finish(&lines));
    }
    files.retain(|name, _| !name.is_empty());

    if files.is_empty() {
        let body: Vec<&str> = output
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .collect();
        files.insert(format!("main.{}", extension_for(language)), finish(&body));
    }
    files
}

fn finish(lines: &[&str]) -> String {
    let joined = lines.join("\n");
    let mut text = joined.trim_start_matches('\n').trim_end().to_string();
    text.push('\n');
    text
}

impl Tool for CodeGenerateTool {
    fn action(&self) -> Action {
        Action::CodeGenerate
    }

    #[instrument(skip_all)]
    fn run(&self, input: &Payload) -> Result<Payload> {
        let spec = require_str(input, "spec", Action::CodeGenerate)?;
        let language = str_field(input, "language").unwrap_or("python");
        let context = match input.get("context") {
            Some(Value::Object(map)) if !map.is_empty() => Some(
                serde_json::to_string_pretty(map).context("serialize generation context")?,
            ),
            _ => None,
        };
        let prompt = self
            .prompts
            .render_code_generate(spec, language, context.as_deref())?;

        let candidates = self.generator.generate(&prompt, GENERATION_TEMPERATURE)?;
        let mut failures = Vec::new();
        for candidate in &candidates {
            match &candidate.output {
                CandidateOutput::Text(text) => {
                    let files = parse_generated_files(text, language);
                    info!(provider = %candidate.provider, files = files.len(), "code generated");
                    return Ok(object(json!({
                        "files": files,
                        "provider": candidate.provider,
                        "spec": spec,
                        "language": language,
                    })));
                }
                CandidateOutput::Failed(error) => {
                    failures.push(format!("{}: {error}", candidate.provider));
                }
            }
        }
        Err(anyhow!(
            "all providers failed to generate code: {}",
            if failures.is_empty() {
                "no candidates".to_string()
            } else {
                failures.join("; ")
            }
        ))
    }
}
