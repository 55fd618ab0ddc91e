//! Tool interface and the lookup table the step executor dispatches through.
//!
//! Every tool receives the step payload merged with `conversation_id` and the
//! read-only `context` of earlier results, and returns a JSON object. Domain
//! outcomes (a syntax error, a failing test) are reported inside that object;
//! an `Err` means the tool could not do its job at all.

mod artifact_write;
mod code_execute;
mod code_generate;
mod code_validate;
mod github_writeback;
mod notebook_query;
mod research;
mod run_tests;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

pub use artifact_write::ArtifactWriteTool;
pub use code_execute::CodeExecuteTool;
pub use code_generate::{CodeGenerateTool, parse_generated_files};
pub use code_validate::CodeValidateTool;
pub use github_writeback::GithubWritebackTool;
pub use notebook_query::NotebookQueryTool;
pub use research::ResearchTool;
pub use run_tests::RunTestsTool;

use crate::core::capabilities::CapabilityRegistry;
use crate::core::types::{Action, Payload};
use crate::error::PipelineError;
use crate::io::cache::KnowledgeCache;
use crate::io::config::OrchestratorConfig;
use crate::io::gh::GithubApi;
use crate::providers::Generator;

pub trait Tool: Send + Sync {
    /// The action this tool is registered under.
    fn action(&self) -> Action;

    fn run(&self, input: &Payload) -> Result<Payload>;
}

/// Action to tool lookup table, built once at startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<Action, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` under its action, replacing any earlier registration.
    pub fn register(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.tools.insert(tool.action(), Box::new(tool));
        self
    }

    pub fn resolve(&self, action: Action) -> Result<&dyn Tool, PipelineError> {
        self.tools
            .get(&action)
            .map(|tool| tool.as_ref())
            .ok_or(PipelineError::MissingTool { action })
    }

    /// Enabled capabilities without a registered tool.
    pub fn missing(&self, capabilities: &CapabilityRegistry) -> Vec<Action> {
        capabilities
            .list_enabled()
            .into_iter()
            .filter(|action| !self.tools.contains_key(action))
            .collect()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.tools.keys().copied().collect()
    }
}

/// Registry with the built-in implementation of every action.
pub fn standard_registry(
    config: &OrchestratorConfig,
    cache: KnowledgeCache,
    generator: Arc<dyn Generator>,
    github: Arc<dyn GithubApi>,
) -> ToolRegistry {
    let exec = &config.execution;
    let mut registry = ToolRegistry::new();
    registry
        .register(ResearchTool::new(
            exec.research_command.clone(),
            exec.sandbox_timeout(),
            exec.output_limit_bytes,
            cache.clone(),
        ))
        .register(NotebookQueryTool::new(cache))
        .register(CodeGenerateTool::new(generator))
        .register(CodeValidateTool::new(
            exec.python.clone(),
            exec.sandbox_timeout(),
            exec.output_limit_bytes,
        ))
        .register(RunTestsTool::new(
            exec.test_command.clone(),
            exec.test_timeout(),
            exec.output_limit_bytes,
        ))
        .register(CodeExecuteTool::new(
            exec.python.clone(),
            exec.sandbox_timeout(),
            exec.output_limit_bytes,
        ))
        .register(ArtifactWriteTool::new(exec.artifacts_dir.clone()))
        .register(GithubWritebackTool::new(github, &config.github));
    registry
}

/// Non-blank string field.
pub(crate) fn str_field<'a>(input: &'a Payload, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub(crate) fn require_str<'a>(input: &'a Payload, key: &str, action: Action) -> Result<&'a str> {
    str_field(input, key).ok_or_else(|| anyhow!("{action} requires a non-empty '{key}'"))
}

pub(crate) fn u64_field(input: &Payload, key: &str) -> Option<u64> {
    input.get(key).and_then(Value::as_u64)
}

/// Tool result from a `json!` object literal.
pub(crate) fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

pub(crate) fn no_files(extra: Value) -> Payload {
    let mut result = object(json!({"error": "no files provided"}));
    result.extend(object(extra));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticTool;

    #[test]
    fn resolve_reports_missing_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::new(Action::Research, json!({"ok": true})));
        assert!(registry.resolve(Action::Research).is_ok());
        let err = registry.resolve(Action::RunTests).err().expect("missing");
        assert!(matches!(
            err,
            PipelineError::MissingTool {
                action: Action::RunTests
            }
        ));
    }

    #[test]
    fn missing_lists_enabled_capabilities_without_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::new(Action::Research, json!({})));
        let capabilities = CapabilityRegistry::from_flags([
            (Action::Research, true),
            (Action::CodeExecute, true),
            (Action::RunTests, false),
        ]);
        assert_eq!(registry.missing(&capabilities), vec![Action::CodeExecute]);
    }

    #[test]
    fn standard_registry_covers_every_action() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = KnowledgeCache::open(temp.path()).expect("cache");
        let registry = standard_registry(
            &OrchestratorConfig::default(),
            cache,
            Arc::new(crate::test_support::ScriptedGenerator::repeating(Vec::new())),
            Arc::new(crate::test_support::FakeGithub::default()),
        );
        assert_eq!(registry.actions(), Action::ALL.to_vec());
        assert!(
            registry
                .missing(&CapabilityRegistry::all_enabled())
                .is_empty()
        );
    }

    #[test]
    fn str_field_ignores_blank_values() {
        let input = object(json!({"a": "  ", "b": " x ", "c": 3}));
        assert_eq!(str_field(&input, "a"), None);
        assert_eq!(str_field(&input, "b"), Some("x"));
        assert_eq!(str_field(&input, "c"), None);
    }
}
