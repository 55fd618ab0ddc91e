//! Prompt rendering for the generator.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::Action;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const CODE_GENERATE_TEMPLATE: &str = include_str!("prompts/code_generate.md");

#[derive(Debug, Clone, Serialize)]
struct ActionContext {
    name: &'static str,
    description: &'static str,
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        env.add_template("code_generate", CODE_GENERATE_TEMPLATE)
            .expect("code_generate template should be valid");
        Self { env }
    }

    /// Planning prompt advertising `actions` in the given order.
    pub fn render_planner(&self, instruction: &str, actions: &[Action]) -> Result<String> {
        let actions: Vec<_> = actions
            .iter()
            .map(|action| ActionContext {
                name: action.as_str(),
                description: action.description(),
            })
            .collect();
        let template = self.env.get_template("planner")?;
        Ok(template.render(context! {
            instruction => instruction.trim(),
            actions => actions,
        })?)
    }

    /// `context` is the pretty-printed JSON of earlier step results, if any.
    pub fn render_code_generate(
        &self,
        spec: &str,
        language: &str,
        context: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("code_generate")?;
        Ok(template.render(context! {
            spec => spec.trim(),
            language => language,
            context => context.map(str::trim).filter(|s| !s.is_empty()),
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_prompt_lists_only_given_actions() {
        let engine = PromptEngine::new();
        let prompt = engine
            .render_planner(
                "  write a csv parser  ",
                &[Action::CodeGenerate, Action::CodeValidate],
            )
            .expect("render");
        assert!(prompt.contains("- code_generate: Generate code files"));
        assert!(prompt.contains("- code_validate: Validate code syntax"));
        assert!(!prompt.contains("- github_writeback"));
        assert!(prompt.contains("\nwrite a csv parser\n"));
        assert!(prompt.contains(r#"{"steps": [{"action": "research""#));
    }

    #[test]
    fn code_prompt_omits_empty_context() {
        let engine = PromptEngine::new();
        let prompt = engine
            .render_code_generate("add two numbers", "python", Some("  "))
            .expect("render");
        assert!(prompt.starts_with("Generate python code"));
        assert!(!prompt.contains("Results of earlier steps"));
        assert!(prompt.contains("# FILE: filename.ext"));
    }
}
