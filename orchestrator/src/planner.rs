//! Instruction to validated [`Plan`].
//!
//! The planner never guesses: candidates are tried in the generator's order
//! and the first one that survives extraction, parsing, schema validation and
//! the plan invariants wins. A run with no surviving candidate is a
//! [`PipelineError::Planning`] listing why each candidate was rejected.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::capabilities::CapabilityRegistry;
use crate::core::extract::extract_json_body;
use crate::core::schema::PlanSchema;
use crate::core::types::Plan;
use crate::error::{PipelineError, render_chain};
use crate::io::prompt::PromptEngine;
use crate::providers::{Candidate, CandidateOutput, Generator};

pub const PLANNING_TEMPERATURE: f32 = 0.0;

pub struct Planner {
    generator: Arc<dyn Generator>,
    capabilities: Arc<CapabilityRegistry>,
    schema: PlanSchema,
    prompts: PromptEngine,
}

impl Planner {
    pub fn new(
        generator: Arc<dyn Generator>,
        capabilities: Arc<CapabilityRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            generator,
            capabilities,
            schema: PlanSchema::new()?,
            prompts: PromptEngine::new(),
        })
    }

    /// Planning prompt for `instruction`, advertising the enabled actions.
    pub fn prompt(&self, instruction: &str) -> Result<String> {
        self.prompts
            .render_planner(instruction, &self.capabilities.list_enabled())
            .context("render planning prompt")
    }

    #[instrument(skip_all)]
    pub fn plan(&self, instruction: &str) -> Result<Plan, PipelineError> {
        let prompt = self.prompt(instruction).map_err(|err| PipelineError::Planning {
            rejections: vec![render_chain(&*err)],
        })?;
        let candidates = self
            .generator
            .generate(&prompt, PLANNING_TEMPERATURE)
            .map_err(|err| PipelineError::Planning {
                rejections: vec![format!("generator: {}", render_chain(&*err))],
            })?;
        debug!(candidates = candidates.len(), "received candidates");
        self.select(&candidates)
    }

    /// First candidate that parses into a valid plan.
    pub fn select(&self, candidates: &[Candidate]) -> Result<Plan, PipelineError> {
        let mut rejections = Vec::new();
        for candidate in candidates {
            let text = match &candidate.output {
                CandidateOutput::Text(text) => text,
                CandidateOutput::Failed(error) => {
                    rejections.push(format!("{}: provider failed: {error}", candidate.provider));
                    continue;
                }
            };
            match self.parse_candidate(text) {
                Ok(plan) => {
                    info!(provider = %candidate.provider, steps = plan.len(), "plan accepted");
                    return Ok(plan);
                }
                Err(err) => {
                    let reason = render_chain(&*err);
                    warn!(provider = %candidate.provider, reason = %reason, "candidate rejected");
                    rejections.push(format!("{}: {reason}", candidate.provider));
                }
            }
        }
        if rejections.is_empty() {
            rejections.push("generator returned no candidates".to_string());
        }
        Err(PipelineError::Planning { rejections })
    }

    fn parse_candidate(&self, text: &str) -> Result<Plan> {
        let body = extract_json_body(text);
        let value: Value = serde_json::from_str(body).context("candidate is not valid JSON")?;
        self.schema.validate(&value)?;
        let plan: Plan = serde_json::from_value(value).context("candidate violates plan rules")?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Action;
    use crate::test_support::ScriptedGenerator;

    fn planner(candidates: Vec<Candidate>) -> (Planner, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator::repeating(candidates));
        let planner = Planner::new(
            generator.clone(),
            Arc::new(CapabilityRegistry::all_enabled()),
        )
        .expect("planner");
        (planner, generator)
    }

    #[test]
    fn first_valid_candidate_wins() {
        let (planner, generator) = planner(vec![
            Candidate::failed("down", "timeout"),
            Candidate::text("chatty", "I think you should research first."),
            Candidate::text(
                "good",
                "```json\n{\"steps\": [{\"action\": \"research\", \"payload\": {\"query\": \"x\"}}]}\n```",
            ),
            Candidate::text("late", r#"{"steps": [{"action": "run_tests"}]}"#),
        ]);
        let plan = planner.plan("find x").expect("plan");
        assert_eq!(plan.actions().collect::<Vec<_>>(), vec![Action::Research]);
        assert_eq!(generator.calls(), 1);
        assert_eq!(generator.temperatures(), vec![PLANNING_TEMPERATURE]);
    }

    #[test]
    fn rejects_out_of_vocabulary_and_empty_plans() {
        let (planner, _) = planner(vec![
            Candidate::text("a", r#"{"steps": []}"#),
            Candidate::text("b", r#"{"steps": [{"action": "delete_repo"}]}"#),
        ]);
        let rejections = match planner.plan("anything") {
            Err(PipelineError::Planning { rejections }) => rejections,
            other => panic!("expected planning error, got {other:?}"),
        };
        assert_eq!(rejections.len(), 2);
        assert!(rejections[0].starts_with("a: plan schema validation failed"));
        assert!(rejections[1].starts_with("b: plan schema validation failed"));
    }

    #[test]
    fn duplicate_actions_are_skipped() {
        let (planner, _) = planner(vec![
            Candidate::text(
                "dup",
                r#"{"steps": [{"action": "research"}, {"action": "research"}]}"#,
            ),
            Candidate::text("ok", r#"{"steps": [{"action": "code_validate"}]}"#),
        ]);
        let plan = planner.plan("anything").expect("plan");
        assert_eq!(plan.actions().collect::<Vec<_>>(), vec![Action::CodeValidate]);
    }

    #[test]
    fn no_candidates_is_a_planning_error() {
        let (planner, _) = planner(Vec::new());
        let err = planner.plan("anything").unwrap_err();
        assert!(err.to_string().contains("generator returned no candidates"));
    }

    #[test]
    fn same_candidates_give_same_plan() {
        let candidates = vec![Candidate::text(
            "p",
            r#"{"steps": [{"action": "code_generate", "payload": {"spec": "s"}}, {"action": "code_validate"}]}"#,
        )];
        let (planner, _) = planner(candidates.clone());
        assert_eq!(
            planner.select(&candidates).expect("plan"),
            planner.select(&candidates).expect("plan")
        );
    }

    #[test]
    fn prompt_lists_enabled_actions_only() {
        let generator = Arc::new(ScriptedGenerator::repeating(Vec::new()));
        let planner = Planner::new(
            generator,
            Arc::new(CapabilityRegistry::from_flags([(Action::RunTests, true)])),
        )
        .expect("planner");
        let prompt = planner.prompt("test it").expect("prompt");
        assert!(prompt.contains("- run_tests:"));
        assert!(!prompt.contains("- research:"));
    }
}
