//! Sequential plan execution with capability gating.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ExecutionContext, Payload, Plan, Step};
use crate::error::PipelineError;
use crate::gate::CapabilityGate;
use crate::tools::ToolRegistry;

pub const CONVERSATION_ID_KEY: &str = "conversation_id";
pub const CONTEXT_KEY: &str = "context";

pub struct StepExecutor {
    gate: CapabilityGate,
    tools: Arc<ToolRegistry>,
}

/// Step payload plus the system keys. System keys win over payload keys.
pub fn tool_input(step: &Step, conversation_id: &str, context: &ExecutionContext) -> Payload {
    let mut input = step.payload.clone();
    input.insert(CONVERSATION_ID_KEY.to_string(), json!(conversation_id));
    input.insert(CONTEXT_KEY.to_string(), Value::Object(context.to_payload()));
    input
}

impl StepExecutor {
    pub fn new(gate: CapabilityGate, tools: Arc<ToolRegistry>) -> Self {
        Self { gate, tools }
    }

    /// Run every step in order, returning one context entry per step.
    ///
    /// The first failing step aborts the run; results gathered so far travel
    /// with the error and nothing later is dispatched.
    #[instrument(skip_all, fields(conversation_id = %conversation_id, steps = plan.len()))]
    pub fn execute(
        &self,
        conversation_id: &str,
        plan: &Plan,
    ) -> Result<ExecutionContext, PipelineError> {
        let mut context = ExecutionContext::new();
        for (idx, step) in plan.steps().iter().enumerate() {
            let position = idx + 1;
            let action = step.action;

            if self.gate.check(action).is_err() {
                return Err(PipelineError::Capability {
                    action,
                    step: position,
                    partial: context,
                });
            }
            let tool = self.tools.resolve(action)?;

            debug!(step = position, %action, "dispatching step");
            let input = tool_input(step, conversation_id, &context);
            match tool.run(&input) {
                Ok(result) => {
                    context.record(action, Value::Object(result));
                }
                Err(source) => {
                    warn!(step = position, %action, error = %format!("{source:#}"), "step failed");
                    return Err(PipelineError::Tool {
                        action,
                        step: position,
                        partial: context,
                        source,
                    });
                }
            }
        }
        info!(results = context.len(), "plan executed");
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capabilities::CapabilityRegistry;
    use crate::core::types::Action;
    use crate::test_support::{FailingTool, RecordingTool, StaticTool, plan_of};

    fn executor(registry: CapabilityRegistry, tools: ToolRegistry) -> StepExecutor {
        StepExecutor::new(
            CapabilityGate::new(Arc::new(registry)),
            Arc::new(tools),
        )
    }

    #[test]
    fn later_steps_see_earlier_results_and_system_keys_win() {
        let recorder = RecordingTool::new(Action::CodeValidate, json!({"valid": true}));
        let inputs = recorder.inputs();
        let mut tools = ToolRegistry::new();
        tools
            .register(StaticTool::new(Action::Research, json!({"count": 2})))
            .register(recorder);

        let mut payload = Payload::new();
        payload.insert("conversation_id".to_string(), json!("spoofed"));
        payload.insert("files".to_string(), json!({"a.json": "{}"}));
        let plan = Plan::new(vec![
            Step::bare(Action::Research),
            Step::new(Action::CodeValidate, payload),
        ])
        .expect("plan");

        let context = executor(CapabilityRegistry::all_enabled(), tools)
            .execute("conv-1", &plan)
            .expect("execute");
        assert_eq!(
            serde_json::to_value(&context).expect("encode"),
            json!({"research": {"count": 2}, "code_validate": {"valid": true}})
        );

        let seen = inputs.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["conversation_id"], json!("conv-1"));
        assert_eq!(seen[0]["context"], json!({"research": {"count": 2}}));
        assert_eq!(seen[0]["files"], json!({"a.json": "{}"}));
    }

    #[test]
    fn disabled_capability_stops_before_dispatch() {
        let first = RecordingTool::new(Action::Research, json!({}));
        let first_calls = first.inputs();
        let third = RecordingTool::new(Action::RunTests, json!({}));
        let third_calls = third.inputs();
        let mut tools = ToolRegistry::new();
        tools
            .register(first)
            .register(StaticTool::new(Action::CodeExecute, json!({})))
            .register(third);
        let registry = CapabilityRegistry::from_flags([
            (Action::Research, true),
            (Action::CodeExecute, false),
            (Action::RunTests, true),
        ]);

        let plan = plan_of(&[Action::Research, Action::CodeExecute, Action::RunTests]);
        let err = executor(registry, tools)
            .execute("c", &plan)
            .unwrap_err();

        match err {
            PipelineError::Capability {
                action,
                step,
                partial,
            } => {
                assert_eq!(action, Action::CodeExecute);
                assert_eq!(step, 2);
                assert_eq!(partial.len(), 1);
                assert!(partial.contains(Action::Research));
            }
            other => panic!("expected capability error, got {other:?}"),
        }
        assert_eq!(first_calls.lock().expect("lock").len(), 1);
        assert!(third_calls.lock().expect("lock").is_empty());
    }

    #[test]
    fn tool_error_keeps_source_and_partial_context() {
        let mut tools = ToolRegistry::new();
        tools
            .register(StaticTool::new(Action::CodeGenerate, json!({"files": {}})))
            .register(FailingTool::new(Action::CodeExecute, "sandbox unavailable"));
        let plan = plan_of(&[Action::CodeGenerate, Action::CodeExecute]);

        let err = executor(CapabilityRegistry::all_enabled(), tools)
            .execute("c", &plan)
            .unwrap_err();
        assert_eq!(
            crate::error::render_chain(&err),
            "step 2 (code_execute) failed: sandbox unavailable"
        );
        assert_eq!(err.partial_context().map(ExecutionContext::len), Some(1));
    }

    #[test]
    fn enabled_action_without_tool_is_loud() {
        let plan = plan_of(&[Action::NotebookQuery]);
        let err = executor(CapabilityRegistry::all_enabled(), ToolRegistry::new())
            .execute("c", &plan)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingTool {
                action: Action::NotebookQuery
            }
        ));
    }
}
