//! Command gate: the single entry point into the pipeline.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::types::{ExecutionContext, ExecutionTrace};
use crate::error::{CommandError, PipelineError};
use crate::orchestrator::Orchestrator;

pub const ALLOWED_COMMAND: &str = "EXECUTE";
pub const DEFAULT_CONVERSATION_ID: &str = "default";

fn default_conversation_id() -> String {
    DEFAULT_CONVERSATION_ID.to_string()
}

/// Inbound command payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_conversation_id")]
    pub conversation_id: String,
    #[serde(default)]
    pub instructions: String,
}

impl CommandPayload {
    pub fn execute(conversation_id: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            command: Some(ALLOWED_COMMAND.to_string()),
            conversation_id: conversation_id.into(),
            instructions: instructions.into(),
        }
    }
}

pub struct ControlPlane {
    orchestrator: Orchestrator,
}

impl ControlPlane {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Gate the payload, then run it with retry.
    pub fn handle(&self, payload: &CommandPayload) -> Result<ExecutionContext, PipelineError> {
        let instructions = admit(payload)?;
        self.orchestrator
            .execute(&payload.conversation_id, instructions)
    }

    /// Gate the payload, then run a single attempt and return the plan too.
    pub fn handle_with_trace(
        &self,
        payload: &CommandPayload,
    ) -> Result<ExecutionTrace, PipelineError> {
        let instructions = admit(payload)?;
        self.orchestrator
            .execute_with_plan(&payload.conversation_id, instructions)
    }
}

/// Check the command and return the instructions to run.
pub fn admit(payload: &CommandPayload) -> Result<&str, CommandError> {
    let command = payload.command.as_deref();
    if command != Some(ALLOWED_COMMAND) {
        let received = command.unwrap_or("<missing>").to_string();
        warn!(received = %received, "command rejected");
        return Err(CommandError::NotAllowed {
            allowed: ALLOWED_COMMAND,
            received,
        });
    }
    if payload.instructions.trim().is_empty() {
        warn!("command rejected: no instructions");
        return Err(CommandError::MissingInstructions);
    }
    info!(conversation_id = %payload.conversation_id, "command admitted");
    Ok(&payload.instructions)
}
