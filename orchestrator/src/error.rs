//! Typed failure taxonomy for the pipeline.
//!
//! I/O plumbing (config, cache, processes, tools) reports `anyhow::Error`;
//! everything that crosses a pipeline stage boundary is a [`PipelineError`]
//! so callers can tell a rejected command from an exhausted retry.

use std::error::Error as StdError;

use thiserror::Error;

use crate::core::types::{Action, ExecutionContext};

/// Rejection at the command gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("only {allowed} command allowed, got: {received}")]
    NotAllowed {
        allowed: &'static str,
        received: String,
    },
    #[error("no instructions provided")]
    MissingInstructions,
}

/// Capability gate refusal for a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("capability not available: {action}")]
pub struct CapabilityDenied {
    pub action: Action,
}

/// Terminal failure after every attempt has been used.
#[derive(Debug, Error)]
#[error("failed {description} after {attempts} attempts:\n{}", .failures.join("\n"))]
pub struct RecoveryError {
    pub description: String,
    pub attempts: u32,
    /// One line per failed attempt, oldest first.
    pub failures: Vec<String>,
    #[source]
    pub last: Box<dyn StdError + Send + Sync>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// No generator candidate produced a schema-valid plan.
    #[error("no candidate produced a valid plan: {}", .rejections.join("; "))]
    Planning { rejections: Vec<String> },

    /// `step` is 1-based; `partial` holds results of the steps that completed.
    #[error("step {step} ({action}): capability not available")]
    Capability {
        action: Action,
        step: usize,
        partial: ExecutionContext,
    },

    #[error("step {step} ({action}) failed")]
    Tool {
        action: Action,
        step: usize,
        partial: ExecutionContext,
        #[source]
        source: anyhow::Error,
    },

    /// A planned action has no registered tool. This is a wiring bug.
    #[error("no tool registered for action '{action}'")]
    MissingTool { action: Action },

    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}

impl PipelineError {
    /// Results of steps that completed before the failure, if any.
    pub fn partial_context(&self) -> Option<&ExecutionContext> {
        match self {
            PipelineError::Capability { partial, .. } | PipelineError::Tool { partial, .. } => {
                Some(partial)
            }
            _ => None,
        }
    }
}

/// Render an error and its source chain on one line (`outer: inner: root`).
pub fn render_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn tool_error_keeps_source_chain() {
        let err = PipelineError::Tool {
            action: Action::CodeExecute,
            step: 2,
            partial: ExecutionContext::new(),
            source: anyhow!("sandbox exploded"),
        };
        assert_eq!(
            render_chain(&err),
            "step 2 (code_execute) failed: sandbox exploded"
        );
        assert!(err.partial_context().is_some());
    }

    #[test]
    fn capability_error_names_action_once() {
        let err = PipelineError::Capability {
            action: Action::GithubWriteback,
            step: 3,
            partial: ExecutionContext::new(),
        };
        assert_eq!(
            err.to_string(),
            "step 3 (github_writeback): capability not available"
        );
    }

    #[test]
    fn command_error_names_allowed_value() {
        let err = PipelineError::from(CommandError::NotAllowed {
            allowed: "EXECUTE",
            received: "DELETE".to_string(),
        });
        assert_eq!(err.to_string(), "only EXECUTE command allowed, got: DELETE");
        assert!(err.partial_context().is_none());
    }
}
