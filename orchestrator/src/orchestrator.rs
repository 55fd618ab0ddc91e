//! One orchestration attempt (plan, then execute) under bounded retry.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::core::capabilities::CapabilityRegistry;
use crate::core::types::{ExecutionContext, ExecutionTrace};
use crate::error::PipelineError;
use crate::executor::StepExecutor;
use crate::gate::CapabilityGate;
use crate::io::cache::KnowledgeCache;
use crate::io::config::OrchestratorConfig;
use crate::io::gh::GhCli;
use crate::planner::Planner;
use crate::providers::{Generator, Router};
use crate::recovery::FailureRecovery;
use crate::tools::{ToolRegistry, standard_registry};

const DESCRIPTION_PREFIX_CHARS: usize = 50;

/// Plan, execute and recover. Shareable across threads; each call owns its
/// own execution context.
pub struct Orchestrator {
    planner: Planner,
    executor: StepExecutor,
    recovery: FailureRecovery,
}

impl Orchestrator {
    /// Fails if an enabled capability has no registered tool.
    pub fn new(
        generator: Arc<dyn Generator>,
        capabilities: CapabilityRegistry,
        tools: ToolRegistry,
    ) -> Result<Self> {
        let missing = tools.missing(&capabilities);
        if !missing.is_empty() {
            let names: Vec<_> = missing.iter().map(|action| action.as_str()).collect();
            bail!("enabled capabilities without a tool: {}", names.join(", "));
        }
        let capabilities = Arc::new(capabilities);
        Ok(Self {
            planner: Planner::new(generator, Arc::clone(&capabilities))?,
            executor: StepExecutor::new(CapabilityGate::new(capabilities), Arc::new(tools)),
            recovery: FailureRecovery,
        })
    }

    /// Production wiring: command providers, on-disk cache, `gh` for writeback.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        let generator: Arc<dyn Generator> = Arc::new(Router::from_config(config)?);
        let cache = KnowledgeCache::open(&config.execution.cache_dir)?;
        let tools = standard_registry(
            config,
            cache,
            Arc::clone(&generator),
            Arc::new(GhCli::default()),
        );
        Self::new(generator, config.capability_registry()?, tools)
            .context("wire orchestrator")
    }

    /// Plan and execute `instruction`, retrying the whole attempt once on failure.
    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub fn execute(
        &self,
        conversation_id: &str,
        instruction: &str,
    ) -> Result<ExecutionContext, PipelineError> {
        let description = describe(instruction);
        let context = self.recovery.retry(
            || self.attempt(conversation_id, instruction).map(|trace| trace.results),
            &description,
        )?;
        info!(results = context.len(), "instruction executed");
        Ok(context)
    }

    /// Single attempt without retry, returning the plan alongside the results.
    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub fn execute_with_plan(
        &self,
        conversation_id: &str,
        instruction: &str,
    ) -> Result<ExecutionTrace, PipelineError> {
        self.attempt(conversation_id, instruction)
    }

    fn attempt(
        &self,
        conversation_id: &str,
        instruction: &str,
    ) -> Result<ExecutionTrace, PipelineError> {
        let plan = self.planner.plan(instruction)?;
        let results = self.executor.execute(conversation_id, &plan)?;
        Ok(ExecutionTrace { plan, results })
    }
}

fn describe(instruction: &str) -> String {
    let prefix: String = instruction.chars().take(DESCRIPTION_PREFIX_CHARS).collect();
    format!("instruction execution: {prefix}...")
}
