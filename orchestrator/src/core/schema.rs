//! Plan JSON Schema validation.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::{Validator, validator_for};
use serde_json::Value;

/// Wire contract between the planner and the step executor.
pub const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Compiled plan schema.
pub struct PlanSchema {
    validator: Validator,
}

impl PlanSchema {
    pub fn new() -> Result<Self> {
        let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
        let validator =
            validator_for(&schema).map_err(|err| anyhow!("invalid plan schema: {}", err))?;
        Ok(Self { validator })
    }

    /// Validate a parsed candidate, reporting every violation.
    pub fn validate(&self, instance: &Value) -> Result<()> {
        if self.validator.is_valid(instance) {
            return Ok(());
        }
        let messages = self
            .validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        bail!("plan schema validation failed: {}", messages.join("; "))
    }
}
