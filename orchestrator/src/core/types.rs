//! Shared deterministic types for the pipeline core.
//!
//! These types define the wire contracts between the planner, the step
//! executor and the tools. They carry no I/O and serialize deterministically.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::invariants::validate_plan_invariants;

/// Structured tool input and output: a JSON object.
pub type Payload = Map<String, Value>;

/// Closed vocabulary shared by plan actions, capabilities and tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Research,
    NotebookQuery,
    CodeGenerate,
    CodeValidate,
    RunTests,
    CodeExecute,
    ArtifactWrite,
    GithubWriteback,
}

impl Action {
    /// Every action, in the order the planner advertises them.
    pub const ALL: [Action; 8] = [
        Action::Research,
        Action::NotebookQuery,
        Action::CodeGenerate,
        Action::CodeValidate,
        Action::RunTests,
        Action::CodeExecute,
        Action::ArtifactWrite,
        Action::GithubWriteback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Research => "research",
            Action::NotebookQuery => "notebook_query",
            Action::CodeGenerate => "code_generate",
            Action::CodeValidate => "code_validate",
            Action::RunTests => "run_tests",
            Action::CodeExecute => "code_execute",
            Action::ArtifactWrite => "artifact_write",
            Action::GithubWriteback => "github_writeback",
        }
    }

    /// One-line description rendered into the planning prompt.
    pub fn description(self) -> &'static str {
        match self {
            Action::Research => "Web research for gathering information",
            Action::NotebookQuery => "Query the knowledge cache",
            Action::CodeGenerate => "Generate code files based on specification",
            Action::CodeValidate => "Validate code syntax",
            Action::RunTests => "Execute test suite",
            Action::CodeExecute => "Run code in isolated sandbox",
            Action::ArtifactWrite => "Write output files to disk",
            Action::GithubWriteback => "Write files to GitHub repository",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| anyhow!("unknown action '{s}'"))
    }
}

/// One `(action, payload)` pair naming a tool to invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: Action,
    #[serde(default)]
    pub payload: Payload,
}

impl Step {
    pub fn new(action: Action, payload: Payload) -> Self {
        Self { action, payload }
    }

    /// Step with an empty payload.
    pub fn bare(action: Action) -> Self {
        Self::new(action, Payload::new())
    }
}

/// Wire form of a plan before invariants are checked.
#[derive(Debug, Clone, Deserialize)]
struct PlanDocument {
    steps: Vec<Step>,
}

/// Validated, non-empty ordered sequence of steps.
///
/// Construction goes through [`Plan::new`] (or deserialization, which calls
/// it), so a `Plan` value always satisfies the plan invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlanDocument")]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        let errors = validate_plan_invariants(&steps);
        if !errors.is_empty() {
            bail!("plan invariant violations: {}", errors.join("; "));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.steps.iter().map(|step| step.action)
    }
}

impl TryFrom<PlanDocument> for Plan {
    type Error = anyhow::Error;

    fn try_from(doc: PlanDocument) -> Result<Self> {
        Plan::new(doc.steps)
    }
}

/// Results accumulated during one Step Executor run, keyed by action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    results: BTreeMap<Action, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, action: Action) -> bool {
        self.results.contains_key(&action)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub(crate) fn record(&mut self, action: Action, result: Value) {
        self.results.insert(action, result);
    }

    /// Read-only JSON view handed to tools as `context`.
    pub fn to_payload(&self) -> Payload {
        self.results
            .iter()
            .map(|(action, value)| (action.as_str().to_string(), value.clone()))
            .collect()
    }
}

/// Plan and results together, for trace output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionTrace {
    pub plan: Plan,
    pub results: ExecutionContext,
}
