//! Test-only doubles for the generator, tools and GitHub.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::types::{Action, Payload, Plan, Step};
use crate::io::gh::{GithubApi, PutFile};
use crate::providers::{Candidate, Generator};
use crate::tools::Tool;

fn as_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("tool results must be JSON objects, got {other}"),
    }
}

/// Plan with one bare step per action.
pub fn plan_of(actions: &[Action]) -> Plan {
    Plan::new(actions.iter().copied().map(Step::bare).collect()).expect("valid test plan")
}

/// Plan JSON, one bare step per action, as a generator would emit it.
pub fn plan_json(actions: &[Action]) -> String {
    let steps: Vec<Value> = actions
        .iter()
        .map(|action| serde_json::json!({"action": action.as_str(), "payload": {}}))
        .collect();
    serde_json::json!({ "steps": steps }).to_string()
}

#[derive(Debug, Default)]
struct GeneratorLog {
    prompts: Vec<String>,
    temperatures: Vec<f32>,
}

/// Generator that replays scripted candidate lists.
///
/// Call `n` returns response `n`; once the script runs out the last response
/// repeats.
#[derive(Debug)]
pub struct ScriptedGenerator {
    responses: Vec<Vec<Candidate>>,
    calls: AtomicUsize,
    log: Mutex<GeneratorLog>,
}

impl ScriptedGenerator {
    pub fn sequence(responses: Vec<Vec<Candidate>>) -> Self {
        Self {
            responses,
            calls: AtomicUsize::new(0),
            log: Mutex::new(GeneratorLog::default()),
        }
    }

    pub fn repeating(candidates: Vec<Candidate>) -> Self {
        Self::sequence(vec![candidates])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.log.lock().expect("generator log").prompts.clone()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.log.lock().expect("generator log").temperatures.clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &str, temperature: f32) -> Result<Vec<Candidate>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut log = self.log.lock().expect("generator log");
            log.prompts.push(prompt.to_string());
            log.temperatures.push(temperature);
        }
        let response = self
            .responses
            .get(call)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        Ok(response)
    }
}

/// Tool that always returns the same result.
pub struct StaticTool {
    action: Action,
    result: Payload,
}

impl StaticTool {
    pub fn new(action: Action, result: Value) -> Self {
        Self {
            action,
            result: as_payload(result),
        }
    }
}

impl Tool for StaticTool {
    fn action(&self) -> Action {
        self.action
    }

    fn run(&self, _input: &Payload) -> Result<Payload> {
        Ok(self.result.clone())
    }
}

/// Tool that records every input it receives.
pub struct RecordingTool {
    action: Action,
    result: Payload,
    inputs: Arc<Mutex<Vec<Payload>>>,
}

impl RecordingTool {
    pub fn new(action: Action, result: Value) -> Self {
        Self {
            action,
            result: as_payload(result),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the recorded inputs; stays valid after the tool is registered.
    pub fn inputs(&self) -> Arc<Mutex<Vec<Payload>>> {
        Arc::clone(&self.inputs)
    }
}

impl Tool for RecordingTool {
    fn action(&self) -> Action {
        self.action
    }

    fn run(&self, input: &Payload) -> Result<Payload> {
        self.inputs
            .lock()
            .expect("recorded inputs")
            .push(input.clone());
        Ok(self.result.clone())
    }
}

/// Tool that fails a fixed number of times, then (optionally) succeeds.
pub struct FailingTool {
    action: Action,
    message: String,
    failures: usize,
    result: Payload,
    calls: Arc<AtomicUsize>,
}

impl FailingTool {
    /// Fails on every call.
    pub fn new(action: Action, message: &str) -> Self {
        Self::then_succeed(action, message, usize::MAX, Value::Object(Payload::new()))
    }

    pub fn then_succeed(action: Action, message: &str, failures: usize, result: Value) -> Self {
        Self {
            action,
            message: message.to_string(),
            failures,
            result: as_payload(result),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Tool for FailingTool {
    fn action(&self) -> Action {
        self.action
    }

    fn run(&self, _input: &Payload) -> Result<Payload> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(anyhow!("{}", self.message));
        }
        Ok(self.result.clone())
    }
}

/// One recorded contents API write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPut {
    pub repo: String,
    pub path: String,
    pub branch: String,
    pub message: String,
    pub content: String,
    pub sha: Option<String>,
}

/// In-memory GitHub with pre-existing file shas.
#[derive(Debug, Default)]
pub struct FakeGithub {
    existing: BTreeMap<String, String>,
    puts: Mutex<Vec<RecordedPut>>,
}

impl FakeGithub {
    pub fn with_existing<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            existing: files
                .into_iter()
                .map(|(path, sha)| (path.to_string(), sha.to_string()))
                .collect(),
            puts: Mutex::new(Vec::new()),
        }
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().expect("recorded puts").clone()
    }
}

impl GithubApi for FakeGithub {
    fn file_sha(&self, _repo: &str, path: &str, _branch: &str) -> Result<Option<String>> {
        Ok(self.existing.get(path).cloned())
    }

    fn put_file(&self, request: &PutFile<'_>) -> Result<()> {
        self.puts.lock().expect("recorded puts").push(RecordedPut {
            repo: request.repo.to_string(),
            path: request.path.to_string(),
            branch: request.branch.to_string(),
            message: request.message.to_string(),
            content: request.content.to_string(),
            sha: request.sha.map(str::to_string),
        });
        Ok(())
    }
}
