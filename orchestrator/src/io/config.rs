//! Orchestrator configuration stored under `.orchestrator/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::capabilities::CapabilityRegistry;
use crate::core::types::Action;

pub const DEFAULT_CONFIG_PATH: &str = ".orchestrator/config.toml";

/// Orchestrator configuration (TOML).
///
/// Edited by humans and by `orchestrator capabilities`. Missing fields
/// default to values that work on a developer machine with `codex` and
/// `python3` on `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Action name to enabled flag. Names outside the vocabulary are rejected.
    pub capabilities: BTreeMap<String, bool>,
    pub providers: Vec<ProviderConfig>,
    pub router: RouterConfig,
    pub execution: ExecutionConfig,
    pub github: GithubConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    /// Program and arguments; the prompt is written to stdin.
    pub command: Vec<String>,
    /// Lower runs first.
    pub priority: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouterStrategy {
    /// Stop at the first provider that answers.
    #[default]
    Fallback,
    /// Ask every provider.
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouterConfig {
    pub strategy: RouterStrategy,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub cache_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    /// Interpreter used by `code_execute` and `code_validate`.
    pub python: Vec<String>,
    /// Run inside the scratch directory holding the files under test.
    pub test_command: Vec<String>,
    /// The query is appended as the final argument.
    pub research_command: Vec<String>,
    pub sandbox_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GithubConfig {
    pub default_branch: String,
    pub commit_message: String,
    /// Refuse writeback unless a passing `run_tests` result is in context.
    pub require_passing_tests: bool,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            capabilities: Action::ALL
                .into_iter()
                .map(|action| (action.as_str().to_string(), true))
                .collect(),
            providers: vec![ProviderConfig::default()],
            router: RouterConfig::default(),
            execution: ExecutionConfig::default(),
            github: GithubConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "codex".to_string(),
            command: argv(&["codex", "exec", "--skip-git-repo-check", "-"]),
            priority: 0,
            enabled: true,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: RouterStrategy::Fallback,
            timeout_secs: 5 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".orchestrator/knowledge_cache"),
            artifacts_dir: PathBuf::from(".orchestrator/artifacts"),
            python: argv(&["python3"]),
            test_command: argv(&["python3", "-m", "pytest", "-v"]),
            research_command: argv(&["ddgr", "--json", "--num", "5"]),
            sandbox_timeout_secs: 30,
            test_timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            commit_message: "automated update".to_string(),
            require_passing_tests: true,
        }
    }
}

impl ExecutionConfig {
    pub fn sandbox_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}

impl RouterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn require_command(field: &str, command: &[String]) -> Result<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("{field} must be a non-empty array")),
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        for name in self.capabilities.keys() {
            name.parse::<Action>()
                .with_context(|| format!("capabilities.{name}"))?;
        }

        let mut seen = BTreeMap::new();
        for (idx, provider) in self.providers.iter().enumerate() {
            if provider.name.trim().is_empty() {
                return Err(anyhow!("providers[{idx}].name must not be empty"));
            }
            if let Some(prev) = seen.insert(provider.name.as_str(), idx) {
                return Err(anyhow!(
                    "providers[{idx}].name '{}' duplicates providers[{prev}]",
                    provider.name
                ));
            }
            require_command(&format!("providers[{idx}].command"), &provider.command)?;
        }

        if self.router.timeout_secs == 0 {
            return Err(anyhow!("router.timeout_secs must be > 0"));
        }
        if self.router.output_limit_bytes == 0 {
            return Err(anyhow!("router.output_limit_bytes must be > 0"));
        }

        let exec = &self.execution;
        require_command("execution.python", &exec.python)?;
        require_command("execution.test_command", &exec.test_command)?;
        require_command("execution.research_command", &exec.research_command)?;
        if exec.sandbox_timeout_secs == 0 {
            return Err(anyhow!("execution.sandbox_timeout_secs must be > 0"));
        }
        if exec.test_timeout_secs == 0 {
            return Err(anyhow!("execution.test_timeout_secs must be > 0"));
        }
        if exec.output_limit_bytes == 0 {
            return Err(anyhow!("execution.output_limit_bytes must be > 0"));
        }
        if self.github.default_branch.trim().is_empty() {
            return Err(anyhow!("github.default_branch must not be empty"));
        }
        Ok(())
    }

    /// Capability registry described by the `capabilities` table.
    ///
    /// Actions missing from the table are disabled.
    pub fn capability_registry(&self) -> Result<CapabilityRegistry> {
        let flags = self
            .capabilities
            .iter()
            .map(|(name, enabled)| Ok((name.parse::<Action>()?, *enabled)))
            .collect::<Result<Vec<_>>>()?;
        Ok(CapabilityRegistry::from_flags(flags))
    }

    pub fn set_capability(&mut self, action: Action, enabled: bool) {
        self.capabilities
            .insert(action.as_str().to_string(), enabled);
    }

    /// Enabled providers ordered by `(priority, name)`.
    pub fn enabled_providers(&self) -> Vec<&ProviderConfig> {
        let mut providers: Vec<_> = self.providers.iter().filter(|p| p.enabled).collect();
        providers.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));
        providers
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
