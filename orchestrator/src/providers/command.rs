use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use super::Provider;
use crate::io::config::ProviderConfig;
use crate::io::process::{ProcessRequest, run_captured};

/// Env var through which the sampling temperature reaches the provider command.
pub const TEMPERATURE_ENV: &str = "ORCHESTRATOR_TEMPERATURE";

/// Provider that spawns a configured command and feeds the prompt on stdin.
///
/// The completion is the command's stdout. A non-zero exit, a timeout or an
/// empty reply is a provider failure.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    name: String,
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandProvider {
    pub fn new(
        name: impl Into<String>,
        command: Vec<String>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            name: name.into(),
            command,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &ProviderConfig, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self::new(
            config.name.clone(),
            config.command.clone(),
            timeout,
            output_limit_bytes,
        )
    }
}

impl Provider for CommandProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(provider = %self.name, timeout_secs = self.timeout.as_secs()))]
    fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        info!("querying provider");
        let env = [(TEMPERATURE_ENV, temperature.to_string())];
        let mut request = ProcessRequest::new(&self.command, self.timeout, self.output_limit_bytes);
        request.stdin = Some(prompt.as_bytes());
        request.env = &env;

        let output =
            run_captured(&request).with_context(|| format!("run provider {}", self.name))?;
        if output.timed_out {
            warn!("provider timed out");
            return Err(anyhow!(
                "provider {} timed out after {:?}",
                self.name,
                self.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "provider failed");
            return Err(anyhow!(
                "provider {} failed with status {:?}: {}",
                self.name,
                output.status.code(),
                output.stderr_text().trim()
            ));
        }

        let text = output.stdout_text();
        if text.trim().is_empty() {
            return Err(anyhow!("provider {} returned no output", self.name));
        }
        debug!(bytes = text.len(), "provider answered");
        Ok(text)
    }
}
