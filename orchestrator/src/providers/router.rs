use anyhow::{Result, bail};
use tracing::{debug, info, instrument, warn};

use super::{Candidate, CommandProvider, Generator, Provider};
use crate::error::render_chain;
use crate::io::config::{OrchestratorConfig, RouterStrategy};

/// Generator over an ordered list of providers.
pub struct Router {
    providers: Vec<Box<dyn Provider>>,
    strategy: RouterStrategy,
}

impl Router {
    /// Providers are queried in the order given.
    pub fn new(providers: Vec<Box<dyn Provider>>, strategy: RouterStrategy) -> Self {
        Self {
            providers,
            strategy,
        }
    }

    /// Router over the enabled providers, ordered by `(priority, name)`.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        let providers: Vec<Box<dyn Provider>> = config
            .enabled_providers()
            .into_iter()
            .map(|provider| {
                Box::new(CommandProvider::from_config(
                    provider,
                    config.router.timeout(),
                    config.router.output_limit_bytes,
                )) as Box<dyn Provider>
            })
            .collect();
        if providers.is_empty() {
            bail!("no enabled providers configured");
        }
        let router = Self::new(providers, config.router.strategy);
        info!(
            providers = ?router.provider_names(),
            strategy = ?router.strategy,
            "router configured"
        );
        Ok(router)
    }

    fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }
}

impl Generator for Router {
    #[instrument(skip_all, fields(strategy = ?self.strategy, providers = self.providers.len()))]
    fn generate(&self, prompt: &str, temperature: f32) -> Result<Vec<Candidate>> {
        if self.providers.is_empty() {
            bail!("no providers available");
        }
        let mut candidates = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            match provider.complete(prompt, temperature) {
                Ok(text) => {
                    debug!(provider = provider.name(), "candidate received");
                    candidates.push(Candidate::text(provider.name(), text));
                    if self.strategy == RouterStrategy::Fallback {
                        break;
                    }
                }
                Err(err) => {
                    let rendered = render_chain(&*err);
                    warn!(provider = provider.name(), error = %rendered, "provider failed");
                    candidates.push(Candidate::failed(provider.name(), rendered));
                }
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CandidateOutput;
    use anyhow::anyhow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        reply: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl Provider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or_else(|| anyhow!("{} is down", self.name))
        }
    }

    fn router(strategy: RouterStrategy, calls: &Arc<AtomicUsize>) -> Router {
        let fixed = |name, reply| {
            Box::new(Fixed {
                name,
                reply,
                calls: Arc::clone(calls),
            }) as Box<dyn Provider>
        };
        Router::new(
            vec![
                fixed("down", None),
                fixed("first", Some("one")),
                fixed("second", Some("two")),
            ],
            strategy,
        )
    }

    #[test]
    fn fallback_stops_at_first_success_and_records_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let candidates = router(RouterStrategy::Fallback, &calls)
            .generate("p", 0.0)
            .expect("generate");
        assert_eq!(
            candidates,
            vec![
                Candidate::failed("down", "down is down"),
                Candidate::text("first", "one"),
            ]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn all_queries_every_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let candidates = router(RouterStrategy::All, &calls)
            .generate("p", 0.0)
            .expect("generate");
        let texts: Vec<_> = candidates
            .iter()
            .filter_map(|candidate| match &candidate.output {
                CandidateOutput::Text(text) => Some(text.as_str()),
                CandidateOutput::Failed(_) => None,
            })
            .collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn from_config_requires_an_enabled_provider() {
        let mut config = OrchestratorConfig::default();
        for provider in &mut config.providers {
            provider.enabled = false;
        }
        assert!(Router::from_config(&config).is_err());

        let router = Router::from_config(&OrchestratorConfig::default()).expect("router");
        assert_eq!(router.provider_names(), vec!["codex"]);
    }
}
