//! Generation capability: prompt in, ordered candidate outputs out.
//!
//! The pipeline only sees [`Generator`]. [`Router`] is the production
//! generator built from configured [`CommandProvider`]s; tests use scripted
//! generators that return predetermined candidates without spawning processes.

mod command;
mod router;

pub use command::CommandProvider;
pub use router::Router;

use anyhow::Result;

/// One provider's answer to a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub provider: String,
    pub output: CandidateOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutput {
    Text(String),
    /// The provider failed; the message is kept for rejection reports.
    Failed(String),
}

impl Candidate {
    pub fn text(provider: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            output: CandidateOutput::Text(text.into()),
        }
    }

    pub fn failed(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            output: CandidateOutput::Failed(error.into()),
        }
    }
}

/// Produces candidates in a fixed priority order.
///
/// `Err` means the generator could not be consulted at all; individual
/// provider failures are reported as [`CandidateOutput::Failed`].
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str, temperature: f32) -> Result<Vec<Candidate>>;
}

/// A single text-completion backend.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}
