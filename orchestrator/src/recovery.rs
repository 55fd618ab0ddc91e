//! Bounded retry around one full orchestration attempt.
//!
//! The attempt is opaque: planning and execution are retried together, so a
//! retry always replans from scratch. Retries are immediate (no backoff).

use std::error::Error as StdError;

use tracing::{info, warn};

use crate::error::{RecoveryError, render_chain};

/// Maximum number of invocations of an attempt.
pub const MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct FailureRecovery;

/// Bookkeeping for one `retry` call.
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    failures: Vec<String>,
}

impl FailureRecovery {
    /// True when another attempt may follow attempt number `attempt` (1-indexed).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < MAX_RETRIES
    }

    /// Invoke `attempt_fn` up to [`MAX_RETRIES`] times.
    ///
    /// Returns the first success. Once the limit is reached the latest error
    /// becomes the source of a [`RecoveryError`] that records every failure.
    pub fn retry<T, E, F>(&self, mut attempt_fn: F, description: &str) -> Result<T, RecoveryError>
    where
        F: FnMut() -> Result<T, E>,
        E: StdError + Send + Sync + 'static,
    {
        let mut state = RetryState::default();
        loop {
            state.attempt += 1;
            let err = match attempt_fn() {
                Ok(value) => {
                    if state.attempt > 1 {
                        info!(attempt = state.attempt, description, "attempt recovered");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let rendered = render_chain(&err);
            warn!(attempt = state.attempt, max = MAX_RETRIES, error = %rendered, "attempt failed");
            state
                .failures
                .push(format!("attempt {}: {}", state.attempt, rendered));

            if !self.should_retry(state.attempt) {
                return Err(RecoveryError {
                    description: description.to_string(),
                    attempts: state.attempt,
                    failures: state.failures,
                    last: Box::new(err),
                });
            }
        }
    }
}
