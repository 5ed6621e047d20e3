//! Bounded retry with timeout for blocking collaborator calls.
//!
//! Every attempt runs on the blocking pool under a timeout. Transient
//! failures back off exponentially up to `max_backoff_ms`; anything else,
//! or the last attempt, is returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::AlertError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Per-attempt budget. A step that exceeds it fails closed.
    pub step_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            step_timeout_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Backoff after the given failed attempt (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run a blocking operation with timeout and bounded retry.
pub async fn run_blocking<T, F>(
    step: &'static str,
    policy: &RetryPolicy,
    op: F,
) -> Result<T, AlertError>
where
    T: Send + 'static,
    F: Fn() -> Result<T, AlertError> + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let call = Arc::clone(&op);
        let result = match tokio::time::timeout(
            policy.step_timeout(),
            tokio::task::spawn_blocking(move || call()),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(AlertError::TaskFailed(join.to_string())),
            Err(_) => Err(AlertError::Timeout {
                step,
                timeout_ms: policy.step_timeout_ms,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let backoff = policy.backoff_after(attempt);
                tracing::warn!(
                    step,
                    attempt,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "Step failed, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                if attempt > 1 {
                    tracing::warn!(step, attempts = attempt, error = %e, "Step failed after retries");
                }
                return Err(e);
            }
        }
    }
}
