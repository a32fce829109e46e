//! Bounded retry with exponential backoff for provider calls.
//!
//! Only errors for which `EngineError::is_retryable()` holds are retried;
//! everything else is returned on the first failure.

use crate::error::EngineError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let base = (self.initial_backoff_ms as f64 * exp).min(self.max_backoff_ms as f64);
        Duration::from_millis(base as u64)
    }
}

/// Run `f` until it succeeds, fails terminally, or the attempts run out
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("✓ {} succeeded after {} attempts", operation, attempt);
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                tracing::warn!("{} failed after {} attempts: {}", operation, attempt, e);
                return Err(e);
            }
            Err(e) => {
                let backoff = policy.backoff_for(attempt);
                // Up to 10% jitter so concurrent monitors don't retry in lockstep
                let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 10);
                let delay = backoff + Duration::from_millis(jitter_ms);

                tracing::warn!(
                    "Attempt {}/{} of {} failed: {}. Retrying in {}ms...",
                    attempt,
                    max_attempts,
                    operation,
                    e,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
        }
    }
}
