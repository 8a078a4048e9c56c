//! Retry with exponential backoff
//!
//! Activities wrap their external calls in this helper. Only errors the
//! error type marks retryable are retried; validation failures and schema
//! failures return immediately. Rate limiting backs off longer than plain
//! transient failures.

use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Hard ceiling on a single activity execution.
pub const ACTIVITY_TIMEOUT: Duration = Duration::from_secs(600);

/// Backoff schedule for retried operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    /// Extra factor applied when the failure was a rate limit
    pub rate_limit_factor: f64,
}

impl Default for RetryPolicy {
    /// Three attempts, 1s/4s backoff between them, jittered.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 4.0,
            rate_limit_factor: 4.0,
        }
    }
}

impl RetryPolicy {
    /// Fast schedule for tests.
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            rate_limit_factor: 1.0,
        }
    }
}

/// Run an operation under the retry policy.
pub async fn retry<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = policy.initial_delay;

    for attempt in 1..=policy.max_attempts {
        let outcome = match tokio::time::timeout(ACTIVITY_TIMEOUT, op()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Unavailable(format!(
                "activity '{}' timed out after {}s",
                operation,
                ACTIVITY_TIMEOUT.as_secs()
            ))),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let base = if matches!(e, Error::RateLimited(_)) {
                    delay.mul_f64(policy.rate_limit_factor)
                } else {
                    delay
                };
                let sleep = with_jitter(base);
                warn!(
                    operation,
                    attempt,
                    delay_ms = sleep.as_millis() as u64,
                    error = %e,
                    "Retryable failure, backing off"
                );
                tokio::time::sleep(sleep).await;
                delay = delay.mul_f64(policy.multiplier);
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("retry loop always returns")
}

/// Add up to 10% random jitter so synchronized workers fan out.
fn with_jitter(delay: Duration) -> Duration {
    let jitter_ms = delay.as_millis() as u64 / 10;
    if jitter_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
}
