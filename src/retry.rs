//! Bounded exponential-backoff retry for remote calls.
//!
//! delay(attempt) = base * 2^attempt + jitter, jitter uniform in [0, 1) units.
//! Only errors for which [`crate::error::AgentError::is_transient`] holds are retried; the
//! executor gives up after `max_attempts` total attempts.

use crate::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Scale of the random jitter added to each delay
    pub jitter_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            jitter_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Deterministic part of the delay after the zero-based `attempt` failed.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
        self.base_backoff(attempt) + self.jitter_unit.mul_f64(jitter)
    }
}

/// Runs a remote call under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `call`, retrying transient failures with backoff.
    ///
    /// Permanent errors are returned immediately. When the ceiling is reached
    /// the last error is returned.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "Remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => {
                    return Err(err);
                }
                Err(err) => {
                    if attempt + 1 >= max_attempts {
                        warn!(
                            attempts = max_attempts,
                            "Retry ceiling reached, giving up: {}", err
                        );
                        return Err(err);
                    }

                    let delay = self.policy.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient remote failure, backing off: {}", err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
