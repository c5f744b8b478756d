//! Bounded in-stage retry for the LLM and warehouse calls.
//!
//! The bus provides the outer retry loop across deliveries; this policy
//! only smooths over short-lived upstream hiccups inside one delivery.
//! Permanent errors are never retried.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::domain::{PipelineError, Result};

/// Exponential backoff with additive jitter and a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles each attempt after that
    pub base_delay: Duration,

    /// Upper bound of the uniform jitter added to each delay
    pub jitter: Duration,

    /// Budget for a single attempt
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Policy for vision model calls: 3 attempts, base 2 s, 250 ms jitter,
    /// 120 s per call.
    pub fn model() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            jitter: Duration::from_millis(250),
            attempt_timeout: Duration::from_secs(120),
        }
    }

    /// Policy for warehouse inserts: 5 attempts, base 1 s, 30 s per insert.
    pub fn warehouse() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            jitter: Duration::from_millis(250),
            attempt_timeout: Duration::from_secs(30),
        }
    }

    /// Delay before `attempt` (2-based; the first attempt has no delay).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);
        let jitter_ms = if self.jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64)
        };
        backoff + Duration::from_millis(jitter_ms)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// Each attempt is bounded by `attempt_timeout`; an expired attempt
    /// counts as transient. The last error is returned unchanged so its
    /// failure kind still drives the outer contract.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::DeadlineExceeded(format!(
                    "{} attempt {} exceeded {:?}",
                    operation, attempt, self.attempt_timeout
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt + 1);
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
