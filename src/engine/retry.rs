//! Centralized retry policy.
//!
//! Retries apply only to errors the taxonomy marks retryable (wrapped
//! upstream failures). Cancellations, budget errors, and validation
//! failures propagate immediately. Between attempts the policy sleeps on a
//! doubling schedule with additive random slack, so a burst of callers
//! failing against the same backend does not retry in lockstep.

use std::time::Duration;

/// Attempts the doubling schedule stops growing at; past this the delay is
/// pinned to the cap anyway.
const MAX_DOUBLINGS: u32 = 16;

/// Bounded retry loop parameterized by the error classifier in
/// [`crate::Error::is_retryable`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn no_retries() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay slept after the given failed attempt (1-based): the base
    /// doubles per failure up to the cap, plus up to a quarter of the
    /// scheduled delay in random slack.
    fn delay_after(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(MAX_DOUBLINGS);
        let scheduled = self
            .base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay);

        let slack_ms = scheduled.as_millis() as u64 / 4;
        if slack_ms == 0 {
            scheduled
        } else {
            scheduled + Duration::from_millis(rand::random_range(0..=slack_ms))
        }
    }

    /// Run the operation, retrying retryable failures up to the attempt
    /// bound with a growing delay between tries.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> crate::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = crate::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    let delay = self.delay_after(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(10))
    }
}
