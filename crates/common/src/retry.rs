//! Bounded exponential backoff for retrying transient failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

/// Jittered exponential backoff policy for async operations.
///
/// `max_attempts` counts the first try, so a policy with `max_attempts = 1`
/// never retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    /// Creates a policy, clamping nonsensical inputs into range.
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let base_delay_ms = base_delay_ms.max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// A policy with no delay between attempts, for tests.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_pct: 0.0,
        }
    }

    /// Delay before the retry following `attempt` (zero-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt.min(32) as u32);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        let spread = (delay as f64 * self.jitter_pct) as i64;
        let jittered = if spread > 0 {
            let delta = rand::thread_rng().gen_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }

    /// Runs `op` until it succeeds, `should_retry` rejects the error, or the
    /// attempts are exhausted. The closure receives the zero-based attempt
    /// number.
    pub async fn retry_if<F, Fut, T, E, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !should_retry(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1);
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 50, 2_000, 0.2)
    }
}
