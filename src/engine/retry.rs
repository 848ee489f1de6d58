//! Bounded retry for calls that leave the process.
//!
//! Every supervisor query and every delivery runs through [`RetryPolicy::run`]:
//! each attempt gets its own timeout, transient failures are retried after a
//! constant delay, and permanent failures (an absent process, a 4xx
//! rejection) return immediately.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::Retryable;

/// Attempts, spacing and per-attempt time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Pause between tries.
    pub delay: Duration,
    /// Budget for a single try.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(E::timed_out()),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && e.is_transient() => {
                    debug!(
                        operation = what,
                        attempt,
                        attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
