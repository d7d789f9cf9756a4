//! Bounded retry
//!
//! Fixed-delay retry around an async operation. Used for the connect
//! sequence only; protocol calls rely on the reconnect guard instead.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retry settings: `max_retries + 1` attempts with a fixed delay in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Total number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// The last failure is returned as-is. The delay is an ordinary tokio
    /// sleep, so aborting the surrounding task cancels the loop.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    tracing::error!(
                        operation,
                        attempts,
                        error = %e,
                        "all attempts failed"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                }
            }

            tokio::time::sleep(self.delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.delay, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_does_not_sleep() {
        let start = Instant::now();
        let result: Result<u32, String> = RetryPolicy::default().run("op", || async { Ok(7) }).await;

        assert_eq!(result, Ok(7));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once() {
        let calls = Cell::new(0);
        let result: Result<(), String> = RetryPolicy::new(0, Duration::from_secs(5))
            .run("op", || {
                calls.set(calls.get() + 1);
                async { Err("nope".to_string()) }
            })
            .await;

        assert_eq!(result, Err("nope".to_string()));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error() {
        let calls = Cell::new(0);
        let result: Result<(), String> = RetryPolicy::new(1, Duration::from_millis(10))
            .run("op", || {
                let n = calls.get() + 1;
                calls.set(n);
                async move { Err(format!("failure {n}")) }
            })
            .await;

        assert_eq!(result, Err("failure 2".to_string()));
    }
}
