//! Bounded retry for resource lookups
//!
//! Related resources are written by independent actors and reads may lag
//! behind writes for a short time, so every lookup is attempted a fixed number
//! of times with a fixed delay in between.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use super::Lookup;
use crate::error::Result;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Fixed attempt count and delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    /// At least one attempt is always made
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no delay
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Fetch something that may not exist yet
    ///
    /// `fetch` returns `Ok(None)` for "not found". Both not-found and errors
    /// are retried. When the attempts run out the outcome of the last attempt
    /// decides: not found becomes [`Lookup::NotYetCreated`], an error is
    /// returned as is.
    pub async fn lookup<T, F, Fut>(&self, what: &(dyn Display + Sync), mut fetch: F) -> Result<Lookup<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = fetch().await;
            let last = attempt >= self.attempts;
            match outcome {
                Ok(Some(found)) => return Ok(Lookup::Found(found)),
                Ok(None) if last => {
                    tracing::debug!(resource = %what, attempts = attempt, "resource not found");
                    return Ok(Lookup::NotYetCreated);
                }
                Err(e) if last => return Err(e),
                Ok(None) => {
                    tracing::debug!(resource = %what, attempt, "resource not found, retrying");
                }
                Err(e) => {
                    tracing::warn!(resource = %what, attempt, error = %e, "lookup failed, retrying");
                }
            }
            sleep(self.delay).await;
            attempt += 1;
        }
    }

    /// Run an operation until it succeeds or the attempts run out
    pub async fn run<T, F, Fut>(&self, what: &(dyn Display + Sync), mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(resource = %what, attempt, error = %e, "operation failed, retrying");
                }
            }
            sleep(self.delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdmissionError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
        assert_eq!(RetryPolicy::default().attempts, 3);
        assert_eq!(RetryPolicy::default().delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_lookup_found_after_lag() {
        let calls = &AtomicU32::new(0);
        let result = fast(3)
            .lookup(&"Cluster org/a1b2c", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok(if n < 2 { None } else { Some("cluster") })
            })
            .await
            .unwrap();

        assert_eq!(result, Lookup::Found("cluster"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_lookup_not_yet_created() {
        let calls = &AtomicU32::new(0);
        let result: Lookup<()> = fast(3)
            .lookup(&"Cluster org/a1b2c", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .await
            .unwrap();

        assert_eq!(result, Lookup::NotYetCreated);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_lookup_last_error_wins() {
        let calls = &AtomicU32::new(0);
        let result: Result<Lookup<()>> = fast(2)
            .lookup(&"Cluster org/a1b2c", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(AdmissionError::execution_failed(format!("attempt {n}")))
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "execution failed: attempt 1");
    }

    #[tokio::test]
    async fn test_lookup_not_found_after_error_is_not_yet_created() {
        let calls = &AtomicU32::new(0);
        let result: Lookup<()> = fast(2)
            .lookup(&"x", move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(AdmissionError::execution_failed("timeout")),
                    _ => Ok(None),
                }
            })
            .await
            .unwrap();
        assert_eq!(result, Lookup::NotYetCreated);
    }

    #[tokio::test]
    async fn test_run_retries_until_success() {
        let calls = &AtomicU32::new(0);
        let value = fast(3)
            .run(&"patch", move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(AdmissionError::execution_failed("conflict")),
                    _ => Ok(42),
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
