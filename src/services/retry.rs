use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::providers::ProviderError;

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("max retries exceeded after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Provider(ProviderError),
}

/// Wraps a provider call with bounded exponential backoff. Only transient
/// errors (network, timeout) are retried; everything else propagates on the
/// first attempt. Cumulative backoff is capped so a caller is never blocked
/// indefinitely.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_retries: u32,
    base_delay: Duration,
    max_total_backoff: Duration,
}

impl RetryExecutor {
    pub fn new(max_retries: u32, base_delay: Duration, max_total_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_total_backoff,
        }
    }

    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut slept = Duration::ZERO;
        let mut last_error = None;
        let mut attempts_made = 0;

        for attempt in 0..self.max_retries {
            attempts_made = attempt + 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "transient provider error, will retry"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(RetryError::Provider(e)),
            }

            // wait = base * 2^attempt, subject to the cumulative ceiling
            if attempt + 1 < self.max_retries {
                let wait = self.base_delay * 2u32.pow(attempt);
                if slept + wait > self.max_total_backoff {
                    break;
                }
                slept += wait;
                sleep(wait).await;
            }
        }

        let source = last_error.unwrap_or(ProviderError::Timeout);
        Err(RetryError::MaxRetriesExceeded {
            attempts: attempts_made,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor() -> RetryExecutor {
        RetryExecutor::new(3, Duration::from_millis(10), Duration::from_secs(15))
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_exactly_max_retries() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = executor()
            .execute("charge", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Timeout) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(RetryError::MaxRetriesExceeded { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn permanent_errors_fail_on_first_attempt() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = executor()
            .execute("charge", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Auth("bad key".to_string())) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Provider(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let attempts = AtomicU32::new(0);

        let result = executor()
            .execute("charge", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ProviderError::Timeout)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cumulative_backoff_is_capped() {
        // base 8s doubles to 16s on the second wait, which would blow the
        // 20s ceiling, so only two attempts run.
        let executor = RetryExecutor::new(5, Duration::from_secs(8), Duration::from_secs(20));
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute("charge", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Timeout) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(matches!(result, Err(RetryError::MaxRetriesExceeded { .. })));
    }
}
