//! Bounded exponential-backoff retry.
//!
//! The attempt number is handed to the operation so callers can log or
//! branch on it. Non-transient errors stop immediately; transient ones are
//! retried until the budget runs out.

use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::{BuildHasher, Hasher};
use std::time::Duration;

use statgraph_core::{GraphError, GraphResult, RetryConfig};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::store::ErrorClass;

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_SHIFT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }

    /// `base × 2^attempt`, less a random jitter of 1-4ms.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_SHIFT);
        let delay = self.base_delay.saturating_mul(factor);
        delay.saturating_sub(jitter())
    }

    /// Run `op` until it succeeds, fails non-transiently, exhausts the
    /// budget, or `cancel` fires.
    pub async fn run<T, F, Fut, C>(
        &self,
        cancel: &CancelToken,
        first_attempt: u32,
        classify: C,
        mut op: F,
    ) -> GraphResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = GraphResult<T>>,
        C: Fn(&GraphError) -> ErrorClass,
    {
        let mut attempt = first_attempt.max(1);

        loop {
            if cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(GraphError::Cancelled) => return Err(GraphError::Cancelled),
                Err(err) => err,
            };

            if classify(&err) == ErrorClass::NonTransient {
                return Err(GraphError::NonRetriable {
                    attempt,
                    source: Box::new(err),
                });
            }

            if attempt >= self.max_attempts {
                return Err(GraphError::AttemptsExceeded {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.backoff_delay(attempt);
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient graph error, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(GraphError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

fn jitter() -> Duration {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default(),
    );
    Duration::from_millis(1 + hasher.finish() % 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use statgraph_core::StoreError;

    fn always_transient(_: &GraphError) -> ErrorClass {
        ErrorClass::Transient
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_grows_and_subtracts_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_millis(20));
        for attempt in 1..=4 {
            let full = Duration::from_millis(20 * (1 << attempt));
            let delay = policy.backoff_delay(attempt);
            assert!(delay < full, "attempt {attempt}: {delay:?} should be below {full:?}");
            assert!(delay >= full - Duration::from_millis(4));
        }
    }

    #[test]
    fn test_backoff_saturates_at_zero() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        assert_eq!(policy.backoff_delay(3), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_always_transient_runs_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();

        let result: GraphResult<()> = fast_policy(4)
            .run(&CancelToken::new(), 1, always_transient, |attempt| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err(GraphError::Store(StoreError::new(format!("timeout on attempt {attempt}"))))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(GraphError::AttemptsExceeded { attempts, source }) => {
                assert_eq!(attempts, 4);
                assert_eq!(source.to_string(), "Store error: timeout on attempt 4");
            }
            other => panic!("expected AttemptsExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_transient_runs_once() {
        let calls = AtomicU32::new(0);

        let result: GraphResult<()> = fast_policy(5)
            .run(&CancelToken::new(), 1, |_| ErrorClass::NonTransient, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GraphError::Store(StoreError::new("malformed request"))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(GraphError::NonRetriable { attempt: 1, .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_calls() {
        let calls = AtomicU32::new(0);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result: GraphResult<()> = fast_policy(5)
            .run(&cancel, 1, always_transient, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(result, Err(GraphError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancelToken::new();
        let policy = RetryPolicy::new(5, Duration::from_secs(10));

        let seen = calls.clone();
        let trigger = cancel.clone();
        let result: GraphResult<()> = policy
            .run(&cancel, 1, always_transient, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                trigger.cancel();
                async { Err(GraphError::Store(StoreError::new("timeout"))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(GraphError::Cancelled)));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let value = fast_policy(5)
            .run(&CancelToken::new(), 1, always_transient, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(GraphError::Store(StoreError::new("busy")))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_attempt_counts_against_budget() {
        let calls = AtomicU32::new(0);

        let result: GraphResult<()> = fast_policy(3)
            .run(&CancelToken::new(), 2, always_transient, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GraphError::Store(StoreError::new("busy"))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(result, Err(GraphError::AttemptsExceeded { attempts: 3, .. })));
    }
}
