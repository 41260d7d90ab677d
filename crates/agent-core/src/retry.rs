//! Retry logic with exponential backoff
//!
//! [`BackoffInvoker`] runs an async call under a [`RetryPolicy`]. Which
//! failures are worth retrying is decided by the error type itself through the
//! [`Classify`] trait, so the classification lives at the boundary with the
//! remote service rather than in this generic helper.

use crate::{Error, Result};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Whether a failure may succeed on a later attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rate limiting, server-side or network failure
    Retryable,
    /// Malformed request, bad credentials and similar
    Fatal,
}

/// Classification of an error for retry purposes
pub trait Classify {
    /// Kind of this error
    fn kind(&self) -> ErrorKind;

    /// Shorthand for `kind() == ErrorKind::Retryable`
    fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        }
    }

    /// Check the policy invariants
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidPolicy(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::InvalidPolicy(
                "initial_delay must be positive".to_string(),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::InvalidPolicy(format!(
                "max_delay ({:?}) must not be smaller than initial_delay ({:?})",
                self.max_delay, self.initial_delay
            )));
        }
        Ok(())
    }

    /// Delay that follows `current`: doubled, capped at `max_delay`
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }

    /// The delays slept between consecutive attempts, in order
    ///
    /// Yields `max_attempts - 1` values, since nothing is slept after the
    /// final attempt.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let first = self.initial_delay.min(self.max_delay);
        std::iter::successors(Some(first), move |delay| Some(self.next_delay(*delay)))
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// Failure of a call run through [`BackoffInvoker`]
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    #[error("{operation} gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Name of the operation
        operation: String,
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: E,
    },

    /// An attempt failed with a non-retryable error
    #[error("{operation} failed on attempt {attempt}: {error}")]
    Fatal {
        /// Name of the operation
        operation: String,
        /// Attempt that failed
        attempt: u32,
        /// The fatal error
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Fatal { attempt, .. } => *attempt,
        }
    }

    /// The underlying error of the last attempt
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::Fatal { error, .. } => error,
        }
    }
}

/// Executes remote calls with bounded exponential-backoff retry
///
/// The invoker holds no state; the policy is passed per call so that
/// different operations can use different limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackoffInvoker;

impl BackoffInvoker {
    /// Create a new invoker
    pub fn new() -> Self {
        Self
    }

    /// Execute an async operation with retry logic
    ///
    /// # Arguments
    ///
    /// * `operation` - Name of the operation (for logging and errors)
    /// * `policy` - Attempt and delay limits
    /// * `call` - Produces one attempt of the operation
    ///
    /// # Returns
    ///
    /// The first successful response. Fatal errors are returned at once
    /// without consuming the remaining attempts.
    pub async fn invoke<F, Fut, T, E>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        mut call: F,
    ) -> std::result::Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Classify + Display,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut delay = policy.initial_delay.min(policy.max_delay);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(operation, attempt, max_attempts, "Attempting call");

            let error = match call().await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Call succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            if error.kind() == ErrorKind::Fatal {
                warn!(operation, attempt, %error, "Call failed with non-retryable error");
                return Err(RetryError::Fatal {
                    operation: operation.to_string(),
                    attempt,
                    error,
                });
            }

            if attempt >= max_attempts {
                warn!(operation, attempts = attempt, %error, "Retries exhausted");
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last_error: error,
                });
            }

            warn!(
                operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                %error,
                "Call failed, retrying"
            );
            sleep(delay).await;
            delay = policy.next_delay(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Error, Debug)]
    enum TestError {
        #[error("server busy")]
        Busy,
        #[error("malformed request")]
        Malformed,
    }

    impl Classify for TestError {
        fn kind(&self) -> ErrorKind {
            match self {
                Self::Busy => ErrorKind::Retryable,
                Self::Malformed => ErrorKind::Fatal,
            }
        }
    }

    /// Call that fails with `Busy` until attempt `succeed_on`
    fn flaky(
        count: Arc<AtomicU32>,
        succeed_on: u32,
    ) -> impl FnMut() -> std::future::Ready<std::result::Result<&'static str, TestError>> {
        move || {
            let attempt = count.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt >= succeed_on {
                std::future::ready(Ok("done"))
            } else {
                std::future::ready(Err(TestError::Busy))
            }
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_policies() {
        let zero_attempts = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(1));
        assert!(matches!(
            zero_attempts.validate(),
            Err(Error::InvalidPolicy(_))
        ));

        let zero_delay = RetryPolicy::new(3, Duration::ZERO, Duration::from_secs(1));
        assert!(zero_delay.validate().is_err());

        let inverted = RetryPolicy::new(3, Duration::from_secs(5), Duration::from_secs(1));
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_delay_sequence_doubles_and_caps() {
        let policy = RetryPolicy::new(6, Duration::from_secs(1), Duration::from_secs(5));
        let delays: Vec<_> = policy.delays().collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
    }

    #[test]
    fn test_no_delays_for_single_attempt() {
        assert_eq!(RetryPolicy::no_retry().delays().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try_has_no_delay() {
        let count = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = BackoffInvoker::new()
            .invoke("generate", &RetryPolicy::default(), flaky(count.clone(), 1))
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_last_attempt() {
        for n in 1..=5 {
            let policy = RetryPolicy::new(n, Duration::from_millis(10), Duration::from_millis(50));
            let count = Arc::new(AtomicU32::new(0));

            let result = BackoffInvoker::new()
                .invoke("generate", &policy, flaky(count.clone(), n))
                .await;

            assert_eq!(result.unwrap(), "done");
            assert_eq!(count.load(Ordering::SeqCst), n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_waits_three_seconds() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(10));
        let count = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = BackoffInvoker::new()
            .invoke("generate", &policy, flaky(count.clone(), 3))
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_exactly_max_attempts() {
        let policy = RetryPolicy::new(4, Duration::from_secs(1), Duration::from_secs(2));
        let count = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = BackoffInvoker::new()
            .invoke("generate", &policy, flaky(count.clone(), u32::MAX))
            .await;

        match result {
            Err(RetryError::Exhausted {
                operation,
                attempts,
                last_error,
            }) => {
                assert_eq!(operation, "generate");
                assert_eq!(attempts, 4);
                assert!(matches!(last_error, TestError::Busy));
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
        assert_eq!(count.load(Ordering::SeqCst), 4);
        // 1 + 2 + 2, nothing after the last attempt
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        let result: std::result::Result<(), _> = BackoffInvoker::new()
            .invoke("generate", &RetryPolicy::default(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Malformed) }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Fatal { attempt: 1, .. }));
        assert_eq!(err.attempts(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_after_transient_keeps_attempt_count() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        let result: std::result::Result<(), _> = BackoffInvoker::new()
            .invoke("generate", &RetryPolicy::fast(), move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt == 1 {
                        Err(TestError::Busy)
                    } else {
                        Err(TestError::Malformed)
                    }
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 2);
        assert!(matches!(err.into_inner(), TestError::Malformed));
    }

    #[test]
    fn test_retry_error_converts_to_core_error() {
        let exhausted: RetryError<TestError> = RetryError::Exhausted {
            operation: "submit job".to_string(),
            attempts: 3,
            last_error: TestError::Busy,
        };
        let err: Error = exhausted.into();
        assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("submit job"));

        let fatal: RetryError<TestError> = RetryError::Fatal {
            operation: "submit job".to_string(),
            attempt: 1,
            error: TestError::Malformed,
        };
        assert!(matches!(Error::from(fatal), Error::Remote { .. }));
    }
}
