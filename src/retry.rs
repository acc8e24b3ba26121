//! Bounded retries around remote calls.
//!
//! The caller runs an operation up to `max_attempts` times. Only transient
//! failures (rate limits, and timeouts when the policy allows it) are retried;
//! any other failure is returned immediately. Waiting goes through a
//! [`Sleeper`] so tests can observe delays without actually waiting.

use crate::error::RemoteError;
use crate::logging::StudyLogger;
use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Retry settings for one kind of remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Whether request timeouts count as transient
    pub retry_timeouts: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            retry_timeouts: false,
        }
    }

    pub fn with_timeout_retries(mut self, enabled: bool) -> Self {
        self.retry_timeouts = enabled;
        self
    }

    /// Lesson generation: 7 attempts, 5 seconds apart, rate limits only
    pub fn text_generation() -> Self {
        Self::new(7, Duration::from_secs(5))
    }

    /// Music generation: 3 attempts, 3 seconds apart, timeouts retried
    pub fn music_generation() -> Self {
        Self::new(3, Duration::from_secs(3)).with_timeout_retries(true)
    }
}

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    TimedOut,
    Terminal,
}

/// Errors that can tell the retry loop what kind of failure they are
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
}

impl Classify for RemoteError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            RemoteError::RateLimited { .. } => FailureKind::RateLimited,
            RemoteError::Timeout { .. } => FailureKind::TimedOut,
            _ => FailureKind::Terminal,
        }
    }
}

/// Terminal outcome of a retried call
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("rate limited on all {attempts} attempts: {last}")]
    RateLimited { attempts: u32, last: E },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("attempt {attempt} failed: {error}")]
    Terminal { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::RateLimited { attempts, .. } | RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Terminal { attempt, .. } => *attempt,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RetryError::RateLimited { .. })
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::RateLimited { last, .. } | RetryError::Exhausted { last, .. } => last,
            RetryError::Terminal { error, .. } => error,
        }
    }
}

/// Waiting capability used between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Runs fallible operations under a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryingCaller {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    logger: StudyLogger,
}

impl RetryingCaller {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>, logger: StudyLogger) -> Self {
        Self { policy, sleeper, logger }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails terminally, or runs out of attempts
    pub async fn call<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let kind = err.failure_kind();
            let retryable = match kind {
                FailureKind::RateLimited => true,
                FailureKind::TimedOut => self.policy.retry_timeouts,
                FailureKind::Terminal => false,
            };

            if !retryable {
                return Err(RetryError::Terminal { attempt, error: err });
            }

            if attempt >= max_attempts {
                return Err(match kind {
                    FailureKind::RateLimited => RetryError::RateLimited { attempts: attempt, last: err },
                    _ => RetryError::Exhausted { attempts: attempt, last: err },
                });
            }

            self.logger.log_retry(operation, attempt, max_attempts, self.policy.delay, &err.to_string());
            self.sleeper.sleep(self.policy.delay).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSleeper;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rate_limited() -> RemoteError {
        RemoteError::RateLimited { service: "Test".to_string() }
    }

    fn timeout() -> RemoteError {
        RemoteError::Timeout {
            service: "Test".to_string(),
            after: Duration::from_secs(120),
        }
    }

    fn make_caller(policy: RetryPolicy) -> (RetryingCaller, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let caller = RetryingCaller::new(policy, sleeper.clone(), StudyLogger::new());
        (caller, sleeper)
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_all_attempts() {
        let (caller, sleeper) = make_caller(RetryPolicy::new(3, Duration::from_secs(5)));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = caller
            .call("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(err.attempts(), 3);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let (caller, sleeper) = make_caller(RetryPolicy::new(3, Duration::from_secs(5)));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = caller
            .call("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::malformed("Test", "not json")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result.unwrap_err() {
            RetryError::Terminal { attempt, error } => {
                assert_eq!(attempt, 1);
                assert!(matches!(error, RemoteError::MalformedResponse { .. }));
            }
            other => panic!("Expected Terminal, got {:?}", other),
        }
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let (caller, sleeper) = make_caller(RetryPolicy::text_generation());
        let calls = AtomicU32::new(0);

        let result = caller
            .call("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(rate_limited())
                    } else {
                        Ok("lesson")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "lesson");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.recorded().len(), 2);
    }

    #[tokio::test]
    async fn test_timeouts_follow_policy() {
        let (caller, _) = make_caller(RetryPolicy::new(3, Duration::ZERO));
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = caller
            .call("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(timeout()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), RetryError::Terminal { .. }));

        let (caller, sleeper) = make_caller(RetryPolicy::music_generation());
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = caller
            .call("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(timeout()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result.unwrap_err(), RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(3); 2]);
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let (caller, sleeper) = make_caller(RetryPolicy::new(0, Duration::from_secs(1)));
        assert_eq!(caller.policy().max_attempts, 1);

        let calls = AtomicU32::new(0);
        let result: Result<(), _> = caller
            .call("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().is_rate_limited());
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_retries_are_logged() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let logger = StudyLogger::new();
        let caller = RetryingCaller::new(RetryPolicy::new(2, Duration::ZERO), sleeper, logger.clone());

        let _: Result<(), _> = caller.call("lesson", || async { Err(rate_limited()) }).await;

        assert_eq!(logger.get_event_statistics().retries, 1);
    }

    #[test]
    fn test_tokio_sleeper_zero_delay_and_success_path() {
        let caller = RetryingCaller::new(
            RetryPolicy::music_generation(),
            Arc::new(TokioSleeper),
            StudyLogger::new(),
        );
        let value: Result<u32, RetryError<RemoteError>> =
            tokio_test::block_on(caller.call("music", || async { Ok(7) }));
        assert_eq!(value.unwrap(), 7);

        tokio_test::block_on(TokioSleeper.sleep(Duration::ZERO));
    }
}
