//! Bounded exponential backoff for transient failures.

use super::CallScope;
use crate::config::RetryConfig;
use crate::errors::{CanvasError, CanvasErrorKind, CanvasResult};
use crate::observability::TracingHooks;
use std::future::Future;
use std::time::Duration;

/// Retry decision and wait schedule for one logical call.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl BackoffPolicy {
    /// Creates a new policy.
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    /// Creates a policy from retry configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.initial_backoff, config.max_backoff)
    }

    /// Maximum retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Upper bound for any single wait.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns true for statuses worth another attempt: 429, 500, 502, 503, 504.
    pub fn should_retry_status(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }

    /// Returns true if the failed attempt should be retried.
    ///
    /// Cancellation and deadline errors are never retried.
    pub fn should_retry(&self, error: &CanvasError) -> bool {
        if error.is_cancellation() || error.kind() == CanvasErrorKind::RetriesExhausted {
            return false;
        }
        match error.status_code() {
            Some(status) => Self::should_retry_status(status),
            None => error.is_retryable(),
        }
    }

    /// Wait before retry number `attempt + 1`: `min(initial * 2^attempt, max)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Wait after `error` on `attempt`, honouring a server Retry-After hint.
    fn delay_for(&self, attempt: u32, error: &CanvasError) -> Duration {
        match error.retry_after() {
            Some(secs) => Duration::from_secs(secs).min(self.max_backoff),
            None => self.backoff_for(attempt),
        }
    }

    /// Runs `operation` until it succeeds, fails terminally, or the retry
    /// budget runs out. The operation receives the zero-based attempt index.
    ///
    /// Waits between attempts observe `scope`; once it fires no further
    /// attempt is made and the cancellation is surfaced instead of the
    /// previous failure.
    pub async fn run_with_retry<F, Fut, T>(
        &self,
        scope: &CallScope,
        mut operation: F,
    ) -> CanvasResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = CanvasResult<T>>,
    {
        let mut attempt = 0;

        loop {
            let error = match scope.run(operation(attempt)).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !self.should_retry(&error) {
                return Err(error);
            }

            if attempt >= self.max_retries {
                if self.max_retries == 0 {
                    return Err(error);
                }
                return Err(CanvasError::retries_exhausted(error, attempt + 1));
            }

            let delay = self.delay_for(attempt, &error);
            TracingHooks::on_retry(error.path().unwrap_or("-"), attempt + 1, delay, &error);

            scope.sleep(delay).await?;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CanvasErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy::new(3, Duration::from_millis(1), Duration::from_millis(8))
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.backoff_for(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_for(4), Duration::from_secs(8));
        assert_eq!(policy.backoff_for(40), Duration::from_secs(8));
        assert!(policy.backoff_for(0) < policy.backoff_for(1));
        assert!(policy.backoff_for(1) < policy.backoff_for(2));
    }

    #[test]
    fn test_should_retry_status() {
        assert!(BackoffPolicy::should_retry_status(429));
        assert!(BackoffPolicy::should_retry_status(503));
        assert!(!BackoffPolicy::should_retry_status(404));
        assert!(!BackoffPolicy::should_retry_status(200));
        assert!(!BackoffPolicy::should_retry_status(501));
    }

    #[test]
    fn test_should_retry_errors() {
        let policy = BackoffPolicy::default();
        assert!(policy.should_retry(&CanvasError::from_response(429, "slow down")));
        assert!(!policy.should_retry(&CanvasError::from_response(404, "missing")));
        assert!(policy.should_retry(&CanvasError::new(CanvasErrorKind::ConnectionFailed, "reset")));
        assert!(!policy.should_retry(&CanvasError::cancelled()));
        assert!(!policy.should_retry(&CanvasError::deadline_exceeded()));
    }

    #[test]
    fn test_exhausted_error_not_retried_again() {
        let policy = BackoffPolicy::default();
        let wrapped = CanvasError::retries_exhausted(CanvasError::from_response(503, "busy"), 4);

        assert_eq!(wrapped.status_code(), Some(503));
        assert!(!policy.should_retry(&wrapped));
    }

    #[test]
    fn test_retry_after_capped() {
        let policy = BackoffPolicy::default();
        let error = CanvasError::from_response(429, "slow").with_retry_after(120);
        assert_eq!(policy.delay_for(0, &error), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .run_with_retry(&CallScope::new(), |_| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CanvasError::from_response(503, "busy"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_bounded_and_wrapped() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));

        let err = policy
            .run_with_retry(&CallScope::new(), |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CanvasError::from_response(500, "boom"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.kind(), CanvasErrorKind::RetriesExhausted);
        assert_eq!(err.attempts(), Some(4));
        assert_eq!(err.last_error().unwrap().status_code(), Some(500));
    }

    #[tokio::test]
    async fn test_terminal_error_returned_unchanged() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));

        let err = policy
            .run_with_retry(&CallScope::new(), |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CanvasError::from_response(404, "missing"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), CanvasErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_cancellation_never_retried() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let err = policy
                .run_with_retry(&CallScope::new(), |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(CanvasError::cancelled())
                    }
                })
                .await
                .unwrap_err();
            assert_eq!(err.kind(), CanvasErrorKind::Cancelled);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_surfaces_cancellation() {
        let policy = BackoffPolicy::new(3, Duration::from_secs(30), Duration::from_secs(30));
        let token = CancellationToken::new();
        let scope = CallScope::with_token(token.clone());
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = policy
            .run_with_retry(&scope, |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CanvasError::from_response(503, "busy"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), CanvasErrorKind::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let policy = BackoffPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        let err = policy
            .run_with_retry(&CallScope::new(), |_| async {
                Err::<(), _>(CanvasError::from_response(502, "gateway"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), CanvasErrorKind::BadGateway);
    }
}
