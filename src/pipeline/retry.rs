//! Exponential backoff for completion requests.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::duration_ms;
use crate::error::{ChatError, ChatResult};

/// Retry schedule: `min(base_delay * 2^attempt, max_delay)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    /// Upper bound for any delay.
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of
/// retries.
///
/// `on_retry(retry_number, delay, &error)` is called before each wait.
/// Cancelling `cancel` aborts the running attempt or the wait.
///
/// # Errors
/// Returns the last error, or [`ChatError::Cancelled`].
pub async fn with_retry<T, F, Fut, N>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
    mut on_retry: N,
) -> ChatResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ChatResult<T>>,
    N: FnMut(u32, Duration, &ChatError),
{
    let mut attempt = 0;
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ChatError::Cancelled),
            result = operation(attempt) => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() || attempt >= policy.max_retries => return Err(err),
            Err(err) => err,
        };

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            attempt = attempt + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Request failed, retrying: {err}"
        );
        on_retry(attempt + 1, delay, &err);

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ChatError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use tokio::time::Instant;

    fn transient() -> ChatError {
        ChatError::Api {
            status: 503,
            message: "busy".to_string(),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<u128> = (0..6).map(|a| policy.delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
        assert_eq!(policy.delay_for(40), Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let attempts_at = Mutex::new(Vec::new());
        let mut notified = Vec::new();

        let result: ChatResult<()> = with_retry(
            &policy,
            &cancel,
            |_| {
                attempts_at.lock().unwrap().push(start.elapsed().as_millis());
                async { Err(transient()) }
            },
            |retry, delay, _| notified.push((retry, delay.as_millis())),
        )
        .await;

        assert!(matches!(result, Err(ChatError::Api { status: 503, .. })));
        assert_eq!(*attempts_at.lock().unwrap(), vec![0, 1000, 3000, 7000]);
        assert_eq!(notified, vec![(1, 1000), (2, 2000), (3, 4000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let result = with_retry(
            &policy,
            &cancel,
            |attempt| async move {
                if attempt < 2 { Err(transient()) } else { Ok(attempt) }
            },
            |_, _, _| {},
        )
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let calls = Mutex::new(0);
        let result: ChatResult<()> = with_retry(
            &policy,
            &cancel,
            |_| {
                *calls.lock().unwrap() += 1;
                async { Err(transient()) }
            },
            |_, _, _| {},
        )
        .await;
        assert!(matches!(result, Err(ChatError::Cancelled)));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_retried() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let result: ChatResult<()> = with_retry(
            &policy,
            &cancel,
            |_| {
                calls += 1;
                async { Err(ChatError::Cancelled) }
            },
            |_, _, _| {},
        )
        .await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls, 1);
    }
}
