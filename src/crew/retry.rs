//! Retry loop for backend calls.
//!
//! Only retryable [`BackendError`](crate::errors::BackendError)s trigger another
//! attempt; every other task error is returned immediately. Waiting between
//! attempts stops early if the run is cancelled, yielding [`TaskError::Cancelled`].

use crate::errors::TaskError;
use crate::graph::RetryPolicy;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of a retried operation together with the attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, TaskError>,
    pub attempts: u32,
}

fn should_retry(error: &TaskError) -> bool {
    matches!(error, TaskError::Backend(e) if e.is_retryable())
}

/// Run `operation` until it succeeds, fails permanently, or the policy is exhausted.
///
/// `operation` receives the 1-based attempt number. `on_retry` is called with the
/// upcoming attempt number and the error that caused the retry.
pub async fn retry_with_policy<T, F, Fut, R>(
    task_id: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
    mut on_retry: R,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
    R: FnMut(u32, &TaskError),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = operation(attempt).await;
        let error = match result {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(error) => error,
        };

        if attempt >= max_attempts || !should_retry(&error) {
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
            };
        }

        let delay = policy.delay_for(attempt);
        warn!(
            task = task_id,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Task attempt failed, retrying"
        );
        on_retry(attempt + 1, &error);

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(task = task_id, attempt, error = %error, "Run cancelled during retry backoff");
                return RetryOutcome {
                    result: Err(TaskError::Cancelled),
                    attempts: attempt,
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
