//! Retry loop: run an async operation until it succeeds or the session ends.

use std::fmt;
use std::future::Future;

use super::classify::{classify, Classified};
use super::error::{Failure, RetryError};
use super::policy::{RetryOptions, SessionPolicy};
use super::scheduler::{BackoffScheduler, Scheduler};

/// Run `operation` with the default exponential backoff scheduler.
///
/// `operation` receives the 1-based attempt number. The returned future
/// resolves with the first successful value or with exactly one
/// [`RetryError`].
pub async fn retry<T, E, F, Fut>(
    operation: F,
    options: RetryOptions<E>,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
    E: fmt::Display + Send + 'static,
{
    let policy = options.resolve();
    let scheduler = BackoffScheduler::new(&policy.backoff, policy.retries);
    run_resolved(operation, policy, scheduler).await
}

/// Run `operation` with an injected scheduler.
///
/// Timing options in `options` are ignored; `scheduler` alone decides delays
/// and whether another attempt is permitted.
pub async fn retry_with_scheduler<T, E, F, Fut, S>(
    operation: F,
    options: RetryOptions<E>,
    scheduler: S,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
    E: fmt::Display + Send + 'static,
    S: Scheduler<E>,
{
    run_resolved(operation, options.resolve(), scheduler).await
}

/// One session: races the attempt loop against the cancellation signal and
/// cancels the scheduler on every exit path.
async fn run_resolved<T, E, F, Fut, S>(
    mut operation: F,
    policy: SessionPolicy<E>,
    mut scheduler: S,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
    E: fmt::Display + Send + 'static,
    S: Scheduler<E>,
{
    let outcome = match policy.signal.clone() {
        Some(signal) => {
            if let Some(reason) = signal.reason() {
                tracing::warn!(reason = %reason, "retry cancelled before first attempt");
                Err(RetryError::Cancelled(reason))
            } else {
                tokio::select! {
                    biased;
                    reason = signal.cancelled() => {
                        tracing::warn!(reason = %reason, "retry cancelled");
                        Err(RetryError::Cancelled(reason))
                    }
                    outcome = run_session(&mut operation, &policy, &mut scheduler) => outcome,
                }
            }
        }
        None => run_session(&mut operation, &policy, &mut scheduler).await,
    };

    scheduler.cancel();
    outcome
}

async fn run_session<T, E, F, Fut, S>(
    operation: &mut F,
    policy: &SessionPolicy<E>,
    scheduler: &mut S,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
    E: fmt::Display + Send + 'static,
    S: Scheduler<E>,
{
    let mut attempt_number = 1u32;
    loop {
        let delay = scheduler.schedule_next(attempt_number);
        if !delay.is_zero() {
            tracing::debug!(
                attempt = attempt_number,
                delay_ms = delay.as_millis() as u64,
                "waiting before next attempt"
            );
            tokio::time::sleep(delay).await;
        }

        tracing::debug!(attempt = attempt_number, "starting attempt");
        let failure = match operation(attempt_number).await {
            Ok(value) => {
                if attempt_number > 1 {
                    tracing::info!(attempt = attempt_number, "succeeded after retry");
                } else {
                    tracing::debug!("succeeded on first attempt");
                }
                return Ok(value);
            }
            Err(failure) => failure,
        };

        let retries_left = policy.retries_left(attempt_number);
        let classified = classify(failure, &*policy.network_classifier);
        tracing::warn!(
            attempt = attempt_number,
            retries_left,
            kind = classified.label(),
            retryable = classified.is_retryable(),
            "attempt failed"
        );

        let cause = match classified {
            Classified::Transient(cause) | Classified::NetworkType(cause) => cause,
            Classified::NonError(value) => {
                return Err(RetryError::NonError {
                    value,
                    attempt_number,
                    retries_left,
                })
            }
            Classified::AbortRequested(source) => {
                return Err(RetryError::Aborted {
                    source,
                    attempt_number,
                    retries_left,
                })
            }
            Classified::Programmer(source) => {
                return Err(RetryError::Programmer {
                    source,
                    attempt_number,
                    retries_left,
                })
            }
        };

        policy.evaluate(scheduler, cause, attempt_number).await?;
        attempt_number += 1;
    }
}
