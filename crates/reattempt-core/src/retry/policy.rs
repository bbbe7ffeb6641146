//! Retry options and the per-failure policy evaluation.
//!
//! `RetryOptions` is what callers build; every field is optional. At session
//! start `resolve` merges it with the named defaults into an immutable
//! `SessionPolicy`, which then judges each retryable failure.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};

use super::classify::is_network_error;
use super::error::{FailedAttemptError, RetryError};
use super::scheduler::{BackoffOptions, Continuation, Scheduler};
use super::signal::{CancelReason, CancelSignal};

/// Reason surfaced when a scheduler stops but hands back no error.
const SCHEDULER_LOST_ERROR: &str = "scheduler stopped without a recorded failure";

/// Retry budget used when `retries` is not set.
pub const DEFAULT_RETRIES: u32 = 10;

/// Observer called for every failed, retryable attempt. An `Err` ends the session.
pub type FailedAttemptHook<E> = Arc<
    dyn for<'a> Fn(&'a FailedAttemptError<E>) -> BoxFuture<'a, Result<(), E>> + Send + Sync,
>;

/// Predicate deciding whether a failed attempt may be retried.
pub type ShouldRetry<E> =
    Arc<dyn for<'a> Fn(&'a FailedAttemptError<E>) -> BoxFuture<'a, bool> + Send + Sync>;

/// Decides whether a type-category error is really a network failure.
pub type NetworkClassifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Caller-facing retry configuration.
pub struct RetryOptions<E> {
    retries: Option<u32>,
    on_failed_attempt: Option<FailedAttemptHook<E>>,
    should_retry: Option<ShouldRetry<E>>,
    network_classifier: Option<NetworkClassifier<E>>,
    signal: Option<CancelSignal>,
    backoff: BackoffOptions,
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self {
            retries: None,
            on_failed_attempt: None,
            should_retry: None,
            network_classifier: None,
            signal: None,
            backoff: BackoffOptions::default(),
        }
    }
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            retries: self.retries,
            on_failed_attempt: self.on_failed_attempt.clone(),
            should_retry: self.should_retry.clone(),
            network_classifier: self.network_classifier.clone(),
            signal: self.signal.clone(),
            backoff: self.backoff,
        }
    }
}

impl<E> fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("retries", &self.retries)
            .field("on_failed_attempt", &self.on_failed_attempt.is_some())
            .field("should_retry", &self.should_retry.is_some())
            .field("network_classifier", &self.network_classifier.is_some())
            .field("signal", &self.signal)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<E> RetryOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of retries after the first attempt.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Cancellation handle for the session.
    pub fn signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Replace all timing options at once.
    pub fn backoff(mut self, backoff: BackoffOptions) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.backoff.min_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.backoff.max_delay = delay;
        self
    }

    pub fn factor(mut self, factor: f32) -> Self {
        self.backoff.factor = factor;
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.backoff.jitter = jitter;
        self
    }

    pub fn forever(mut self, forever: bool) -> Self {
        self.backoff.forever = forever;
        self
    }

    pub fn max_retry_time(mut self, limit: Duration) -> Self {
        self.backoff.max_retry_time = Some(limit);
        self
    }

    /// Async observer for failed attempts. Returning `Err` stops retrying and
    /// the returned error becomes the session's error.
    pub fn on_failed_attempt_async<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a FailedAttemptError<E>) -> BoxFuture<'a, Result<(), E>>
            + Send
            + Sync
            + 'static,
    {
        self.on_failed_attempt = Some(Arc::new(hook));
        self
    }

    /// Async predicate; `false` ends the session with the attempt's own error.
    pub fn should_retry_async<F>(mut self, predicate: F) -> Self
    where
        F: for<'a> Fn(&'a FailedAttemptError<E>) -> BoxFuture<'a, bool> + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Custom network-failure classifier for [`Failure::Type`](super::Failure::Type) errors.
    pub fn network_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.network_classifier = Some(Arc::new(classifier));
        self
    }

    pub fn backoff_options(&self) -> &BackoffOptions {
        &self.backoff
    }

    /// Configured retry budget, or [`DEFAULT_RETRIES`].
    pub fn resolved_retries(&self) -> u32 {
        self.retries.unwrap_or(DEFAULT_RETRIES)
    }
}

impl<E: Send + 'static> RetryOptions<E> {
    /// Synchronous observer for failed attempts.
    pub fn on_failed_attempt<F>(self, hook: F) -> Self
    where
        F: Fn(&FailedAttemptError<E>) -> Result<(), E> + Send + Sync + 'static,
    {
        self.on_failed_attempt_async(move |record| future::ready(hook(record)).boxed())
    }

    /// Synchronous retry predicate.
    pub fn should_retry<F>(self, predicate: F) -> Self
    where
        F: Fn(&FailedAttemptError<E>) -> bool + Send + Sync + 'static,
    {
        self.should_retry_async(move |record| future::ready(predicate(record)).boxed())
    }
}

impl<E: fmt::Display + Send + 'static> RetryOptions<E> {
    /// Merge with the defaults into the configuration of one session.
    pub(crate) fn resolve(self) -> SessionPolicy<E> {
        SessionPolicy {
            retries: self.resolved_retries(),
            on_failed_attempt: self
                .on_failed_attempt
                .unwrap_or_else(|| Arc::new(ignore_failed_attempt::<E>)),
            should_retry: self
                .should_retry
                .unwrap_or_else(|| Arc::new(always_retry::<E>)),
            network_classifier: self
                .network_classifier
                .unwrap_or_else(|| Arc::new(message_is_network_error::<E>)),
            signal: self.signal,
            backoff: self.backoff,
        }
    }
}

fn ignore_failed_attempt<E: Send>(_: &FailedAttemptError<E>) -> BoxFuture<'_, Result<(), E>> {
    future::ready(Ok(())).boxed()
}

fn always_retry<E>(_: &FailedAttemptError<E>) -> BoxFuture<'_, bool> {
    future::ready(true).boxed()
}

fn message_is_network_error<E: fmt::Display>(error: &E) -> bool {
    is_network_error(&error.to_string())
}

/// Resolved, immutable configuration of one retry session.
pub(crate) struct SessionPolicy<E> {
    pub(crate) retries: u32,
    on_failed_attempt: FailedAttemptHook<E>,
    should_retry: ShouldRetry<E>,
    pub(crate) network_classifier: NetworkClassifier<E>,
    pub(crate) signal: Option<CancelSignal>,
    pub(crate) backoff: BackoffOptions,
}

impl<E> SessionPolicy<E> {
    /// `retries - (attempt_number - 1)`, never below zero.
    pub(crate) fn retries_left(&self, attempt_number: u32) -> u32 {
        self.retries.saturating_sub(attempt_number.saturating_sub(1))
    }

    /// Decide the fate of a retryable failure.
    ///
    /// `Ok(())` means the scheduler permits another attempt. A veto cancels
    /// the scheduler and returns the original error without consulting the
    /// observer or the scheduler.
    pub(crate) async fn evaluate<S>(
        &self,
        scheduler: &mut S,
        cause: E,
        attempt_number: u32,
    ) -> Result<(), RetryError<E>>
    where
        S: Scheduler<E>,
        E: fmt::Display,
    {
        let retries_left = self.retries_left(attempt_number);
        let record = FailedAttemptError::new(cause, attempt_number, retries_left);

        if !(self.should_retry)(&record).await {
            tracing::warn!(
                attempt = attempt_number,
                error = %record,
                "retry vetoed by should_retry"
            );
            scheduler.cancel();
            return Err(RetryError::Vetoed(record.into_cause()));
        }

        if let Err(source) = (self.on_failed_attempt)(&record).await {
            tracing::warn!(
                attempt = attempt_number,
                error = %source,
                "on_failed_attempt failed, stopping"
            );
            return Err(RetryError::Observer {
                source,
                attempt_number,
                retries_left,
            });
        }

        if scheduler.record_failure(record.into_cause()) == Continuation::Continue {
            return Ok(());
        }
        match scheduler.take_main_error() {
            Some(source) => {
                tracing::error!(
                    attempts = attempt_number,
                    error = %source,
                    "all retry attempts exhausted"
                );
                Err(RetryError::Exhausted {
                    source,
                    attempt_number,
                    retries_left,
                })
            }
            None => {
                tracing::error!(attempts = attempt_number, "{}", SCHEDULER_LOST_ERROR);
                Err(RetryError::Cancelled(CancelReason::new(SCHEDULER_LOST_ERROR)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::scheduler::BackoffScheduler;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scheduler(retries: u32) -> BackoffScheduler<String> {
        let backoff = BackoffOptions {
            min_delay: Duration::from_millis(1),
            ..BackoffOptions::default()
        };
        BackoffScheduler::new(&backoff, retries)
    }

    #[test]
    fn defaults_are_merged() {
        let policy = RetryOptions::<String>::new().resolve();
        assert_eq!(policy.retries, DEFAULT_RETRIES);
        assert!((policy.network_classifier)(&"Failed to fetch".to_string()));
        assert!(!(policy.network_classifier)(&"boom".to_string()));
        assert!(policy.signal.is_none());
        assert_eq!(policy.backoff, BackoffOptions::default());
    }

    #[test]
    fn retries_left_counts_down() {
        let policy = RetryOptions::<String>::new().retries(3).resolve();
        assert_eq!(policy.retries_left(1), 3);
        assert_eq!(policy.retries_left(2), 2);
        assert_eq!(policy.retries_left(4), 0);
        assert_eq!(policy.retries_left(9), 0);
    }

    #[test]
    fn builder_sets_timing() {
        let options = RetryOptions::<String>::new()
            .min_delay(Duration::from_millis(5))
            .max_delay(Duration::from_millis(50))
            .factor(3.0)
            .jitter(true)
            .max_retry_time(Duration::from_secs(2));
        let b = options.backoff_options();
        assert_eq!(b.min_delay, Duration::from_millis(5));
        assert_eq!(b.max_delay, Duration::from_millis(50));
        assert!(b.jitter);
        assert_eq!(b.max_retry_time, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn permitted_failure_continues() {
        let policy = RetryOptions::<String>::new().retries(2).resolve();
        let mut s = scheduler(2);
        assert!(policy.evaluate(&mut s, "flaky".into(), 1).await.is_ok());
        assert_eq!(s.recorded(), 1);
    }

    #[tokio::test]
    async fn veto_skips_observer() {
        let observed = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&observed);
        let policy = RetryOptions::<String>::new()
            .should_retry(|_| false)
            .on_failed_attempt(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .resolve();
        let mut s = scheduler(5);
        let err = policy.evaluate(&mut s, "nope".into(), 1).await.unwrap_err();
        assert!(matches!(err, RetryError::Vetoed(ref e) if e == "nope"));
        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert_eq!(s.recorded(), 0);
    }

    #[tokio::test]
    async fn observer_error_replaces_cause() {
        let policy = RetryOptions::<String>::new()
            .on_failed_attempt(|record| Err(format!("observer saw {}", record.cause())))
            .resolve();
        let mut s = scheduler(5);
        let err = policy.evaluate(&mut s, "io".into(), 2).await.unwrap_err();
        match err {
            RetryError::Observer {
                source,
                attempt_number,
                retries_left,
            } => {
                assert_eq!(source, "observer saw io");
                assert_eq!(attempt_number, 2);
                assert_eq!(retries_left, 9);
            }
            other => panic!("expected Observer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn exhausted_is_decorated() {
        let policy = RetryOptions::<String>::new().retries(0).resolve();
        let mut s = scheduler(0);
        let err = policy.evaluate(&mut s, "down".into(), 1).await.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempt_number(), Some(1));
        assert_eq!(err.retries_left(), Some(0));
    }

    /// Stops on the first failure and keeps nothing.
    struct ForgetfulScheduler;

    impl Scheduler<String> for ForgetfulScheduler {
        fn schedule_next(&mut self, _attempt: u32) -> Duration {
            Duration::ZERO
        }

        fn record_failure(&mut self, _error: String) -> Continuation {
            Continuation::Stop
        }

        fn take_main_error(&mut self) -> Option<String> {
            None
        }

        fn cancel(&mut self) {}

        fn last_error(&self) -> Option<&String> {
            None
        }
    }

    #[tokio::test]
    async fn stop_without_main_error_cancels() {
        let policy = RetryOptions::<String>::new().resolve();
        let err = policy
            .evaluate(&mut ForgetfulScheduler, "lost".into(), 1)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), SCHEDULER_LOST_ERROR);
    }
}
