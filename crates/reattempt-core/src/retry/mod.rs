//! Retry decision engine.
//!
//! Runs an async operation once per attempt, classifies each failure as fatal
//! or retryable, consults the caller's `should_retry` predicate and
//! `on_failed_attempt` observer, and asks a [`Scheduler`] whether another
//! attempt is permitted. Sessions can be cancelled through a [`CancelSignal`].
//!
//! ```no_run
//! use reattempt_core::retry::{retry, Failure, RetryOptions};
//!
//! # async fn fetch(_: u32) -> Result<String, std::io::Error> { Ok(String::new()) }
//! # async fn example() {
//! let options = RetryOptions::new()
//!     .retries(5)
//!     .on_failed_attempt(|record| {
//!         eprintln!(
//!             "attempt {} failed ({} retries left): {}",
//!             record.attempt_number(),
//!             record.retries_left(),
//!             record.cause()
//!         );
//!         Ok(())
//!     });
//!
//! let body = retry(
//!     |attempt| async move { Ok::<_, Failure<_>>(fetch(attempt).await?) },
//!     options,
//! )
//! .await;
//! # let _ = body;
//! # }
//! ```

mod classify;
mod error;
mod policy;
mod run;
mod scheduler;
mod signal;

pub use classify::{classify, is_network_error, Classified};
pub use error::{AbortError, FailedAttemptError, Failure, RetryError};
pub use policy::{
    FailedAttemptHook, NetworkClassifier, RetryOptions, ShouldRetry, DEFAULT_RETRIES,
};
pub use run::{retry, retry_with_scheduler};
pub use scheduler::{BackoffOptions, BackoffScheduler, Continuation, Scheduler};
pub use signal::{CancelReason, CancelSignal, DEFAULT_CANCEL_REASON};
