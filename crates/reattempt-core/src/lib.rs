//! Retry decision engine for async operations, plus the config and logging
//! layers shared with the `reattempt` CLI.

pub mod config;
pub mod logging;
pub mod retry;

pub use retry::{
    retry, retry_with_scheduler, AbortError, CancelSignal, FailedAttemptError, Failure,
    RetryError, RetryOptions,
};
