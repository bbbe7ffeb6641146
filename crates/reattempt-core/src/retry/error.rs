//! Error types for attempts and retry sessions.

use std::fmt;

use super::signal::CancelReason;

/// Error returned by a single attempt of a retried operation.
///
/// The variant tells the classifier how the failure should be treated, so
/// operations state intent explicitly instead of relying on the error type.
/// `From<E>` produces [`Failure::Error`], which lets `?` work inside operations.
#[derive(Debug)]
pub enum Failure<E> {
    /// Ordinary error; retried while the budget lasts.
    Error(E),
    /// Type-category error (bad arguments, misuse). Not retried unless the
    /// network classifier recognizes it as a disguised network failure.
    Type(E),
    /// Caller-forced abort; the wrapped error is surfaced without retrying.
    Abort(AbortError<E>),
    /// Something that is not an error value, rendered as text.
    NonError(String),
}

impl<E> Failure<E> {
    /// Shorthand for `Failure::Abort(AbortError::new(error))`.
    pub fn abort(error: E) -> Self {
        Failure::Abort(AbortError::new(error))
    }

    pub fn type_error(error: E) -> Self {
        Failure::Type(error)
    }

    /// Report a value that is not an error. Always fatal.
    pub fn non_error(value: impl fmt::Display) -> Self {
        Failure::NonError(value.to_string())
    }
}

impl<E> From<E> for Failure<E> {
    fn from(error: E) -> Self {
        Failure::Error(error)
    }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Error(e) | Failure::Type(e) => write!(f, "{}", e),
            Failure::Abort(a) => write!(f, "{}", a),
            Failure::NonError(value) => write!(f, "{}", non_error_message(value)),
        }
    }
}

/// Marker that stops a retry session immediately.
///
/// Built by the operation to say "this failure is final"; the session then
/// rejects with the original error, skipping `should_retry` and
/// `on_failed_attempt`.
#[derive(Debug)]
pub struct AbortError<E> {
    original: E,
}

impl<E> AbortError<E> {
    pub fn new(original: E) -> Self {
        Self { original }
    }

    pub fn original(&self) -> &E {
        &self.original
    }

    pub fn into_original(self) -> E {
        self.original
    }
}

impl<E: fmt::Display> fmt::Display for AbortError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AbortError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.original)
    }
}

/// Record of one failed, retryable attempt.
///
/// Handed by reference to `should_retry` and `on_failed_attempt`, then the
/// cause moves on to the scheduler. Never mutated after construction.
#[derive(Debug)]
pub struct FailedAttemptError<E> {
    cause: E,
    attempt_number: u32,
    retries_left: u32,
}

impl<E> FailedAttemptError<E> {
    pub(crate) fn new(cause: E, attempt_number: u32, retries_left: u32) -> Self {
        Self {
            cause,
            attempt_number,
            retries_left,
        }
    }

    /// The error the attempt failed with.
    pub fn cause(&self) -> &E {
        &self.cause
    }

    /// 1-based number of the attempt that failed.
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    /// `retries - (attempt_number - 1)`.
    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }

    pub fn into_cause(self) -> E {
        self.cause
    }
}

impl<E: fmt::Display> fmt::Display for FailedAttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for FailedAttemptError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Terminal error of a retry session.
///
/// Every variant except `Vetoed` and `Cancelled` carries the attempt number
/// and remaining retries at the point the session settled.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with something that is not an error value.
    NonError {
        value: String,
        attempt_number: u32,
        retries_left: u32,
    },
    /// The operation returned an abort marker; `source` is the unwrapped error.
    Aborted {
        source: E,
        attempt_number: u32,
        retries_left: u32,
    },
    /// Type-category error that is not a recognized network failure.
    Programmer {
        source: E,
        attempt_number: u32,
        retries_left: u32,
    },
    /// `should_retry` refused; carries the original error as-is.
    Vetoed(E),
    /// `on_failed_attempt` failed; its error replaces the attempt's error.
    Observer {
        source: E,
        attempt_number: u32,
        retries_left: u32,
    },
    /// The scheduler denied another attempt; `source` is its main error.
    Exhausted {
        source: E,
        attempt_number: u32,
        retries_left: u32,
    },
    /// The cancellation signal fired.
    Cancelled(CancelReason),
}

pub(crate) fn non_error_message(value: &str) -> String {
    format!(
        "Non-error was thrown: \"{}\". You should only throw errors.",
        value
    )
}

impl<E> RetryError<E> {
    /// Attempt number the session settled on, if the error came from a classified failure.
    pub fn attempt_number(&self) -> Option<u32> {
        match self {
            RetryError::NonError { attempt_number, .. }
            | RetryError::Aborted { attempt_number, .. }
            | RetryError::Programmer { attempt_number, .. }
            | RetryError::Observer { attempt_number, .. }
            | RetryError::Exhausted { attempt_number, .. } => Some(*attempt_number),
            RetryError::Vetoed(_) | RetryError::Cancelled(_) => None,
        }
    }

    pub fn retries_left(&self) -> Option<u32> {
        match self {
            RetryError::NonError { retries_left, .. }
            | RetryError::Aborted { retries_left, .. }
            | RetryError::Programmer { retries_left, .. }
            | RetryError::Observer { retries_left, .. }
            | RetryError::Exhausted { retries_left, .. } => Some(*retries_left),
            RetryError::Vetoed(_) | RetryError::Cancelled(_) => None,
        }
    }

    /// Reference to the carried operation error, if any.
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Aborted { source, .. }
            | RetryError::Programmer { source, .. }
            | RetryError::Observer { source, .. }
            | RetryError::Exhausted { source, .. }
            | RetryError::Vetoed(source) => Some(source),
            RetryError::NonError { .. } | RetryError::Cancelled(_) => None,
        }
    }

    /// Consume and return the carried operation error, if any.
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Aborted { source, .. }
            | RetryError::Programmer { source, .. }
            | RetryError::Observer { source, .. }
            | RetryError::Exhausted { source, .. }
            | RetryError::Vetoed(source) => Some(source),
            RetryError::NonError { .. } | RetryError::Cancelled(_) => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled(_))
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::NonError { value, .. } => write!(f, "{}", non_error_message(value)),
            RetryError::Aborted { source, .. }
            | RetryError::Programmer { source, .. }
            | RetryError::Observer { source, .. }
            | RetryError::Exhausted { source, .. }
            | RetryError::Vetoed(source) => write!(f, "{}", source),
            RetryError::Cancelled(reason) => write!(f, "{}", reason),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Aborted { source, .. }
            | RetryError::Programmer { source, .. }
            | RetryError::Observer { source, .. }
            | RetryError::Exhausted { source, .. }
            | RetryError::Vetoed(source) => Some(source),
            RetryError::NonError { .. } | RetryError::Cancelled(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn non_error_message_format() {
        let err: RetryError<io::Error> = RetryError::NonError {
            value: "fixture".to_string(),
            attempt_number: 1,
            retries_left: 10,
        };
        assert_eq!(
            err.to_string(),
            "Non-error was thrown: \"fixture\". You should only throw errors."
        );
        assert!(err.into_source().is_none());
    }

    #[test]
    fn counts_only_on_classified_paths() {
        let exhausted: RetryError<io::Error> = RetryError::Exhausted {
            source: io::Error::other("boom"),
            attempt_number: 3,
            retries_left: 0,
        };
        assert_eq!(exhausted.attempt_number(), Some(3));
        assert_eq!(exhausted.retries_left(), Some(0));
        assert!(exhausted.is_exhausted());
        assert_eq!(exhausted.to_string(), "boom");

        let vetoed: RetryError<io::Error> = RetryError::Vetoed(io::Error::other("no"));
        assert_eq!(vetoed.attempt_number(), None);

        let cancelled: RetryError<io::Error> =
            RetryError::Cancelled(CancelReason::new("shutting down"));
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.retries_left(), None);
        assert_eq!(cancelled.to_string(), "shutting down");
    }

    #[test]
    fn question_mark_yields_plain_error() {
        fn op() -> Result<(), Failure<io::Error>> {
            let write: Result<(), io::Error> = Err(io::Error::other("disk"));
            write?;
            Ok(())
        }
        assert!(matches!(op(), Err(Failure::Error(_))));
    }

    #[test]
    fn abort_error_keeps_original() {
        let abort = AbortError::new(io::Error::other("fatal"));
        assert_eq!(abort.to_string(), "fatal");
        assert_eq!(abort.into_original().to_string(), "fatal");
    }
}
