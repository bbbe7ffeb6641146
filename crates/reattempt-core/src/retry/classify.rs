//! Classify failed attempts into fatal and retryable kinds.

use super::error::Failure;

/// Messages runtimes use for network failures surfaced as type errors.
const NETWORK_ERROR_MESSAGES: &[&str] = &[
    "network error",
    "Failed to fetch",
    "NetworkError when attempting to fetch resource.",
    "The Internet connection appears to be offline.",
    "Network request failed",
    "fetch failed",
    "terminated",
    " A network error occurred.",
    "Network connection lost",
    "Load failed",
];

const NETWORK_ERROR_PREFIX: &str = "error sending request for url";

/// Returns true when `message` is one of the known network-failure messages.
///
/// Matching is exact (apart from the request-sending prefix) so that ordinary
/// type errors which merely mention the network stay fatal.
pub fn is_network_error(message: &str) -> bool {
    message.starts_with(NETWORK_ERROR_PREFIX) || NETWORK_ERROR_MESSAGES.contains(&message)
}

/// Outcome of classifying a failure. Owns the error so the caller can route it.
#[derive(Debug)]
pub enum Classified<E> {
    /// Not an error value. Fatal.
    NonError(String),
    /// Caller-forced abort, already unwrapped. Fatal.
    AbortRequested(E),
    /// Type error not recognized as a network failure. Fatal.
    Programmer(E),
    /// Type error recognized as a network failure. Retryable.
    NetworkType(E),
    /// Any other error. Retryable.
    Transient(E),
}

impl<E> Classified<E> {
    /// Whether the failure goes on to the retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Classified::NetworkType(_) | Classified::Transient(_))
    }

    /// Short label for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Classified::NonError(_) => "non_error",
            Classified::AbortRequested(_) => "abort",
            Classified::Programmer(_) => "programmer",
            Classified::NetworkType(_) => "network",
            Classified::Transient(_) => "transient",
        }
    }
}

/// Classify a failure. First match wins: non-error, abort, type error the
/// classifier rejects, then everything else as retryable.
///
/// `is_network_failure` is only consulted for [`Failure::Type`].
pub fn classify<E>(
    failure: Failure<E>,
    is_network_failure: &dyn Fn(&E) -> bool,
) -> Classified<E> {
    match failure {
        Failure::NonError(value) => Classified::NonError(value),
        Failure::Abort(abort) => Classified::AbortRequested(abort.into_original()),
        Failure::Type(error) => {
            if is_network_failure(&error) {
                Classified::NetworkType(error)
            } else {
                Classified::Programmer(error)
            }
        }
        Failure::Error(error) => Classified::Transient(error),
    }
}
