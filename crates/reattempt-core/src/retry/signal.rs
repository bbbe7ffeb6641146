//! External cancellation for retry sessions.
//!
//! A `CancelSignal` is a cloneable handle: one clone goes into the retry
//! options, another stays with whoever may want to stop the session (a Ctrl-C
//! handler, a shutdown path). The first `cancel` wins and fixes the reason.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Reason used when a signal is cancelled without one.
pub const DEFAULT_CANCEL_REASON: &str = "This operation was aborted";

/// Why a session was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason(String);

impl CancelReason {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(DEFAULT_CANCEL_REASON)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CancelReason {}

/// Cancellation handle carrying a reason.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel with the default reason.
    pub fn abort(&self) {
        self.cancel(CancelReason::default());
    }

    /// Cancel with `reason`. Later calls keep the first reason.
    pub fn cancel(&self, reason: impl Into<CancelReason>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason, once cancelled.
    pub fn reason(&self) -> Option<CancelReason> {
        if !self.token.is_cancelled() {
            return None;
        }
        Some(self.reason.get().cloned().unwrap_or_default())
    }

    /// Resolves with the reason once the signal is cancelled.
    pub async fn cancelled(&self) -> CancelReason {
        self.token.cancelled().await;
        self.reason.get().cloned().unwrap_or_default()
    }
}

impl From<&str> for CancelReason {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

impl From<String> for CancelReason {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}
