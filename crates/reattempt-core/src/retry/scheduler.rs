//! Attempt scheduling: whether another attempt is permitted and when.
//!
//! The engine only does bookkeeping; delays come from the scheduler. The
//! default [`BackoffScheduler`] takes its delay sequence from `backon`'s
//! exponential builder.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use tokio::time::Instant;

/// Answer to a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Another attempt is permitted.
    Continue,
    /// No more attempts; surface [`Scheduler::take_main_error`].
    Stop,
}

/// Decides whether and when the next attempt runs.
///
/// Sessions drive it strictly in order: `schedule_next(1)`, then for every
/// failure `record_failure`, then `schedule_next(n + 1)` if it continued or
/// `take_main_error` if it stopped. `cancel` is called on every exit path and
/// must tolerate repeated calls.
pub trait Scheduler<E> {
    /// Delay before running `attempt` (1-based).
    fn schedule_next(&mut self, attempt: u32) -> Duration;

    /// Record a retryable failure and decide whether to continue.
    fn record_failure(&mut self, error: E) -> Continuation;

    /// Remove and return the error to surface after a `Stop`. `None` only if
    /// nothing was ever recorded.
    fn take_main_error(&mut self) -> Option<E>;

    /// Stop scheduling. Later `record_failure` calls return `Stop`.
    fn cancel(&mut self);

    /// Most recently recorded error, if any.
    fn last_error(&self) -> Option<&E>;
}

/// Timing options forwarded to [`BackoffScheduler`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffOptions {
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub factor: f32,
    /// Randomize delays.
    pub jitter: bool,
    /// Keep retrying with the last delay once the budget is spent.
    pub forever: bool,
    /// Stop once this much time has passed since the session started.
    pub max_retry_time: Option<Duration>,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60 * 60),
            factor: 2.0,
            jitter: false,
            forever: false,
            max_retry_time: None,
        }
    }
}

impl BackoffOptions {
    /// Delay sequence with at most `retries` entries.
    fn delays(&self, retries: u32) -> ExponentialBackoff {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(retries as usize);
        if self.jitter {
            builder = builder.with_jitter();
        }
        builder.build()
    }
}

/// Exponential backoff scheduler.
///
/// Permits `retries` retries (so `retries + 1` attempts). Every failure is
/// kept in order; the main error is the most frequent one by message, the
/// most recent winning ties.
pub struct BackoffScheduler<E> {
    delays: ExponentialBackoff,
    forever: bool,
    max_retry_time: Option<Duration>,
    started: Instant,
    last_delay: Option<Duration>,
    pending: Duration,
    errors: Vec<E>,
    stopped: bool,
}

impl<E> BackoffScheduler<E> {
    pub fn new(options: &BackoffOptions, retries: u32) -> Self {
        Self {
            delays: options.delays(retries),
            forever: options.forever,
            max_retry_time: options.max_retry_time,
            started: Instant::now(),
            last_delay: None,
            pending: Duration::ZERO,
            errors: Vec::new(),
            stopped: false,
        }
    }

    /// Number of failures recorded so far.
    pub fn recorded(&self) -> usize {
        self.errors.len()
    }

    fn next_delay(&mut self) -> Option<Duration> {
        match self.delays.next() {
            Some(delay) => {
                self.last_delay = Some(delay);
                Some(delay)
            }
            None if self.forever => Some(self.last_delay.unwrap_or_default()),
            None => None,
        }
    }
}

impl<E: fmt::Display> BackoffScheduler<E> {
    /// Index of the main error: most frequent by message, latest on ties.
    fn main_error_index(&self) -> Option<usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut main: Option<(usize, usize)> = None;
        for (index, error) in self.errors.iter().enumerate() {
            let count = counts.entry(error.to_string()).or_insert(0);
            *count += 1;
            if main.map_or(true, |(_, best)| *count >= best) {
                main = Some((index, *count));
            }
        }
        main.map(|(index, _)| index)
    }
}

impl<E: fmt::Display> Scheduler<E> for BackoffScheduler<E> {
    fn schedule_next(&mut self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        std::mem::take(&mut self.pending)
    }

    fn record_failure(&mut self, error: E) -> Continuation {
        if !self.stopped {
            if let Some(limit) = self.max_retry_time {
                if self.started.elapsed() >= limit {
                    tracing::debug!(
                        limit_ms = limit.as_millis() as u64,
                        "max retry time reached"
                    );
                    self.stopped = true;
                }
            }
        }

        self.errors.push(error);
        let delay = if self.stopped { None } else { self.next_delay() };
        match delay {
            Some(delay) => {
                self.pending = delay;
                Continuation::Continue
            }
            None => Continuation::Stop,
        }
    }

    fn take_main_error(&mut self) -> Option<E> {
        let index = self.main_error_index()?;
        Some(self.errors.remove(index))
    }

    fn cancel(&mut self) {
        self.stopped = true;
        self.pending = Duration::ZERO;
    }

    fn last_error(&self) -> Option<&E> {
        self.errors.last()
    }
}

impl<E> fmt::Debug for BackoffScheduler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffScheduler")
            .field("forever", &self.forever)
            .field("max_retry_time", &self.max_retry_time)
            .field("pending", &self.pending)
            .field("recorded", &self.errors.len())
            .field("stopped", &self.stopped)
            .finish()
    }
}
