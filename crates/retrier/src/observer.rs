//! Retry observation and logging
//!
//! This module provides the `RetryObserver` trait, called by the executor at
//! each decision point, and a `TracingObserver` implementation that logs
//! using the `tracing` crate.

use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Observer trait for retry decisions
///
/// Errors are passed as `Option<&dyn Error>`: `None` means the attempt
/// returned a value the result predicate rejected.
///
/// # Example
///
/// ```rust
/// use retrier::RetryObserver;
/// use std::error::Error;
/// use std::time::Duration;
///
/// struct PrintObserver;
///
/// impl RetryObserver for PrintObserver {
///     fn on_retry(&self, attempt: u32, error: Option<&dyn Error>, delay: Duration) {
///         eprintln!("attempt {} failed ({:?}), waiting {:?}", attempt, error.map(|e| e.to_string()), delay);
///     }
/// }
/// ```
pub trait RetryObserver: Send + Sync {
    /// Called right before an attempt runs
    fn on_attempt_start(&self, attempt: u32) {
        let _ = attempt;
    }

    /// Called when an attempt will be retried after `delay`
    fn on_retry(&self, attempt: u32, error: Option<&dyn Error>, delay: Duration) {
        let _ = (attempt, error, delay);
    }

    /// Called when an accepted value is returned
    fn on_success(&self, attempt: u32, total_duration: Duration) {
        let _ = (attempt, total_duration);
    }

    /// Called when the stop predicate ended retries of a failed attempt
    ///
    /// With `final_error` set to `None` the rejected value is still returned
    /// to the caller.
    fn on_exhausted(&self, attempts: u32, final_error: Option<&dyn Error>) {
        let _ = (attempts, final_error);
    }

    /// Called when the failure predicate refused to retry an error
    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        let _ = (attempt, error);
    }

    /// Called when cancellation ended the execution
    fn on_cancelled(&self, attempts: u32) {
        let _ = attempts;
    }
}

/// A no-op observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {}

/// An observer that logs retry events using the `tracing` crate
///
/// # Log Levels
///
/// - `on_attempt_start`: DEBUG
/// - `on_retry`: WARN
/// - `on_success`: INFO (if > 1 attempt) or DEBUG (first attempt)
/// - `on_exhausted`: ERROR
/// - `on_non_retryable`: WARN
/// - `on_cancelled`: WARN
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    /// Create a new tracing observer
    ///
    /// `operation` names the wrapped call in every event.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// Get the operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, attempt: u32) {
        tracing::debug!(operation = %self.operation, attempt, "starting attempt");
    }

    fn on_retry(&self, attempt: u32, error: Option<&dyn Error>, delay: Duration) {
        match error {
            Some(err) => tracing::warn!(
                operation = %self.operation,
                attempt,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "attempt failed, will retry"
            ),
            None => tracing::warn!(
                operation = %self.operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "attempt returned a rejected result, will retry"
            ),
        }
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %self.operation,
                attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                operation = %self.operation,
                duration_ms = total_duration.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, attempts: u32, final_error: Option<&dyn Error>) {
        match final_error {
            Some(err) => tracing::error!(
                operation = %self.operation,
                attempts,
                error = %err,
                "all retry attempts exhausted"
            ),
            None => tracing::error!(
                operation = %self.operation,
                attempts,
                "all retry attempts exhausted, returning last result"
            ),
        }
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        tracing::warn!(
            operation = %self.operation,
            attempt,
            error = %error,
            "non-retryable error"
        );
    }

    fn on_cancelled(&self, attempts: u32) {
        tracing::warn!(operation = %self.operation, attempts, "retry cancelled");
    }
}

/// An observer that counts retry events
///
/// Useful for testing and ad-hoc diagnostics.
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    retries: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    non_retryable: AtomicU32,
    cancellations: AtomicU32,
}

impl StatsObserver {
    /// Create a new stats observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of attempt starts
    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    /// Get the number of scheduled retries
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Get the number of successes
    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    /// Get the number of exhaustions
    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    /// Get the number of non-retryable errors
    pub fn non_retryable(&self) -> u32 {
        self.non_retryable.load(Ordering::SeqCst)
    }

    /// Get the number of cancellations
    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _attempt: u32) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_retry(&self, _attempt: u32, _error: Option<&dyn Error>, _delay: Duration) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _attempts: u32, _final_error: Option<&dyn Error>) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_non_retryable(&self, _attempt: u32, _error: &dyn Error) {
        self.non_retryable.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cancelled(&self, _attempts: u32) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Implement RetryObserver for Arc<T> where T: RetryObserver
impl<T: RetryObserver + ?Sized> RetryObserver for std::sync::Arc<T> {
    fn on_attempt_start(&self, attempt: u32) {
        (**self).on_attempt_start(attempt)
    }

    fn on_retry(&self, attempt: u32, error: Option<&dyn Error>, delay: Duration) {
        (**self).on_retry(attempt, error, delay)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, attempts: u32, final_error: Option<&dyn Error>) {
        (**self).on_exhausted(attempts, final_error)
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        (**self).on_non_retryable(attempt, error)
    }

    fn on_cancelled(&self, attempts: u32) {
        (**self).on_cancelled(attempts)
    }
}

/// Implement RetryObserver for Box<T> where T: RetryObserver
impl<T: RetryObserver + ?Sized> RetryObserver for Box<T> {
    fn on_attempt_start(&self, attempt: u32) {
        (**self).on_attempt_start(attempt)
    }

    fn on_retry(&self, attempt: u32, error: Option<&dyn Error>, delay: Duration) {
        (**self).on_retry(attempt, error, delay)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, attempts: u32, final_error: Option<&dyn Error>) {
        (**self).on_exhausted(attempts, final_error)
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        (**self).on_non_retryable(attempt, error)
    }

    fn on_cancelled(&self, attempts: u32) {
        (**self).on_cancelled(attempts)
    }
}
