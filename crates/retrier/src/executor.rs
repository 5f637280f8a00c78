//! Retry execution engine
//!
//! This module drives the attempt / evaluate / wait loop. Attempts run one
//! after another on the caller's task; the only suspension point besides the
//! operation itself is the inter-attempt wait.

use std::future::Future;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::error::{is_cancellation, AsDynError, RetryError};
use crate::observer::{NoOpObserver, RetryObserver};
use crate::policy::RetryPolicy;

/// Execute an async operation under `policy`
///
/// The execution can only be cancelled through the operation's own errors
/// (see [`Cancelled`](crate::Cancelled)). Use [`retry_with_cancel`] to
/// supply a token.
///
/// # Example
///
/// ```rust
/// use retrier::{retry, RetryPolicy};
/// use std::io;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let policy: RetryPolicy<&str, io::Error> = RetryPolicy::builder()
///     .max_attempts(3)
///     .build()
///     .unwrap();
///
/// let result = retry(&policy, || async { Ok::<_, io::Error>("success") }).await;
/// assert_eq!(result.unwrap(), "success");
/// # }
/// ```
pub async fn retry<F, Fut, T, E, M>(
    policy: &RetryPolicy<T, E>,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: AsDynError<M>,
{
    RetryExecutor::new()
        .execute(policy, &CancellationToken::new(), op)
        .await
}

/// Execute an async operation under `policy`, observing `cancel`
pub async fn retry_with_cancel<F, Fut, T, E, M>(
    policy: &RetryPolicy<T, E>,
    cancel: &CancellationToken,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: AsDynError<M>,
{
    RetryExecutor::new().execute(policy, cancel, op).await
}

/// Runs operations under a [`RetryPolicy`]
///
/// The executor keeps no state between executions; each call to
/// [`execute`](Self::execute) owns its attempt counter and last outcome.
///
/// # Example
///
/// ```rust
/// use retrier::{RetryExecutor, TracingObserver};
///
/// let executor = RetryExecutor::new().with_observer(TracingObserver::new("download"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor<O = NoOpObserver> {
    observer: O,
}

impl RetryExecutor<NoOpObserver> {
    /// Create an executor without observation
    pub fn new() -> Self {
        Self {
            observer: NoOpObserver,
        }
    }
}

impl<O> RetryExecutor<O> {
    /// Set the observer
    ///
    /// The observer receives callbacks during execution.
    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutor<O2> {
        RetryExecutor { observer }
    }

    /// Get the observer
    pub fn observer(&self) -> &O {
        &self.observer
    }
}

impl<O: RetryObserver> RetryExecutor<O> {
    /// Execute an operation with retry logic
    ///
    /// After each attempt the outcome is classified by the policy's failure
    /// or result predicate. Another attempt follows only if the attempt
    /// failed, nothing was cancelled and the stop predicate allows it; the
    /// wait function is consulted only then.
    ///
    /// The operation's error type may be any `Error + 'static` or a boxed
    /// `dyn Error` (see [`AsDynError`]).
    ///
    /// # Returns
    ///
    /// - `Ok(value)` for the last value returned, including a value the
    ///   result predicate rejected when the stop predicate ended the loop
    /// - `Err(RetryError::Operation(e))` with the last attempt's own error
    /// - `Err(RetryError::Cancelled { .. })` when `cancel` fired or the
    ///   error's cause chain holds a [`Cancelled`](crate::Cancelled) marker;
    ///   `cancel` is left cancelled so the caller observes the signal
    pub async fn execute<F, Fut, T, E, M>(
        &self,
        policy: &RetryPolicy<T, E>,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: AsDynError<M>,
    {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            self.observer.on_attempt_start(attempts);

            let outcome = op().await;
            let attempt_failed = match &outcome {
                Ok(value) => policy.should_retry_result(value),
                Err(err) => policy.should_retry_error(err),
            };

            let cancelled = cancel.is_cancelled()
                || outcome
                    .as_ref()
                    .err()
                    .is_some_and(|err| is_cancellation(err.as_dyn_error()));
            if cancelled {
                return Err(self.cancelled(cancel, attempts));
            }

            if !attempt_failed {
                return match outcome {
                    Ok(value) => {
                        self.observer.on_success(attempts, start.elapsed());
                        Ok(value)
                    }
                    Err(err) => {
                        self.observer.on_non_retryable(attempts, err.as_dyn_error());
                        Err(RetryError::Operation(err))
                    }
                };
            }

            if policy.should_stop(attempts) {
                let last_error = outcome.as_ref().err().map(AsDynError::as_dyn_error);
                self.observer.on_exhausted(attempts, last_error);
                return outcome.map_err(RetryError::Operation);
            }

            // The outcome of a retried attempt is never surfaced
            let delay = policy.wait_for(attempts);
            self.observer.on_retry(
                attempts,
                outcome.err().as_ref().map(AsDynError::as_dyn_error),
                delay,
            );

            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(self.cancelled(cancel, attempts));
                    }
                }
            }
        }
    }

    fn cancelled<E>(&self, cancel: &CancellationToken, attempts: u32) -> RetryError<E> {
        cancel.cancel();
        self.observer.on_cancelled(attempts);
        RetryError::Cancelled { attempts }
    }
}
