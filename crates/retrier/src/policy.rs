//! Retry policy and its builder
//!
//! A [`RetryPolicy`] bundles four decision functions:
//!
//! - **failure predicate**: should this error be retried?
//! - **result predicate**: should this successful value be retried anyway?
//! - **stop predicate**: given the attempts used so far, give up?
//! - **wait function**: how long to wait before the next attempt?
//!
//! Policies are immutable once built and cheap to clone; one instance can be
//! shared by any number of concurrent executions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AsDynError, PolicyError};
use crate::strategies::{self, ErrorClass};

/// Decides whether an error returned by an attempt should be retried
pub type FailurePredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Decides whether a value returned by an attempt should be retried
pub type ResultPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Decides from the number of attempts used whether to give up
pub type StopPredicate = Arc<dyn Fn(u32) -> bool + Send + Sync>;

/// Computes the delay before the next attempt from the attempts used
pub type WaitFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Immutable retry configuration for operations returning `Result<T, E>`
///
/// # Example
///
/// ```rust
/// use retrier::strategies::{exponential_wait, ErrorClass};
/// use retrier::RetryPolicy;
/// use std::io;
///
/// let policy: RetryPolicy<String, io::Error> = RetryPolicy::builder()
///     .retry_on_errors(&[ErrorClass::io(io::ErrorKind::TimedOut)])
///     .retry_on_results(&["POISON".to_string()])
///     .max_attempts(5)
///     .wait_with(exponential_wait(2.0))
///     .build()
///     .expect("valid policy");
///
/// assert!(policy.should_stop(5));
/// ```
pub struct RetryPolicy<T, E> {
    failure: FailurePredicate<E>,
    result: ResultPredicate<T>,
    stop: StopPredicate,
    wait: WaitFn,
}

impl<T: 'static, E: 'static> RetryPolicy<T, E> {
    /// Start building a policy from the defaults
    pub fn builder() -> RetryPolicyBuilder<T, E> {
        RetryPolicyBuilder::new()
    }
}

impl<T, E> RetryPolicy<T, E> {
    /// Whether `error` should trigger another attempt
    pub fn should_retry_error(&self, error: &E) -> bool {
        (self.failure)(error)
    }

    /// Whether the successful `value` should still trigger another attempt
    pub fn should_retry_result(&self, value: &T) -> bool {
        (self.result)(value)
    }

    /// Whether no further attempts should be made after `attempts_used`
    pub fn should_stop(&self, attempts_used: u32) -> bool {
        (self.stop)(attempts_used)
    }

    /// Delay to observe before the attempt following `attempts_used`
    pub fn wait_for(&self, attempts_used: u32) -> Duration {
        (self.wait)(attempts_used)
    }
}

/// Retries on any error, never on a value, never stops and never waits
impl<T: 'static, E: 'static> Default for RetryPolicy<T, E> {
    fn default() -> Self {
        RetryPolicyBuilder::new().into_policy()
    }
}

impl<T, E> Clone for RetryPolicy<T, E> {
    fn clone(&self) -> Self {
        Self {
            failure: Arc::clone(&self.failure),
            result: Arc::clone(&self.result),
            stop: Arc::clone(&self.stop),
            wait: Arc::clone(&self.wait),
        }
    }
}

impl<T, E> fmt::Debug for RetryPolicy<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy").finish_non_exhaustive()
    }
}

/// Fluent builder for [`RetryPolicy`]
///
/// Each of the four functions can be set from a closure or from one of the
/// convenience forms. Invalid arguments are recorded and reported by
/// [`build`](Self::build).
pub struct RetryPolicyBuilder<T, E> {
    failure: FailurePredicate<E>,
    result: ResultPredicate<T>,
    stop: StopPredicate,
    wait: WaitFn,
    invalid: Option<PolicyError>,
}

impl<T: 'static, E: 'static> Default for RetryPolicyBuilder<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, E: 'static> RetryPolicyBuilder<T, E> {
    /// Create a builder with the default functions
    pub fn new() -> Self {
        Self {
            failure: Arc::new(strategies::always_retry_on_error::<E>()),
            result: Arc::new(strategies::never_retry_on_result::<T>()),
            stop: Arc::new(strategies::never_stop()),
            wait: Arc::new(strategies::no_wait()),
            invalid: None,
        }
    }
}

impl<T, E> RetryPolicyBuilder<T, E> {
    /// Retry the errors for which `predicate` returns true
    pub fn retry_if_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.failure = Arc::new(predicate);
        self
    }

    /// Retry only errors matching one of `classes`
    ///
    /// A boxed `dyn Error` is matched by the error it holds.
    pub fn retry_on_errors<M>(mut self, classes: &[ErrorClass]) -> Self
    where
        E: AsDynError<M> + 'static,
    {
        self.failure = Arc::new(strategies::retry_on_error_kinds::<E, M>(classes));
        self
    }

    /// Retry the values for which `predicate` returns true
    pub fn retry_if_result<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.result = Arc::new(predicate);
        self
    }

    /// Retry when the value equals one of `values`
    pub fn retry_on_results(mut self, values: &[T]) -> Self
    where
        T: PartialEq + Clone + Send + Sync + 'static,
    {
        self.result = Arc::new(strategies::retry_on_results(values));
        self
    }

    /// Stop when `predicate` returns true for the attempts used
    pub fn stop_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(u32) -> bool + Send + Sync + 'static,
    {
        self.stop = Arc::new(predicate);
        self
    }

    /// Stop once `max_attempts` attempts have been made
    ///
    /// Negative values (or values beyond `u32::MAX`) make `build()` fail
    /// with [`PolicyError::InvalidMaxAttempts`].
    pub fn max_attempts<N>(mut self, max_attempts: N) -> Self
    where
        N: TryInto<u32> + Copy + fmt::Display,
    {
        match max_attempts.try_into() {
            Ok(max) => self.stop = Arc::new(strategies::stop_after_attempts(max)),
            Err(_) => self.reject(PolicyError::InvalidMaxAttempts {
                value: max_attempts.to_string(),
            }),
        }
        self
    }

    /// Compute inter-attempt delays with `wait`
    pub fn wait_with<F>(mut self, wait: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.wait = Arc::new(wait);
        self
    }

    /// Use an already shared wait function
    pub fn wait_fn(mut self, wait: WaitFn) -> Self {
        self.wait = wait;
        self
    }

    /// Validate and build the policy
    pub fn build(mut self) -> Result<RetryPolicy<T, E>, PolicyError> {
        match self.invalid.take() {
            Some(err) => Err(err),
            None => Ok(self.into_policy()),
        }
    }

    pub(crate) fn reject(&mut self, err: PolicyError) {
        self.invalid.get_or_insert(err);
    }

    fn into_policy(self) -> RetryPolicy<T, E> {
        RetryPolicy {
            failure: self.failure,
            result: self.result,
            stop: self.stop,
            wait: self.wait,
        }
    }
}
