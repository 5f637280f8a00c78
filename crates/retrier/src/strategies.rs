//! Stop, wait and retry strategies
//!
//! Pure constructors for the four functions a [`RetryPolicy`](crate::RetryPolicy)
//! is made of. Each returns a plain closure, so they can be used with the
//! builder or called on their own.

use rand::Rng;
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AsDynError;

/// Upper bound applied by [`exponential_wait`]
pub const EXPONENTIAL_WAIT_CAP: Duration = Duration::from_millis(1000);

/// Base used by [`default_exponential_wait`]
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

/// Exponential backoff in milliseconds
///
/// For `attempt > 0` the delay is `min(1000ms, round(base^attempt) ms)`;
/// attempt `0` waits nothing.
///
/// # Example
///
/// ```rust
/// use retrier::strategies::exponential_wait;
/// use std::time::Duration;
///
/// let wait = exponential_wait(2.0);
/// assert_eq!(wait(0), Duration::ZERO);
/// assert_eq!(wait(1), Duration::from_millis(2));
/// assert_eq!(wait(3), Duration::from_millis(8));
/// assert_eq!(wait(20), Duration::from_millis(1000));
/// ```
pub fn exponential_wait(base: f64) -> impl Fn(u32) -> Duration + Send + Sync + Clone + 'static {
    let cap_ms = EXPONENTIAL_WAIT_CAP.as_millis() as f64;
    move |attempt| {
        if attempt == 0 {
            return Duration::ZERO;
        }
        // NaN saturates to 0 in the cast, +inf clamps to the cap
        let millis = base.powf(f64::from(attempt)).round().clamp(0.0, cap_ms);
        Duration::from_millis(millis as u64)
    }
}

/// [`exponential_wait`] with base 2
pub fn default_exponential_wait() -> impl Fn(u32) -> Duration + Send + Sync + Clone + 'static {
    exponential_wait(DEFAULT_BACKOFF_BASE)
}

/// The same delay before every retry
pub fn constant_wait(delay: Duration) -> impl Fn(u32) -> Duration + Send + Sync + Clone + 'static {
    move |_| delay
}

/// Linear backoff: `step * attempt`, capped at `max`
pub fn linear_wait(
    step: Duration,
    max: Duration,
) -> impl Fn(u32) -> Duration + Send + Sync + Clone + 'static {
    move |attempt| step.saturating_mul(attempt).min(max)
}

/// No delay between attempts
pub fn no_wait() -> impl Fn(u32) -> Duration + Send + Sync + Clone + 'static {
    |_| Duration::ZERO
}

/// Add up to 25% random delay on top of `wait`
///
/// Zero delays stay zero; the result saturates at `Duration::MAX`.
pub fn jittered<W>(wait: W) -> impl Fn(u32) -> Duration + Send + Sync + 'static
where
    W: Fn(u32) -> Duration + Send + Sync + 'static,
{
    move |attempt| {
        let delay = wait(attempt);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if delay_ms == 0 {
            return delay;
        }
        let jitter_ms = rand::rng().random_range(0..=delay_ms / 4);
        delay.saturating_add(Duration::from_millis(jitter_ms))
    }
}

/// Stop once `attempts_used >= max_attempts`
///
/// `max_attempts` of 0 or 1 both mean a single attempt: the first attempt
/// always runs.
pub fn stop_after_attempts(
    max_attempts: u32,
) -> impl Fn(u32) -> bool + Send + Sync + Clone + 'static {
    move |attempts_used| attempts_used >= max_attempts
}

/// Never stop; only the failure and result predicates end the loop
pub fn never_stop() -> impl Fn(u32) -> bool + Send + Sync + Clone + 'static {
    |_| false
}

/// Retry on every error
pub fn always_retry_on_error<E: 'static>() -> impl Fn(&E) -> bool + Send + Sync + Clone + 'static {
    |_: &E| true
}

/// Never retry because of a returned value
pub fn never_retry_on_result<T: 'static>() -> impl Fn(&T) -> bool + Send + Sync + Clone + 'static {
    |_: &T| false
}

/// Retry when the error matches any of `classes`
///
/// # Example
///
/// ```rust
/// use retrier::strategies::{retry_on_error_kinds, ErrorClass};
/// use std::io;
///
/// let retryable = retry_on_error_kinds::<io::Error, _>(&[ErrorClass::io(io::ErrorKind::TimedOut)]);
/// assert!(retryable(&io::Error::new(io::ErrorKind::TimedOut, "slow")));
/// assert!(!retryable(&io::Error::new(io::ErrorKind::NotFound, "gone")));
/// ```
pub fn retry_on_error_kinds<E, M>(
    classes: &[ErrorClass],
) -> impl Fn(&E) -> bool + Send + Sync + Clone + 'static
where
    E: AsDynError<M> + 'static,
{
    let classes = classes.to_vec();
    move |error: &E| {
        let error = error.as_dyn_error();
        classes.iter().any(|class| class.matches(error))
    }
}

/// Retry when the returned value equals any of `values`
///
/// Useful for "poison" results: values that are returned successfully but
/// should not be accepted.
pub fn retry_on_results<T>(values: &[T]) -> impl Fn(&T) -> bool + Send + Sync + Clone + 'static
where
    T: PartialEq + Clone + Send + Sync + 'static,
{
    let values: Arc<[T]> = values.into();
    move |result: &T| values.iter().any(|value| value == result)
}

/// A kind of error, used by [`retry_on_error_kinds`]
#[derive(Clone, Copy)]
pub struct ErrorClass {
    matcher: Matcher,
}

#[derive(Clone, Copy)]
enum Matcher {
    Type {
        name: &'static str,
        is_instance: fn(&(dyn Error + 'static)) -> bool,
    },
    Io(io::ErrorKind),
}

impl ErrorClass {
    /// Errors whose concrete type is `T`
    pub fn of<T: Error + 'static>() -> Self {
        Self {
            matcher: Matcher::Type {
                name: std::any::type_name::<T>(),
                is_instance: is_instance::<T>,
            },
        }
    }

    /// `std::io::Error`s of the given kind
    pub fn io(kind: io::ErrorKind) -> Self {
        Self {
            matcher: Matcher::Io(kind),
        }
    }

    /// Check whether `error` belongs to this class
    pub fn matches(&self, error: &(dyn Error + 'static)) -> bool {
        match self.matcher {
            Matcher::Type { is_instance, .. } => is_instance(error),
            Matcher::Io(kind) => error
                .downcast_ref::<io::Error>()
                .is_some_and(|err| err.kind() == kind),
        }
    }
}

impl fmt::Debug for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.matcher {
            Matcher::Type { name, .. } => f.debug_tuple("ErrorClass").field(&name).finish(),
            Matcher::Io(kind) => f.debug_tuple("ErrorClass").field(&kind).finish(),
        }
    }
}

fn is_instance<T: Error + 'static>(error: &(dyn Error + 'static)) -> bool {
    error.is::<T>()
}
