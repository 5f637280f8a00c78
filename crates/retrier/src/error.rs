//! Error types for the retry executor
//!
//! This module defines the outcome error of an execution, the configuration
//! error raised while building a policy, and the cancellation marker that
//! operations can wrap into their own errors.

use std::error::Error;
use std::fmt;
use std::io;

/// Errors surfaced by [`RetryExecutor::execute`](crate::RetryExecutor::execute)
///
/// There is no "attempts exhausted" variant: when the stop predicate ends the
/// loop the caller receives either the literal error of the last attempt or
/// the last value the operation returned.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error returned by the last attempt, unchanged
    Operation(E),

    /// The calling context was cancelled
    ///
    /// Raised when the cancellation token fired, or when the last attempt's
    /// error carried a [`Cancelled`] marker somewhere in its cause chain. Any
    /// pending operation error is discarded.
    Cancelled {
        /// Number of attempts made before cancellation was observed
        attempts: u32,
    },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Operation(source) => write!(f, "{}", source),
            RetryError::Cancelled { attempts } => {
                write!(f, "retry cancelled after {} attempts", attempts)
            }
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Operation(source) => Some(source),
            RetryError::Cancelled { .. } => None,
        }
    }
}

impl<E> RetryError<E> {
    /// Check if this error indicates cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// Check if this error carries the operation's own error
    pub fn is_operation(&self) -> bool {
        matches!(self, RetryError::Operation(_))
    }

    /// Get a reference to the operation error, if any
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            RetryError::Operation(source) => Some(source),
            RetryError::Cancelled { .. } => None,
        }
    }

    /// Get the operation error, consuming this error
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            RetryError::Operation(source) => Some(source),
            RetryError::Cancelled { .. } => None,
        }
    }

    /// Map the operation error type using a closure
    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Operation(source) => RetryError::Operation(f(source)),
            RetryError::Cancelled { attempts } => RetryError::Cancelled { attempts },
        }
    }
}

/// Invalid arguments given to a [`RetryPolicyBuilder`](crate::RetryPolicyBuilder)
///
/// Always raised by `build()`, never during execution.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// Maximum attempts was negative or does not fit in a `u32`
    #[error("max attempts must be a number between 0 and {max}, but got {value}", max = u32::MAX)]
    InvalidMaxAttempts { value: String },

    /// Exponential backoff base was negative, NaN or infinite
    #[error("backoff base must be a finite number >= 0, but got {base}")]
    InvalidBackoffBase { base: f64 },
}

/// Marker error meaning "the work was cancelled"
///
/// Operations return it, or wrap it as the source of their own error, to
/// abort the retry loop instead of being classified as a retryable failure.
#[derive(thiserror::Error, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Marker for [`AsDynError`] on types that implement [`Error`] themselves
#[derive(Debug)]
pub enum ConcreteError {}

/// Marker for [`AsDynError`] on boxed trait objects
#[derive(Debug)]
pub enum BoxedError {}

/// Borrow an operation's error as `&dyn Error`
///
/// Implemented for every `E: Error + 'static` and for the boxed trait
/// objects (`Box<dyn Error>`, with or without `Send`/`Sync`), which do not
/// implement `Error` themselves. The marker parameter keeps the two impls
/// apart and is always inferred.
pub trait AsDynError<Marker> {
    /// View this error as a trait object
    fn as_dyn_error(&self) -> &(dyn Error + 'static);
}

impl<E: Error + 'static> AsDynError<ConcreteError> for E {
    fn as_dyn_error(&self) -> &(dyn Error + 'static) {
        self
    }
}

impl AsDynError<BoxedError> for Box<dyn Error + Send + Sync> {
    fn as_dyn_error(&self) -> &(dyn Error + 'static) {
        &**self
    }
}

impl AsDynError<BoxedError> for Box<dyn Error + Send> {
    fn as_dyn_error(&self) -> &(dyn Error + 'static) {
        &**self
    }
}

impl AsDynError<BoxedError> for Box<dyn Error> {
    fn as_dyn_error(&self) -> &(dyn Error + 'static) {
        &**self
    }
}

/// Walk the cause chain of `error` looking for a [`Cancelled`] marker
///
/// Follows `Error::source()` links and also looks inside custom
/// `std::io::Error` payloads, whose `source()` skips the wrapped error.
pub fn is_cancellation(error: &(dyn Error + 'static)) -> bool {
    std::iter::successors(Some(error), |&err| err.source()).any(|err| {
        if err.is::<Cancelled>() {
            return true;
        }
        err.downcast_ref::<io::Error>()
            .and_then(io::Error::get_ref)
            .is_some_and(|inner| is_cancellation(inner))
    })
}
