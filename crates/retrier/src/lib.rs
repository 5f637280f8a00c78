//! # retrier
//!
//! Policy-driven retry executor for fallible async operations:
//! - `RetryPolicy`: immutable bundle of failure, result, stop and wait functions
//! - `RetryPolicyBuilder`: fluent construction with defaults and validation
//! - `strategies`: pure constructors for common predicates and backoffs
//! - `RetryExecutor`: the attempt / evaluate / wait loop with cooperative
//!   cancellation
//! - `RetryConfig`: serde form of the attempt limit and wait strategy
//!
//! # Example
//!
//! ```rust,no_run
//! use retrier::strategies::{exponential_wait, ErrorClass};
//! use retrier::{retry_with_cancel, CancellationToken, RetryError, RetryPolicy};
//! use std::io;
//!
//! async fn fetch() -> Result<String, io::Error> {
//!     Ok("payload".to_string())
//! }
//!
//! async fn example(cancel: CancellationToken) -> Result<String, RetryError<io::Error>> {
//!     let policy = RetryPolicy::builder()
//!         .retry_on_errors(&[ErrorClass::io(io::ErrorKind::TimedOut)])
//!         .max_attempts(5)
//!         .wait_with(exponential_wait(2.0))
//!         .build()
//!         .expect("valid policy");
//!
//!     retry_with_cancel(&policy, &cancel, fetch).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod observer;
pub mod policy;
pub mod strategies;

pub use config::{RetryConfig, WaitStrategy};
pub use error::{is_cancellation, AsDynError, Cancelled, PolicyError, RetryError};
pub use executor::{retry, retry_with_cancel, RetryExecutor};
pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use policy::{
    FailurePredicate, ResultPredicate, RetryPolicy, RetryPolicyBuilder, StopPredicate, WaitFn,
};
pub use strategies::ErrorClass;
pub use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;
