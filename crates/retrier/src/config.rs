//! Data form of a retry policy
//!
//! `RetryConfig` carries the parts of a policy that can be written down in a
//! configuration file (attempt limit and wait strategy). The predicates that
//! classify errors and values are code and are added on the returned
//! builder.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::PolicyError;
use crate::policy::{RetryPolicy, RetryPolicyBuilder, WaitFn};
use crate::strategies;

/// Attempt limit and wait strategy
///
/// ```yaml
/// max-attempts: 5
/// jitter: true
/// wait:
///   strategy: exponential
///   base: 2.0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Maximum number of attempts; absent means unbounded
    #[serde(default)]
    pub max_attempts: Option<i64>,

    /// Delay between attempts
    #[serde(default)]
    pub wait: WaitStrategy,

    /// Add up to 25% random delay on top of the wait strategy
    #[serde(default)]
    pub jitter: bool,
}

/// Wait strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum WaitStrategy {
    /// Retry immediately (default)
    #[default]
    None,

    /// Fixed delay between retries
    #[serde(rename_all = "kebab-case")]
    Constant { delay_ms: u64 },

    /// `min(1000ms, base^attempt ms)`
    Exponential {
        #[serde(default = "default_backoff_base")]
        base: f64,
    },

    /// `min(max_delay_ms, step_ms * attempt)`
    #[serde(rename_all = "kebab-case")]
    Linear { step_ms: u64, max_delay_ms: u64 },
}

fn default_backoff_base() -> f64 {
    strategies::DEFAULT_BACKOFF_BASE
}

impl WaitStrategy {
    /// Check the strategy parameters
    pub fn validate(&self) -> Result<(), PolicyError> {
        match *self {
            WaitStrategy::Exponential { base } if !base.is_finite() || base < 0.0 => {
                Err(PolicyError::InvalidBackoffBase { base })
            }
            _ => Ok(()),
        }
    }

    /// Build the wait function
    pub fn wait_fn(&self) -> WaitFn {
        match *self {
            WaitStrategy::None => Arc::new(strategies::no_wait()),
            WaitStrategy::Constant { delay_ms } => {
                Arc::new(strategies::constant_wait(Duration::from_millis(delay_ms)))
            }
            WaitStrategy::Exponential { base } => Arc::new(strategies::exponential_wait(base)),
            WaitStrategy::Linear {
                step_ms,
                max_delay_ms,
            } => Arc::new(strategies::linear_wait(
                Duration::from_millis(step_ms),
                Duration::from_millis(max_delay_ms),
            )),
        }
    }
}

impl RetryConfig {
    /// Create a builder pre-populated with this configuration
    ///
    /// Invalid values are reported by the builder's `build()`.
    pub fn builder<T: 'static, E: 'static>(&self) -> RetryPolicyBuilder<T, E> {
        let mut builder = RetryPolicyBuilder::new();

        if let Some(max_attempts) = self.max_attempts {
            builder = builder.max_attempts(max_attempts);
        }

        if let Err(err) = self.wait.validate() {
            builder.reject(err);
        }
        let wait = self.wait.wait_fn();
        if self.jitter {
            builder.wait_with(strategies::jittered(move |attempt| wait(attempt)))
        } else {
            builder.wait_fn(wait)
        }
    }

    /// Build a policy that retries on any error and never on a value
    pub fn to_policy<T: 'static, E: 'static>(&self) -> Result<RetryPolicy<T, E>, PolicyError> {
        self.builder().build()
    }
}
