//! Scenario tests for the retry executor
//!
//! These tests drive complete executions through policies built with the
//! builder and the strategy constructors, including cancellation.

use std::error::Error;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Cancelled, RetryError};
use crate::executor::{retry, retry_with_cancel, RetryExecutor};
use crate::observer::{StatsObserver, TracingObserver};
use crate::policy::RetryPolicy;
use crate::strategies::{constant_wait, exponential_wait, ErrorClass};

/// An error that wraps another one as its source
#[derive(Debug)]
struct RequestFailed {
    source: Box<dyn Error + Send + Sync>,
}

impl fmt::Display for RequestFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request failed")
    }
}

impl Error for RequestFailed {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

fn poison_policy(max_attempts: u32) -> RetryPolicy<&'static str, io::Error> {
    RetryPolicy::builder()
        .retry_on_results(&["POISON"])
        .max_attempts(max_attempts)
        .build()
        .unwrap()
}

/// Returns "POISON" for the first `poisoned` calls, then "OK"
fn poisoned_then_ok(
    calls: &Arc<AtomicU32>,
    poisoned: u32,
) -> impl FnMut() -> std::future::Ready<Result<&'static str, io::Error>> {
    let calls = calls.clone();
    move || {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        std::future::ready(Ok(if call <= poisoned { "POISON" } else { "OK" }))
    }
}

// ============================================================================
// Exhaustion
// ============================================================================

#[tokio::test]
async fn test_bounded_failure_exhaustion_propagates_last_error() {
    let policy: RetryPolicy<(), io::Error> =
        RetryPolicy::builder().max_attempts(3).build().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = retry(&policy, || {
        let call = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            Err::<(), _>(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("attempt {}", call),
            ))
        }
    })
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let err = result.unwrap_err().into_operation_error().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert_eq!(err.to_string(), "attempt 3");
}

#[tokio::test]
async fn test_result_based_retry_success() {
    let policy = poison_policy(5);
    let calls = Arc::new(AtomicU32::new(0));

    let result = retry(&policy, poisoned_then_ok(&calls, 2)).await;

    assert_eq!(result.unwrap(), "OK");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_result_based_exhaustion_returns_last_value() {
    let policy = poison_policy(2);
    let calls = Arc::new(AtomicU32::new(0));
    let observer = Arc::new(StatsObserver::new());

    let result = RetryExecutor::new()
        .with_observer(observer.clone())
        .execute(
            &policy,
            &CancellationToken::new(),
            poisoned_then_ok(&calls, u32::MAX),
        )
        .await;

    assert_eq!(result.unwrap(), "POISON");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(observer.exhaustions(), 1);
    assert_eq!(observer.successes(), 0);
}

#[tokio::test]
async fn test_error_after_poison_results_is_surfaced() {
    let policy = poison_policy(3);
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = retry(&policy, || {
        let call = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if call < 3 {
                Ok("POISON")
            } else {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }
    })
    .await;

    let err = result.unwrap_err().into_operation_error().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_success_clears_previous_error() {
    let policy: RetryPolicy<&str, io::Error> =
        RetryPolicy::builder().max_attempts(3).build().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = retry(&policy, || {
        let call = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if call == 1 {
                Err(io::Error::new(io::ErrorKind::Other, "first"))
            } else {
                Ok("second")
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), "second");
}

// ============================================================================
// Classification
// ============================================================================

#[tokio::test]
async fn test_error_kind_filter_short_circuits() {
    let policy: RetryPolicy<(), io::Error> = RetryPolicy::builder()
        .retry_on_errors(&[ErrorClass::io(io::ErrorKind::TimedOut)])
        .max_attempts(10)
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = retry(&policy, || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")) }
    })
    .await;

    let err = result.unwrap_err().into_operation_error().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_error_type_filter_retries_matching_type() {
    let policy: RetryPolicy<(), RequestFailed> = RetryPolicy::builder()
        .retry_on_errors(&[ErrorClass::of::<RequestFailed>()])
        .max_attempts(3)
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = retry(&policy, || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        async {
            Err::<(), _>(RequestFailed {
                source: "upstream reset".into(),
            })
        }
    })
    .await;

    assert!(result.unwrap_err().is_operation());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

// ============================================================================
// Boxed errors
// ============================================================================

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::test]
async fn test_boxed_error_operation_is_retried() {
    let policy: RetryPolicy<(), BoxError> =
        RetryPolicy::builder().max_attempts(3).build().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();
    let observer = Arc::new(StatsObserver::new());

    let result = RetryExecutor::new()
        .with_observer(observer.clone())
        .execute(&policy, &CancellationToken::new(), || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), BoxError>("boom".into()) }
        })
        .await;

    let err = result.unwrap_err().into_operation_error().unwrap();
    assert_eq!(err.to_string(), "boom");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(observer.retries(), 2);
    assert_eq!(observer.exhaustions(), 1);
}

#[tokio::test]
async fn test_boxed_error_filter_matches_inner_type() {
    let policy: RetryPolicy<(), BoxError> = RetryPolicy::builder()
        .retry_on_errors(&[ErrorClass::of::<RequestFailed>()])
        .max_attempts(5)
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = retry(&policy, || {
        let call = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            let err: BoxError = if call < 2 {
                Box::new(RequestFailed {
                    source: "upstream reset".into(),
                })
            } else {
                "fatal".into()
            };
            Err::<(), _>(err)
        }
    })
    .await;

    let err = result.unwrap_err().into_operation_error().unwrap();
    assert_eq!(err.to_string(), "fatal");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_boxed_cancellation_marker_cancels() {
    let policy: RetryPolicy<(), BoxError> = RetryPolicy::default();
    let cancel = CancellationToken::new();

    let result = retry_with_cancel(&policy, &cancel, || async {
        Err::<(), BoxError>(Box::new(Cancelled))
    })
    .await;

    assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
    assert!(cancel.is_cancelled());
}

// ============================================================================
// Waiting
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_exponential_wait_elapses_between_attempts() {
    let policy: RetryPolicy<(), io::Error> = RetryPolicy::builder()
        .max_attempts(4)
        .wait_with(exponential_wait(2.0))
        .build()
        .unwrap();
    let start = tokio::time::Instant::now();

    let _ = retry(&policy, || async {
        Err::<(), _>(io::Error::new(io::ErrorKind::Other, "fail"))
    })
    .await;

    // 2 + 4 + 8 ms
    assert!(start.elapsed() >= Duration::from_millis(14));
    assert!(start.elapsed() < Duration::from_millis(100));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_wait_aborts_immediately() {
    let policy: RetryPolicy<(), io::Error> = RetryPolicy::builder()
        .wait_with(|attempt| {
            if attempt < 2 {
                Duration::ZERO
            } else {
                Duration::from_secs(60)
            }
        })
        .build()
        .unwrap();
    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();
    let observer = Arc::new(StatsObserver::new());

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let start = tokio::time::Instant::now();
    let result = RetryExecutor::new()
        .with_observer(observer.clone())
        .execute(&policy, &cancel, || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(io::Error::new(io::ErrorKind::Other, "fail")) }
        })
        .await;

    assert!(matches!(result, Err(RetryError::Cancelled { attempts: 2 })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(cancel.is_cancelled());
    assert!(start.elapsed() < Duration::from_secs(60));
    assert_eq!(observer.cancellations(), 1);
}

#[tokio::test]
async fn test_cancellation_marker_in_error_chain() {
    let policy: RetryPolicy<(), RequestFailed> = RetryPolicy::default();
    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = retry_with_cancel(&policy, &cancel, || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        async {
            Err::<(), _>(RequestFailed {
                source: Box::new(io::Error::new(io::ErrorKind::Other, Cancelled)),
            })
        }
    })
    .await;

    assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // The cancellation is propagated to the caller's token
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn test_cancellation_takes_precedence_over_error() {
    let policy: RetryPolicy<(), io::Error> = RetryPolicy::builder()
        .retry_if_error(|_| false)
        .build()
        .unwrap();
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();

    let result = retry_with_cancel(&policy, &cancel, || {
        canceller.cancel();
        async { Err::<(), _>(io::Error::new(io::ErrorKind::Other, "fatal")) }
    })
    .await;

    assert!(result.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_cancellation_between_zero_wait_attempts() {
    let policy: RetryPolicy<(), io::Error> = RetryPolicy::default();
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = retry_with_cancel(&policy, &cancel, || {
        if calls_clone.fetch_add(1, Ordering::SeqCst) + 1 == 4 {
            canceller.cancel();
        }
        async { Err::<(), _>(io::Error::new(io::ErrorKind::Other, "fail")) }
    })
    .await;

    assert!(matches!(result, Err(RetryError::Cancelled { attempts: 4 })));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

// ============================================================================
// Policy reuse
// ============================================================================

type Outcome = (Result<&'static str, bool>, u32);

/// Runs two executions concurrently, one that recovers and one that exhausts
async fn run_concurrently(
    policy_a: &RetryPolicy<&'static str, io::Error>,
    policy_b: &RetryPolicy<&'static str, io::Error>,
) -> (Outcome, Outcome) {
    let calls_a = Arc::new(AtomicU32::new(0));
    let calls_b = Arc::new(AtomicU32::new(0));

    let (a, b) = tokio::join!(
        retry(policy_a, poisoned_then_ok(&calls_a, 2)),
        retry(policy_b, poisoned_then_ok(&calls_b, 10)),
    );

    (
        (a.map_err(|err| err.is_cancelled()), calls_a.load(Ordering::SeqCst)),
        (b.map_err(|err| err.is_cancelled()), calls_b.load(Ordering::SeqCst)),
    )
}

#[tokio::test]
async fn test_shared_policy_matches_fresh_policies() {
    let shared = poison_policy(4);
    let shared_outcome = run_concurrently(&shared, &shared).await;
    let fresh_outcome = run_concurrently(&poison_policy(4), &poison_policy(4)).await;

    assert_eq!(shared_outcome, fresh_outcome);
    assert_eq!(shared_outcome, ((Ok("OK"), 3), (Ok("POISON"), 4)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shared_policy_across_threads() {
    let policy = Arc::new(poison_policy(5));

    let handles: Vec<_> = (0..4)
        .map(|poisoned| {
            let policy = policy.clone();
            tokio::spawn(async move {
                let calls = Arc::new(AtomicU32::new(0));
                let value = retry(&policy, poisoned_then_ok(&calls, poisoned))
                    .await
                    .unwrap();
                (value, calls.load(Ordering::SeqCst))
            })
        })
        .collect();

    for (poisoned, handle) in handles.into_iter().enumerate() {
        let (value, calls) = handle.await.unwrap();
        assert_eq!(value, "OK");
        assert_eq!(calls, poisoned as u32 + 1);
    }
}

// ============================================================================
// Observation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_tracing_observer_runs_through_execution() {
    let policy: RetryPolicy<&str, io::Error> = RetryPolicy::builder()
        .max_attempts(3)
        .wait_with(constant_wait(Duration::from_millis(5)))
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = RetryExecutor::new()
        .with_observer(TracingObserver::new("flaky"))
        .execute(&policy, &CancellationToken::new(), || {
            let call = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if call < 3 {
                    Err(io::Error::new(io::ErrorKind::Other, "flaky"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
