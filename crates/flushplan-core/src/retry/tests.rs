use crate::{
    error::{ErrorClass, ErrorDetail, ErrorOrigin, InternalError, StoreFault, StoreFaultKind},
    obs::{metrics_report, metrics_reset_all},
    retry::{
        ExecutionStrategy, RetryClassifier, RetryPolicy, RetrySchedule, RetryState,
        TransientFaultClassifier, retries_suspended, with_retries_suspended,
    },
    test_support::FakeConnection,
};
use std::{cell::Cell, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

fn fault(kind: StoreFaultKind) -> InternalError {
    InternalError::store(StoreFault::new(kind, "injected"))
}

fn fast_policy(max_retry_count: usize) -> RetryPolicy {
    RetryPolicy {
        max_retry_count,
        max_retry_delay: Duration::from_millis(5),
        coefficient: Duration::from_millis(1),
        ..RetryPolicy::default()
    }
}

// Fails with `kind` for the first `failures` calls, then returns the call count.
fn flaky(failures: usize, kind: StoreFaultKind) -> impl FnMut(&mut FakeConnection) -> Result<usize, InternalError> {
    let mut calls = 0;
    move |_| {
        calls += 1;
        if calls <= failures {
            Err(fault(kind))
        } else {
            Ok(calls)
        }
    }
}

#[test]
fn default_schedule_backs_off_exponentially_within_jitter() {
    let expected = [0.0, 1.0, 3.0, 7.0, 15.0];
    let mut schedule = RetrySchedule::new(RetryPolicy::default());

    for base in expected {
        let delay = schedule.next_delay().expect("within retry budget").as_secs_f64();
        assert!(
            delay >= base && delay <= base * 1.1 + f64::EPSILON,
            "delay {delay}s outside [{base}, {}]",
            base * 1.1
        );
    }
}

#[test]
fn zero_jitter_yields_the_bare_curve() {
    let mut schedule = RetrySchedule::new(RetryPolicy::default());
    let delays = (0..5)
        .map(|_| schedule.next_delay_with(0.0).expect("within budget"))
        .collect::<Vec<_>>();

    assert_eq!(
        delays,
        [0, 1, 3, 7, 15].map(Duration::from_secs).to_vec()
    );
}

#[test]
fn delay_is_capped_and_budget_is_finite() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay_for(5, 0.5), Duration::from_secs(30));
    assert_eq!(policy.delay_for(400, 0.0), Duration::from_secs(30));

    let mut schedule = RetrySchedule::new(policy);
    for _ in 0..6 {
        assert!(schedule.next_delay().is_some());
    }
    assert_eq!(schedule.next_delay(), None);
    assert_eq!(schedule.retries(), 6);
}

#[test]
fn retry_state_transitions() {
    assert!(RetryState::Idle.can_transition_to(RetryState::Running));
    assert!(RetryState::Running.can_transition_to(RetryState::Retrying));
    assert!(RetryState::Retrying.can_transition_to(RetryState::Running));
    assert!(!RetryState::Succeeded.can_transition_to(RetryState::Running));
    assert!(!RetryState::Idle.can_transition_to(RetryState::Succeeded));
    assert!(RetryState::Faulted.is_terminal());
}

#[test]
fn classifier_retries_only_transient_store_faults() {
    let classifier = TransientFaultClassifier;

    assert!(classifier.should_retry(&fault(StoreFaultKind::Deadlock)));
    assert!(classifier.should_retry(&fault(StoreFaultKind::Timeout)));
    assert!(!classifier.should_retry(&fault(StoreFaultKind::ConstraintViolation)));
    assert!(!classifier.should_retry(&InternalError::concurrency_conflict(1, 0)));
}

#[test]
fn transient_failures_are_retried_until_success() {
    metrics_reset_all();
    let strategy = ExecutionStrategy::new(fast_policy(6));

    let calls = strategy
        .execute(&mut FakeConnection::default(), flaky(2, StoreFaultKind::Deadlock))
        .expect("third attempt succeeds");

    assert_eq!(calls, 3);
    let counters = metrics_report(None).counters.expect("counters present");
    assert_eq!(counters.ops.retries_scheduled, 2);
}

#[test]
fn exhausted_budget_wraps_the_last_fault() {
    metrics_reset_all();
    let strategy = ExecutionStrategy::new(fast_policy(2));

    let err = strategy
        .execute(&mut FakeConnection::default(), flaky(usize::MAX, StoreFaultKind::Timeout))
        .expect_err("never succeeds");

    assert_eq!(err.class, ErrorClass::RetryLimit);
    let Some(ErrorDetail::RetryLimitExceeded { attempts, last }) = &err.detail else {
        panic!("retry limit detail expected");
    };
    assert_eq!(*attempts, 3);
    assert_eq!(
        last.store_fault().map(|fault| fault.kind),
        Some(StoreFaultKind::Timeout)
    );
    let counters = metrics_report(None).counters.expect("counters present");
    assert_eq!(counters.ops.retry_limits_exceeded, 1);
}

#[test]
fn fatal_errors_are_not_retried() {
    let strategy = ExecutionStrategy::new(fast_policy(6));
    let calls = Cell::new(0);

    let err = strategy
        .execute(&mut FakeConnection::default(), |_| {
            calls.set(calls.get() + 1);
            Err::<(), _>(InternalError::concurrency_conflict(1, 0))
        })
        .expect_err("conflict propagates");

    assert!(err.is_concurrency_conflict());
    assert_eq!(calls.get(), 1);
}

#[test]
fn ambient_transaction_is_rejected_before_any_attempt() {
    let strategy = ExecutionStrategy::default();
    let calls = Cell::new(0);

    let err = strategy
        .execute(&mut FakeConnection::with_ambient_transaction(), |_| {
            calls.set(calls.get() + 1);
            Ok(())
        })
        .expect_err("usage error");

    assert_eq!(err.class, ErrorClass::Usage);
    assert_eq!(err.origin, ErrorOrigin::Retry);
    assert!(err.message.contains("caller-initiated transactions"));
    assert_eq!(calls.get(), 0);
}

#[test]
fn non_retrying_strategy_runs_once_even_inside_a_transaction() {
    let err = ExecutionStrategy::none()
        .execute(
            &mut FakeConnection::with_ambient_transaction(),
            flaky(1, StoreFaultKind::Deadlock),
        )
        .expect_err("single attempt");

    assert_eq!(err.class, ErrorClass::Store);
}

#[test]
fn suspended_retries_let_the_failure_through_unchanged() {
    let strategy = ExecutionStrategy::new(fast_policy(6));
    assert!(strategy.retries_on_failure());

    let err = with_retries_suspended(|| {
        assert!(!strategy.retries_on_failure());
        strategy.execute(&mut FakeConnection::default(), flaky(1, StoreFaultKind::Deadlock))
    })
    .expect_err("no retry while suspended");

    assert_eq!(err.class, ErrorClass::Store);
    assert!(!retries_suspended());
}

#[test]
fn attempts_run_with_retries_suspended() {
    let strategy = ExecutionStrategy::new(fast_policy(6));
    let inner = ExecutionStrategy::new(fast_policy(6));
    let outer_calls = Cell::new(0);

    let value = strategy
        .execute(&mut FakeConnection::default(), |connection| {
            outer_calls.set(outer_calls.get() + 1);
            assert!(retries_suspended());
            // The nested strategy must not retry on its own.
            let nested = inner.execute(connection, flaky(1, StoreFaultKind::Deadlock));
            if outer_calls.get() == 1 {
                assert!(nested.is_err());
                return nested;
            }
            Ok(7)
        })
        .expect("second outer attempt succeeds");

    assert_eq!(value, 7);
    assert_eq!(outer_calls.get(), 2);
}

#[test]
fn verification_short_circuits_the_retry() {
    let strategy = ExecutionStrategy::new(fast_policy(6));
    let calls = Cell::new(0);

    let value = strategy
        .execute_with_verification(
            &mut FakeConnection::default(),
            |_| {
                calls.set(calls.get() + 1);
                Err(fault(StoreFaultKind::ConnectionReset))
            },
            |_| Ok(Some(42)),
        )
        .expect("verified");

    assert_eq!(value, 42);
    assert_eq!(calls.get(), 1);
}

#[derive(Debug)]
struct EverythingTransient;

impl RetryClassifier for EverythingTransient {
    fn should_retry(&self, _error: &InternalError) -> bool {
        true
    }
}

#[test]
fn custom_classifier_replaces_the_default() {
    let strategy =
        ExecutionStrategy::new(fast_policy(3)).with_classifier(Arc::new(EverythingTransient));

    let calls = strategy
        .execute(&mut FakeConnection::default(), flaky(1, StoreFaultKind::ConstraintViolation))
        .expect("retried");

    assert_eq!(calls, 2);
}

#[tokio::test]
async fn async_retries_until_success() {
    let strategy = ExecutionStrategy::new(fast_policy(6));
    let mut calls = 0;

    let value = strategy
        .execute_async(
            &mut FakeConnection::default(),
            async |_: &mut FakeConnection| {
                calls += 1;
                assert!(crate::retry::retries_suspended());
                if calls < 3 {
                    Err(fault(StoreFaultKind::Timeout))
                } else {
                    Ok(calls)
                }
            },
            &CancellationToken::new(),
        )
        .await
        .expect("third attempt succeeds");

    assert_eq!(value, 3);
}

#[tokio::test]
async fn cancellation_interrupts_the_backoff() {
    let strategy = ExecutionStrategy::default();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut calls = 0;

    let err = strategy
        .execute_async(
            &mut FakeConnection::default(),
            async |_: &mut FakeConnection| {
                calls += 1;
                Err::<(), _>(fault(StoreFaultKind::Deadlock))
            },
            &cancel,
        )
        .await
        .expect_err("cancelled");

    assert_eq!(err.class, ErrorClass::Cancelled);
    assert_eq!(calls, 1);
}

#[tokio::test]
async fn async_verification_short_circuits_the_retry() {
    let strategy = ExecutionStrategy::new(fast_policy(6));

    let value = strategy
        .execute_with_verification_async(
            &mut FakeConnection::default(),
            async |_: &mut FakeConnection| Err(fault(StoreFaultKind::Deadlock)),
            async |_: &mut FakeConnection| Ok(Some("landed")),
            &CancellationToken::new(),
        )
        .await
        .expect("verified");

    assert_eq!(value, "landed");
}
