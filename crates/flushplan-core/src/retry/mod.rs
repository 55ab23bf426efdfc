//! Resilient execution of a whole save.
//!
//! An [`ExecutionStrategy`] repeats a complete operation when it fails with a
//! fault its [`RetryClassifier`] deems transient, waiting out a
//! [`RetrySchedule`] between attempts. Each attempt runs with retries
//! suspended so nested strategies never multiply the retry budget.

mod policy;
#[cfg(test)]
mod tests;

use crate::{
    error::{ErrorOrigin, InternalError},
    executor::ConnectionState,
    obs::sink::{self, MetricsEvent},
};
use std::{cell::Cell, fmt, sync::Arc, thread, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use policy::{
    RetryClassifier, RetryPolicy, RetrySchedule, RetryState, TransientFaultClassifier,
};

thread_local! {
    static SUSPENDED: Cell<bool> = const { Cell::new(false) };
}

tokio::task_local! {
    static TASK_SUSPENDED: bool;
}

/// True when the current thread or task has retries suspended.
#[must_use]
pub fn retries_suspended() -> bool {
    SUSPENDED.with(Cell::get) || TASK_SUSPENDED.try_with(|suspended| *suspended).unwrap_or(false)
}

/// Run `f` with retries suspended on this thread.
pub fn with_retries_suspended<T>(f: impl FnOnce() -> T) -> T {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            SUSPENDED.with(|cell| cell.set(self.0));
        }
    }

    let _restore = Restore(SUSPENDED.with(|cell| cell.replace(true)));

    f()
}

/// Drive `future` with retries suspended for the current task.
pub async fn with_retries_suspended_async<F: Future>(future: F) -> F::Output {
    TASK_SUSPENDED.scope(true, future).await
}

///
/// ExecutionStrategy
///

#[derive(Clone)]
pub struct ExecutionStrategy {
    policy: Option<RetryPolicy>,
    classifier: Arc<dyn RetryClassifier>,
}

impl fmt::Debug for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStrategy")
            .field("policy", &self.policy)
            .field("classifier", &self.classifier)
            .finish()
    }
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl ExecutionStrategy {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: Some(policy),
            classifier: Arc::new(TransientFaultClassifier),
        }
    }

    /// Single attempt; failures propagate unchanged.
    #[must_use]
    pub fn none() -> Self {
        Self {
            policy: None,
            classifier: Arc::new(TransientFaultClassifier),
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn RetryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub const fn policy(&self) -> Option<&RetryPolicy> {
        self.policy.as_ref()
    }

    /// True when this strategy would retry a failure right now.
    #[must_use]
    pub fn retries_on_failure(&self) -> bool {
        self.policy.is_some() && !retries_suspended()
    }

    pub fn execute<C, T, F>(&self, connection: &mut C, operation: F) -> Result<T, InternalError>
    where
        C: ConnectionState + ?Sized,
        F: FnMut(&mut C) -> Result<T, InternalError>,
    {
        self.execute_with_verification(connection, operation, |_| Ok(None))
    }

    /// Like [`execute`](Self::execute), but after a transient failure
    /// `verify_succeeded` is asked whether the work landed anyway; a
    /// `Some` result is returned instead of retrying.
    pub fn execute_with_verification<C, T, F, V>(
        &self,
        connection: &mut C,
        mut operation: F,
        mut verify_succeeded: V,
    ) -> Result<T, InternalError>
    where
        C: ConnectionState + ?Sized,
        F: FnMut(&mut C) -> Result<T, InternalError>,
        V: FnMut(&mut C) -> Result<Option<T>, InternalError>,
    {
        let Some(policy) = self.policy.filter(|_| !retries_suspended()) else {
            return operation(connection);
        };
        ensure_no_ambient_transaction(connection)?;

        let mut run = RetryRun::new(policy);
        loop {
            run.begin_attempt();
            let error = match with_retries_suspended(|| operation(connection)) {
                Ok(value) => {
                    run.finish(RetryState::Succeeded);
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !self.classifier.should_retry(&error) {
                run.finish(RetryState::Faulted);
                return Err(error);
            }
            if let Some(value) = with_retries_suspended(|| verify_succeeded(connection))? {
                debug!(attempt = run.attempts, "failed attempt verified as succeeded");
                run.finish(RetryState::Succeeded);
                return Ok(value);
            }

            let delay = run.schedule_retry(error)?;
            thread::sleep(delay);
        }
    }

    pub async fn execute_async<C, T, F>(
        &self,
        connection: &mut C,
        operation: F,
        cancel: &CancellationToken,
    ) -> Result<T, InternalError>
    where
        C: ConnectionState + ?Sized,
        F: AsyncFnMut(&mut C) -> Result<T, InternalError>,
    {
        self.execute_with_verification_async(connection, operation, async |_: &mut C| Ok(None), cancel)
            .await
    }

    /// Async twin of
    /// [`execute_with_verification`](Self::execute_with_verification). A
    /// cancelled token interrupts the wait between attempts.
    pub async fn execute_with_verification_async<C, T, F, V>(
        &self,
        connection: &mut C,
        mut operation: F,
        mut verify_succeeded: V,
        cancel: &CancellationToken,
    ) -> Result<T, InternalError>
    where
        C: ConnectionState + ?Sized,
        F: AsyncFnMut(&mut C) -> Result<T, InternalError>,
        V: AsyncFnMut(&mut C) -> Result<Option<T>, InternalError>,
    {
        let Some(policy) = self.policy.filter(|_| !retries_suspended()) else {
            return operation(connection).await;
        };
        ensure_no_ambient_transaction(connection)?;

        let mut run = RetryRun::new(policy);
        loop {
            run.begin_attempt();
            let error = match with_retries_suspended_async(operation(connection)).await {
                Ok(value) => {
                    run.finish(RetryState::Succeeded);
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !self.classifier.should_retry(&error) {
                run.finish(RetryState::Faulted);
                return Err(error);
            }
            if let Some(value) =
                with_retries_suspended_async(verify_succeeded(connection)).await?
            {
                debug!(attempt = run.attempts, "failed attempt verified as succeeded");
                run.finish(RetryState::Succeeded);
                return Ok(value);
            }

            let delay = run.schedule_retry(error)?;
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    run.finish(RetryState::Faulted);
                    return Err(InternalError::cancelled("save cancelled while waiting to retry"));
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

// A retrying strategy cannot replay work done inside someone else's transaction.
fn ensure_no_ambient_transaction<C: ConnectionState + ?Sized>(
    connection: &C,
) -> Result<(), InternalError> {
    if connection.has_transaction() {
        return Err(InternalError::usage(
            ErrorOrigin::Retry,
            "the configured execution strategy does not support caller-initiated transactions; \
             run the whole unit of work through the strategy or suspend retries",
        ));
    }

    Ok(())
}

///
/// RetryRun
///
/// Bookkeeping for one strategy execution.
///

struct RetryRun {
    schedule: RetrySchedule,
    state: RetryState,
    attempts: usize,
}

impl RetryRun {
    const fn new(policy: RetryPolicy) -> Self {
        Self {
            schedule: RetrySchedule::new(policy),
            state: RetryState::Idle,
            attempts: 0,
        }
    }

    fn transition(&mut self, next: RetryState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid retry transition {} -> {next}",
            self.state
        );
        self.state = next;
    }

    fn begin_attempt(&mut self) {
        self.transition(RetryState::Running);
        self.attempts += 1;
    }

    fn finish(&mut self, state: RetryState) {
        self.transition(state);
    }

    // Next delay, or the retry-limit error wrapping `error`.
    fn schedule_retry(&mut self, error: InternalError) -> Result<Duration, InternalError> {
        let Some(delay) = self.schedule.next_delay() else {
            self.transition(RetryState::Faulted);
            sink::record(MetricsEvent::RetryLimitExceeded {
                attempts: self.attempts as u64,
            });
            warn!(attempts = self.attempts, error = %error, "retry limit exceeded");

            return Err(InternalError::retry_limit_exceeded(self.attempts, error));
        };

        self.transition(RetryState::Retrying);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        sink::record(MetricsEvent::RetryScheduled {
            attempt: self.attempts as u64,
            delay_ms,
        });
        warn!(
            attempt = self.attempts,
            delay_ms,
            error = %error,
            "transient failure, retrying save"
        );

        Ok(delay)
    }
}
