use crate::error::{InternalError, StoreFaultKind};
use derive_more::Display;
use std::{fmt, time::Duration};

///
/// RetryClassifier
///
/// Decides whether a failed attempt is worth repeating.
///

pub trait RetryClassifier: fmt::Debug + Send + Sync {
    fn should_retry(&self, error: &InternalError) -> bool;
}

///
/// TransientFaultClassifier
///
/// Retries store faults that usually clear on their own: timeouts,
/// deadlock victims and dropped connections. Everything else is fatal.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct TransientFaultClassifier;

impl RetryClassifier for TransientFaultClassifier {
    fn should_retry(&self, error: &InternalError) -> bool {
        error.store_fault().is_some_and(|fault| {
            matches!(
                fault.kind,
                StoreFaultKind::Timeout | StoreFaultKind::Deadlock | StoreFaultKind::ConnectionReset
            )
        })
    }
}

///
/// RetryPolicy
///
/// Exponential backoff: the n-th retry waits
/// `coefficient * (exponential_base^n - 1)`, stretched by a random factor in
/// `[1, random_factor)` and capped at `max_retry_delay`.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retry_count: usize,
    pub max_retry_delay: Duration,
    pub coefficient: Duration,
    pub exponential_base: f64,
    pub random_factor: f64,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRY_COUNT: usize = 6;
    pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
    pub const DEFAULT_COEFFICIENT: Duration = Duration::from_secs(1);
    pub const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;
    pub const DEFAULT_RANDOM_FACTOR: f64 = 1.1;

    /// Delay before retry number `retry` (zero-based), given a jitter sample
    /// in `[0, 1)`.
    #[must_use]
    pub fn delay_for(&self, retry: usize, jitter: f64) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let stretch = jitter.mul_add(self.random_factor - 1.0, 1.0);
        let seconds = self.coefficient.as_secs_f64()
            * (self.exponential_base.powi(exponent) - 1.0)
            * stretch;

        Duration::try_from_secs_f64(seconds)
            .unwrap_or(self.max_retry_delay)
            .min(self.max_retry_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_count: Self::DEFAULT_MAX_RETRY_COUNT,
            max_retry_delay: Self::DEFAULT_MAX_RETRY_DELAY,
            coefficient: Self::DEFAULT_COEFFICIENT,
            exponential_base: Self::DEFAULT_EXPONENTIAL_BASE,
            random_factor: Self::DEFAULT_RANDOM_FACTOR,
        }
    }
}

///
/// RetrySchedule
///
/// Per-execution cursor over a [`RetryPolicy`].
///

#[derive(Clone, Debug)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    retries: usize,
}

impl RetrySchedule {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    #[must_use]
    pub const fn retries(&self) -> usize {
        self.retries
    }

    /// Delay before the next retry, or `None` once the retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.next_delay_with(rand::random::<f64>())
    }

    pub(crate) fn next_delay_with(&mut self, jitter: f64) -> Option<Duration> {
        if self.retries >= self.policy.max_retry_count {
            return None;
        }
        let delay = self.policy.delay_for(self.retries, jitter);
        self.retries += 1;

        Some(delay)
    }
}

///
/// RetryState
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum RetryState {
    Idle,
    Running,
    Succeeded,
    Retrying,
    Faulted,
}

impl RetryState {
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Retrying, Self::Running)
                | (Self::Running, Self::Succeeded | Self::Retrying | Self::Faulted)
                | (Self::Retrying, Self::Faulted)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Faulted)
    }
}
