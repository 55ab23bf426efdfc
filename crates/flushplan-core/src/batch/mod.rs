//! Modification batches.
//!
//! A [`ModificationBatch`] accumulates write intents until its
//! [`BatchPolicy`] refuses the next one, then is sealed into a
//! [`SealedBatch`] that travels to the store in one round-trip.

mod runner;

use crate::{command::WriteIntent, error::InternalError};
use std::{fmt, sync::Arc};

pub use runner::{AsyncBatchRunner, BatchResult, BatchRunner, ReturnedRow};

///
/// BatchPolicy
///
/// Store-specific acceptance rule. Returning `false` for a batch that is
/// still empty means the intent can never be batched.
///

pub trait BatchPolicy: fmt::Debug + Send + Sync {
    fn accepts(&self, batch: &ModificationBatch, candidate: &WriteIntent) -> bool;
}

///
/// BatchLimits
///
/// Default policy: caps the number of commands and bound parameters.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BatchLimits {
    pub max_commands: usize,
    pub max_parameters: usize,
}

impl BatchLimits {
    pub const DEFAULT_MAX_COMMANDS: usize = 128;
    pub const DEFAULT_MAX_PARAMETERS: usize = 2100;
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_commands: Self::DEFAULT_MAX_COMMANDS,
            max_parameters: Self::DEFAULT_MAX_PARAMETERS,
        }
    }
}

impl BatchPolicy for BatchLimits {
    fn accepts(&self, batch: &ModificationBatch, candidate: &WriteIntent) -> bool {
        batch.len() < self.max_commands
            && batch.parameter_count() + candidate.parameter_count() <= self.max_parameters
    }
}

///
/// ModificationBatch
///

#[derive(Debug)]
pub struct ModificationBatch {
    intents: Vec<WriteIntent>,
    parameter_count: usize,
    policy: Arc<dyn BatchPolicy>,
}

impl ModificationBatch {
    #[must_use]
    pub fn new(policy: Arc<dyn BatchPolicy>) -> Self {
        Self {
            intents: Vec::new(),
            parameter_count: 0,
            policy,
        }
    }

    /// Add `intent` if the policy accepts it; hand it back otherwise.
    #[allow(clippy::result_large_err)]
    pub fn try_add(&mut self, intent: WriteIntent) -> Result<(), WriteIntent> {
        if !self.policy.accepts(self, &intent) {
            return Err(intent);
        }

        self.parameter_count += intent.parameter_count();
        self.intents.push(intent);

        Ok(())
    }

    #[must_use]
    pub fn intents(&self) -> &[WriteIntent] {
        &self.intents
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.intents.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    #[must_use]
    pub const fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Freeze the batch for execution.
    pub fn seal(self) -> Result<SealedBatch, InternalError> {
        if self.intents.is_empty() {
            return Err(InternalError::batch_invariant(
                "attempted to seal an empty modification batch",
            ));
        }

        Ok(SealedBatch {
            intents: self.intents,
            parameter_count: self.parameter_count,
        })
    }
}

///
/// SealedBatch
///
/// Immutable, non-empty run of intents executed in one round-trip. Every
/// intent is expected to affect exactly one row.
///

#[derive(Clone, Debug)]
pub struct SealedBatch {
    intents: Vec<WriteIntent>,
    parameter_count: usize,
}

impl SealedBatch {
    #[must_use]
    pub fn intents(&self) -> &[WriteIntent] {
        &self.intents
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.intents.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    #[must_use]
    pub const fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Rows this batch must affect to pass the concurrency check.
    #[must_use]
    pub const fn expected_rows(&self) -> usize {
        self.intents.len()
    }

    pub fn execute<C, R>(&self, runner: &R, connection: &mut C) -> Result<BatchResult, InternalError>
    where
        C: ?Sized,
        R: BatchRunner<C> + ?Sized,
    {
        runner.run(self, connection)
    }

    pub async fn execute_async<C, R>(
        &self,
        runner: &R,
        connection: &mut C,
    ) -> Result<BatchResult, InternalError>
    where
        C: Send + ?Sized,
        R: AsyncBatchRunner<C> + ?Sized,
    {
        runner.run(self, connection).await
    }
}
