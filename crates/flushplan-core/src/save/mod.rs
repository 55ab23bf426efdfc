//! End-to-end save: prepare, execute, and retry as one unit.
//!
//! Every attempt rebuilds intents, the dependency graph and batches from the
//! tracked entries, so a retry never reuses state from a failed attempt.


use crate::{
    batch::{AsyncBatchRunner, BatchPolicy, BatchRunner},
    command::CommandBatchPreparer,
    config::SaveConfig,
    entry::TrackedEntry,
    error::InternalError,
    executor::{AsyncConnection, BatchExecutor, Connection, SaveOutcome},
    model::Model,
    obs::sink::Span,
    retry::ExecutionStrategy,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

///
/// SavePipeline
///

#[derive(Clone, Debug)]
pub struct SavePipeline<'m> {
    preparer: CommandBatchPreparer<'m>,
    executor: BatchExecutor,
    strategy: ExecutionStrategy,
}

impl<'m> SavePipeline<'m> {
    #[must_use]
    pub fn new(model: &'m Model, config: &SaveConfig) -> Self {
        let strategy = config
            .retry
            .policy()
            .map_or_else(ExecutionStrategy::none, ExecutionStrategy::new);

        Self {
            preparer: CommandBatchPreparer::new(model, Arc::new(config.batch.limits())),
            executor: BatchExecutor::new(config.executor.auto_transactions),
            strategy,
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_batch_policy(mut self, policy: Arc<dyn BatchPolicy>) -> Self {
        self.preparer = CommandBatchPreparer::new(self.preparer.model(), policy);
        self
    }

    #[must_use]
    pub const fn preparer(&self) -> &CommandBatchPreparer<'m> {
        &self.preparer
    }

    #[must_use]
    pub const fn executor(&self) -> &BatchExecutor {
        &self.executor
    }

    #[must_use]
    pub const fn strategy(&self) -> &ExecutionStrategy {
        &self.strategy
    }

    /// Persist `entries` through `runner` on `connection`.
    pub fn save<C, R>(
        &self,
        entries: &[TrackedEntry],
        runner: &R,
        connection: &mut C,
    ) -> Result<SaveOutcome, InternalError>
    where
        C: Connection + ?Sized,
        R: BatchRunner<C> + ?Sized,
    {
        let mut span = Span::new();
        debug!(entries = entries.len(), "saving tracked entries");

        let outcome = self.strategy.execute(connection, |connection| {
            let prepared = self.preparer.batch_commands(entries)?;
            self.executor.execute(&prepared.batches, runner, connection)
        })?;
        span.succeed(outcome.rows_affected as u64);

        Ok(outcome)
    }

    pub async fn save_async<C, R>(
        &self,
        entries: &[TrackedEntry],
        runner: &R,
        connection: &mut C,
        cancel: &CancellationToken,
    ) -> Result<SaveOutcome, InternalError>
    where
        C: AsyncConnection + ?Sized,
        R: AsyncBatchRunner<C> + ?Sized,
    {
        let mut span = Span::new();
        debug!(entries = entries.len(), "saving tracked entries");

        let outcome = self
            .strategy
            .execute_async(
                connection,
                async |connection: &mut C| {
                    let prepared = self.preparer.batch_commands(entries)?;
                    self.executor
                        .execute_async(&prepared.batches, runner, connection, cancel)
                        .await
                },
                cancel,
            )
            .await?;
        span.succeed(outcome.rows_affected as u64);

        Ok(outcome)
    }
}
