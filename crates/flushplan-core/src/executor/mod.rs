//! Batch execution under a single transaction scope.
//!
//! The executor owns connection lifecycle for one save attempt: it decides
//! whether to start a transaction, runs sealed batches strictly in order,
//! commits only when every batch succeeded, and always releases what it
//! acquired through a drop guard.

mod connection;
#[cfg(test)]
mod tests;

use crate::{
    batch::{AsyncBatchRunner, BatchResult, BatchRunner, SealedBatch},
    command::PropagatedValues,
    error::InternalError,
    obs::sink::{self, MetricsEvent},
};
use derive_more::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use connection::{AsyncConnection, Connection, ConnectionState};

///
/// TransactionScope
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum TransactionScope {
    /// No transaction; each statement commits on its own.
    None,
    /// The caller already started a transaction; it is never committed or
    /// disposed here.
    AmbientExternal,
    /// The executor started the transaction and owns commit and disposal.
    OwnedByExecutor,
}

///
/// SaveOutcome
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SaveOutcome {
    /// Sum of intent counts across executed batches.
    pub rows_affected: usize,
    pub transaction: TransactionScope,
    pub batches: usize,
    /// Store-generated values to write back into tracked entries.
    pub propagated: Vec<PropagatedValues>,
}

impl SaveOutcome {
    const fn new(transaction: TransactionScope) -> Self {
        Self {
            rows_affected: 0,
            transaction,
            batches: 0,
            propagated: Vec::new(),
        }
    }

    // Fold one batch result in, enforcing the row-count check.
    fn absorb(&mut self, batch: &SealedBatch, result: BatchResult) -> Result<(), InternalError> {
        let expected = batch.expected_rows();
        if result.rows_affected < expected {
            sink::record(MetricsEvent::ConcurrencyConflict {
                expected: expected as u64,
                actual: result.rows_affected as u64,
            });
            return Err(InternalError::concurrency_conflict(
                expected,
                result.rows_affected,
            ));
        }
        if result.rows_affected > expected {
            return Err(InternalError::executor_invariant(format!(
                "batch of {expected} write(s) reported {} affected rows",
                result.rows_affected
            )));
        }

        for row in result.returned {
            let intent = batch.intents().get(row.position).ok_or_else(|| {
                InternalError::executor_invariant(format!(
                    "store returned values for position {} of a {expected}-write batch",
                    row.position
                ))
            })?;
            self.propagated.push(intent.propagate_results(row.values)?);
        }

        for intent in batch.intents() {
            sink::record(MetricsEvent::WriteApplied {
                table: intent.table(),
                operation: intent.operation(),
            });
        }
        sink::record(MetricsEvent::BatchExecuted {
            commands: expected as u64,
            parameters: batch.parameter_count() as u64,
        });

        self.rows_affected += expected;
        self.batches += 1;

        Ok(())
    }
}

///
/// BatchExecutor
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BatchExecutor {
    auto_transactions: bool,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl BatchExecutor {
    #[must_use]
    pub const fn new(auto_transactions: bool) -> Self {
        Self { auto_transactions }
    }

    #[must_use]
    pub const fn auto_transactions(&self) -> bool {
        self.auto_transactions
    }

    /// Decide who owns the transaction for this call.
    #[must_use]
    pub const fn resolve_scope(&self, has_transaction: bool) -> TransactionScope {
        if has_transaction {
            TransactionScope::AmbientExternal
        } else if self.auto_transactions {
            TransactionScope::OwnedByExecutor
        } else {
            TransactionScope::None
        }
    }

    /// Execute `batches` in order against `connection`. An empty plan never
    /// touches the connection.
    pub fn execute<C, R>(
        &self,
        batches: &[SealedBatch],
        runner: &R,
        connection: &mut C,
    ) -> Result<SaveOutcome, InternalError>
    where
        C: Connection + ?Sized,
        R: BatchRunner<C> + ?Sized,
    {
        let scope = self.resolve_scope(connection.has_transaction());
        if batches.is_empty() {
            return Ok(SaveOutcome::new(scope));
        }
        let mut guard = ConnectionGuard::new(connection);

        guard.opened = guard.connection.open()?;
        if scope == TransactionScope::OwnedByExecutor {
            guard.connection.begin_transaction()?;
            guard.owns_transaction = true;
        }

        let mut outcome = SaveOutcome::new(scope);
        for (position, batch) in batches.iter().enumerate() {
            debug!(position, commands = batch.len(), "executing batch");
            let result = batch.execute(runner, &mut *guard.connection)?;
            outcome.absorb(batch, result)?;
        }

        if guard.owns_transaction {
            guard.connection.commit_transaction()?;
            guard.mark_committed(&outcome);
        }

        Ok(outcome)
    }

    /// Async twin of [`execute`](Self::execute); `cancel` is checked before
    /// every batch.
    pub async fn execute_async<C, R>(
        &self,
        batches: &[SealedBatch],
        runner: &R,
        connection: &mut C,
        cancel: &CancellationToken,
    ) -> Result<SaveOutcome, InternalError>
    where
        C: AsyncConnection + ?Sized,
        R: AsyncBatchRunner<C> + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(InternalError::cancelled("save cancelled before execution started"));
        }

        let scope = self.resolve_scope(connection.has_transaction());
        if batches.is_empty() {
            return Ok(SaveOutcome::new(scope));
        }
        let mut guard = ConnectionGuard::new(connection);

        guard.opened = guard.connection.open().await?;
        if scope == TransactionScope::OwnedByExecutor {
            guard.connection.begin_transaction().await?;
            guard.owns_transaction = true;
        }

        let mut outcome = SaveOutcome::new(scope);
        for (position, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(InternalError::cancelled(format!(
                    "save cancelled before batch {} of {}",
                    position + 1,
                    batches.len()
                )));
            }

            debug!(position, commands = batch.len(), "executing batch");
            let result = batch.execute_async(runner, &mut *guard.connection).await?;
            outcome.absorb(batch, result)?;
        }

        if guard.owns_transaction {
            guard.connection.commit_transaction().await?;
            guard.mark_committed(&outcome);
        }

        Ok(outcome)
    }
}

///
/// ConnectionGuard
///
/// Releases whatever one executor call acquired: the transaction it began
/// (rolled back unless committed) and the connection it opened.
///

struct ConnectionGuard<'c, C: ConnectionState + ?Sized> {
    connection: &'c mut C,
    opened: bool,
    owns_transaction: bool,
    committed: bool,
}

impl<'c, C: ConnectionState + ?Sized> ConnectionGuard<'c, C> {
    const fn new(connection: &'c mut C) -> Self {
        Self {
            connection,
            opened: false,
            owns_transaction: false,
            committed: false,
        }
    }

    fn mark_committed(&mut self, outcome: &SaveOutcome) {
        self.committed = true;
        sink::record(MetricsEvent::TransactionCommitted);
        info!(
            rows_affected = outcome.rows_affected,
            batches = outcome.batches,
            "committed save transaction"
        );
    }
}

impl<C: ConnectionState + ?Sized> Drop for ConnectionGuard<'_, C> {
    fn drop(&mut self) {
        if self.owns_transaction {
            if !self.committed {
                debug!("disposing uncommitted save transaction");
            }
            self.connection.dispose_transaction();
            sink::record(MetricsEvent::TransactionDisposed {
                committed: self.committed,
            });
        }
        if self.opened {
            self.connection.close();
        }
    }
}
