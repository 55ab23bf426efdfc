//! ## Crate layout
//! - `core`: the write-ordering engine (model, commands, batching,
//!   execution, retries, observability).
//! - `error`: stable public error taxonomy.
//!
//! Describe entities and foreign keys with a [`Model`](core::model::Model),
//! hand tracked changes to a [`SavePipeline`](core::save::SavePipeline), and
//! plug in the store through the `Connection` and `BatchRunner` traits.

pub use flushplan_core as core;

pub mod error;

pub use error::Error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate-level result using the public [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

///
/// Prelude
/// Everything needed to wire a store into the engine.
///

pub mod prelude {
    pub use crate::core::{
        batch::{AsyncBatchRunner, BatchLimits, BatchResult, BatchRunner, SealedBatch},
        command::{ColumnModification, Operation, WriteIntent},
        config::SaveConfig,
        entry::{EntryState, TrackedEntry},
        executor::{AsyncConnection, Connection, ConnectionState, SaveOutcome, TransactionScope},
        model::{EntityDef, ForeignKeyDef, Model},
        retry::{ExecutionStrategy, RetryPolicy},
        save::SavePipeline,
        value::{Value, ValueKind},
    };
    pub use crate::error::{Error, ErrorKind};
}
