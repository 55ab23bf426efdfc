//! Core engine for flushplan: turns tracked entity changes into
//! foreign-key-safe, batched writes and executes them under one transaction,
//! retrying the whole unit on transient store faults.
//!
//! Pipeline: `entry` -> `command` (intents, dependency graph, ordering) ->
//! `batch` -> `executor`, wrapped by `retry` and driven from `save`.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod batch;
pub mod command;
pub mod config;
pub mod entry;
pub mod error;
pub mod executor;
pub mod graph;
pub mod model;
pub mod obs;
pub mod retry;
pub mod save;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Domain vocabulary needed to describe a model and hand over changes.
///

pub mod prelude {
    pub use crate::{
        config::SaveConfig,
        entry::{EntryState, TrackedEntry},
        model::{EntityDef, ForeignKeyDef, Model},
        save::SavePipeline,
        value::{Value, ValueKind},
    };
}
