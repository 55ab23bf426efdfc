//! Write intents and the preparation pipeline that orders them.
//!
//! Each dirty [`TrackedEntry`](crate::entry::TrackedEntry) becomes one
//! [`WriteIntent`]. The [`CommandBatchPreparer`] links intents through their
//! foreign-key values, splits them into independent sets with a layered
//! topological sort, orders each set with [`compare_intents`], and packs the
//! result into sealed batches.

mod comparer;
mod intent;
pub mod key_index;
mod preparer;

pub use comparer::{compare_intents, sort_independent_set};
pub use intent::{ColumnModification, Operation, PropagatedValues, WriteIntent};
pub use key_index::{IndexFactory, KeyComparer, KeyValueIndex, ValueSource};
pub use preparer::{CommandBatchPreparer, PreparedCommands};
