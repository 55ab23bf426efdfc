//! Tracked-entry boundary.
//!
//! Change detection lives outside this crate. Callers hand the engine a
//! finished list of [`TrackedEntry`] records; value vectors follow the
//! owning entity's property order.

use crate::{
    error::InternalError,
    model::{EntityId, EntityModel, Model},
    value::Value,
};
use derive_more::Display;

///
/// EntryState
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum EntryState {
    Detached,
    Unchanged,
    Added,
    Modified,
    Deleted,
}

///
/// TrackedEntry
///
/// One dirty row as reported by the change tracker.
///

#[derive(Clone, Debug)]
pub struct TrackedEntry {
    pub entity: EntityId,
    pub state: EntryState,
    pub current: Vec<Value>,
    pub original: Vec<Value>,
    pub modified: Vec<bool>,
}

impl TrackedEntry {
    /// New row; original values mirror current values.
    #[must_use]
    pub fn added(entity: EntityId, current: Vec<Value>) -> Self {
        let modified = vec![false; current.len()];

        Self {
            entity,
            state: EntryState::Added,
            original: current.clone(),
            current,
            modified,
        }
    }

    /// Existing row with changed values; modified flags are derived by comparison.
    #[must_use]
    pub fn modified(entity: EntityId, original: Vec<Value>, current: Vec<Value>) -> Self {
        let modified = original
            .iter()
            .zip(current.iter())
            .map(|(before, after)| before != after)
            .collect();

        Self {
            entity,
            state: EntryState::Modified,
            current,
            original,
            modified,
        }
    }

    /// Row scheduled for removal; current values mirror original values.
    #[must_use]
    pub fn deleted(entity: EntityId, original: Vec<Value>) -> Self {
        let modified = vec![false; original.len()];

        Self {
            entity,
            state: EntryState::Deleted,
            current: original.clone(),
            original,
            modified,
        }
    }

    #[must_use]
    pub fn is_modified(&self, property: usize) -> bool {
        self.modified.get(property).copied().unwrap_or(false)
    }

    /// Check value vectors against the entity model before intents are built.
    pub(crate) fn validate<'m>(&self, model: &'m Model) -> Result<&'m EntityModel, InternalError> {
        let entity = model.try_entity(self.entity)?;
        let expected = entity.properties.len();

        if self.current.len() != expected
            || self.original.len() != expected
            || self.modified.len() != expected
        {
            return Err(InternalError::command_invariant(format!(
                "tracked entry for '{}' carries {}/{}/{} current/original/modified slots, expected {expected}",
                entity.name,
                self.current.len(),
                self.original.len(),
                self.modified.len(),
            )));
        }

        for (position, property) in entity.properties.iter().enumerate() {
            for value in [&self.current[position], &self.original[position]] {
                if let Some(kind) = value.kind()
                    && kind != property.kind
                {
                    return Err(InternalError::command_invariant(format!(
                        "tracked entry for '{}' holds {kind} in {} property '{}'",
                        entity.name, property.kind, property.name,
                    )));
                }
            }
        }

        Ok(entity)
    }
}
