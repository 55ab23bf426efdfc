use crate::{
    entry::{EntryState, TrackedEntry},
    error::InternalError,
    model::{EntityId, EntityModel, TableId},
    value::Value,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// Operation
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// Map a tracked state onto the physical operation it requires.
    pub fn from_state(state: EntryState) -> Result<Self, InternalError> {
        match state {
            EntryState::Added => Ok(Self::Insert),
            EntryState::Modified => Ok(Self::Update),
            EntryState::Deleted => Ok(Self::Delete),
            EntryState::Detached | EntryState::Unchanged => Err(
                InternalError::command_invariant(format!(
                    "cannot build a write intent for an entry in state {state}"
                )),
            ),
        }
    }

    // Deletes first, inserts last.
    pub(crate) const fn precedence(self) -> u8 {
        match self {
            Self::Delete => 0,
            Self::Update => 1,
            Self::Insert => 2,
        }
    }
}

///
/// ColumnModification
///
/// One column's role in a write. `is_write` columns travel in the payload,
/// `is_read` columns come back from the store, `is_key`/`is_condition`
/// columns form the WHERE clause of updates and deletes (using `original`).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnModification {
    pub column: String,
    pub property: usize,
    pub is_read: bool,
    pub is_write: bool,
    pub is_key: bool,
    pub is_condition: bool,
    pub original: Value,
    pub value: Value,
}

impl ColumnModification {
    // Parameters this column binds into the statement.
    const fn parameter_count(&self) -> usize {
        (self.is_write as usize) + (self.is_condition as usize)
    }
}

///
/// WriteIntent
///
/// Immutable description of one pending row mutation, built once per
/// tracked entry at the start of a save attempt.
///

#[derive(Clone, Debug)]
pub struct WriteIntent {
    entry_index: usize,
    entity: EntityId,
    operation: Operation,
    table: TableId,
    columns: Vec<ColumnModification>,
    current: Vec<Value>,
    original: Vec<Value>,
    modified: Vec<bool>,
    key: Vec<Value>,
}

impl WriteIntent {
    /// Build the intent for `entry`, the `entry_index`-th record of the save.
    pub fn new(
        entry_index: usize,
        entry: &TrackedEntry,
        entity: &EntityModel,
    ) -> Result<Self, InternalError> {
        let operation = Operation::from_state(entry.state)?;
        if entry.entity != entity.id {
            return Err(InternalError::command_invariant(format!(
                "tracked entry #{entry_index} belongs to {} but was paired with '{}'",
                entry.entity, entity.name
            )));
        }

        let mut columns = Vec::with_capacity(entity.properties.len());
        for (position, property) in entity.properties.iter().enumerate() {
            let is_key = entity.primary_key.contains(position);
            let modified = entry.is_modified(position);

            if operation == Operation::Update && is_key && modified {
                return Err(InternalError::command_invariant(format!(
                    "primary key property '{}' of '{}' changed on a modified entry; key changes must be saved as a delete plus an insert",
                    property.name, entity.name
                )));
            }

            let (is_read, is_write, is_condition) = match operation {
                Operation::Insert => (property.store_generated, !property.store_generated, false),
                Operation::Update => (false, modified, is_key || property.concurrency_token),
                Operation::Delete => (false, false, is_key || property.concurrency_token),
            };
            if !(is_read || is_write || is_condition) {
                continue;
            }

            columns.push(ColumnModification {
                column: property.column.clone(),
                property: position,
                is_read,
                is_write,
                is_key,
                is_condition,
                original: entry.original[position].clone(),
                value: entry.current[position].clone(),
            });
        }

        let source = if operation == Operation::Delete {
            &entry.original
        } else {
            &entry.current
        };
        let key = entity
            .primary_key
            .properties
            .iter()
            .map(|position| source[*position].clone())
            .collect();

        Ok(Self {
            entry_index,
            entity: entity.id,
            operation,
            table: entity.table.clone(),
            columns,
            current: entry.current.clone(),
            original: entry.original.clone(),
            modified: entry.modified.clone(),
            key,
        })
    }

    #[must_use]
    pub const fn entry_index(&self) -> usize {
        self.entry_index
    }

    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    #[must_use]
    pub const fn table(&self) -> &TableId {
        &self.table
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnModification] {
        &self.columns
    }

    /// Primary-key values identifying the row (original values for deletes).
    #[must_use]
    pub fn key_values(&self) -> &[Value] {
        &self.key
    }

    #[must_use]
    pub fn current_value(&self, property: usize) -> Option<&Value> {
        self.current.get(property)
    }

    #[must_use]
    pub fn original_value(&self, property: usize) -> Option<&Value> {
        self.original.get(property)
    }

    #[must_use]
    pub fn is_modified(&self, property: usize) -> bool {
        self.modified.get(property).copied().unwrap_or(false)
    }

    /// True when any of `properties` changed in this write.
    #[must_use]
    pub fn any_modified(&self, properties: &[usize]) -> bool {
        properties.iter().any(|property| self.is_modified(*property))
    }

    /// An update that writes nothing is elided before ordering.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.operation == Operation::Update && !self.columns.iter().any(|column| column.is_write)
    }

    /// Statement parameters bound by this write.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.columns
            .iter()
            .map(ColumnModification::parameter_count)
            .sum()
    }

    pub fn read_columns(&self) -> impl Iterator<Item = &ColumnModification> {
        self.columns.iter().filter(|column| column.is_read)
    }

    /// Map values returned by the store onto this intent's read columns.
    ///
    /// The intent itself is left untouched; the caller writes the returned
    /// values back into its tracked entries.
    pub fn propagate_results(&self, values: Vec<Value>) -> Result<PropagatedValues, InternalError> {
        let read_count = self.read_columns().count();
        if values.len() != read_count {
            return Err(InternalError::executor_invariant(format!(
                "store returned {} value(s) for {} read column(s) of {} on {}",
                values.len(),
                read_count,
                self.operation,
                self.table,
            )));
        }

        let values = self
            .read_columns()
            .map(|column| column.property)
            .zip(values)
            .collect();

        Ok(PropagatedValues {
            entry_index: self.entry_index,
            entity: self.entity,
            values,
        })
    }
}

///
/// PropagatedValues
///
/// Store-generated values for one tracked entry, keyed by property position.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropagatedValues {
    pub entry_index: usize,
    pub entity: EntityId,
    pub values: Vec<(usize, Value)>,
}
