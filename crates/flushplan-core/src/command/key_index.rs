//! Key-value indexes used to match principal rows against their dependents.
//!
//! An index captures the values of one foreign key's columns (dependent
//! side) or of the key it targets (principal side), tagged with whether the
//! values were taken from the original or current snapshot. Two indexes are
//! equal only when foreign key, tag, and values all match.

use crate::{
    command::WriteIntent,
    error::InternalError,
    model::{ForeignKeyId, ForeignKeyModel, KeyShape},
    value::{Value, canonical_cmp_tuple},
};
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, LazyLock, PoisonError, RwLock},
};

// Factories are shared per key shape for the life of the process.
static FACTORIES: LazyLock<RwLock<HashMap<KeyShape, Arc<IndexFactory>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

///
/// ValueSource
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueSource {
    Current,
    Original,
}

impl ValueSource {
    const fn is_original(self) -> bool {
        matches!(self, Self::Original)
    }
}

///
/// KeyValueIndex
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct KeyValueIndex {
    foreign_key: ForeignKeyId,
    from_original: bool,
    values: Vec<Value>,
}

impl KeyValueIndex {
    #[must_use]
    pub const fn foreign_key(&self) -> ForeignKeyId {
        self.foreign_key
    }

    #[must_use]
    pub const fn is_from_original(&self) -> bool {
        self.from_original
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Same key, tagged as taken from original values.
    #[must_use]
    pub fn with_original_values_flag(&self) -> Self {
        Self {
            foreign_key: self.foreign_key,
            from_original: true,
            values: self.values.clone(),
        }
    }
}

///
/// KeyComparer
///
/// Typed equality and ordering for one key shape. Values are checked
/// against the shape before they are compared, so an `Int(1)` never
/// matches a `Uint(1)`.
///

#[derive(Clone, Debug)]
pub struct KeyComparer {
    shape: KeyShape,
}

impl KeyComparer {
    #[must_use]
    pub const fn new(shape: KeyShape) -> Self {
        Self { shape }
    }

    #[must_use]
    pub const fn shape(&self) -> &KeyShape {
        &self.shape
    }

    /// Validate a value tuple. Returns `None` when any component is null.
    pub fn check(&self, values: Vec<Value>) -> Result<Option<Vec<Value>>, InternalError> {
        if values.len() != self.shape.len() {
            return Err(InternalError::command_invariant(format!(
                "key of shape {} received {} value(s)",
                self.shape,
                values.len()
            )));
        }

        for (value, expected) in values.iter().zip(self.shape.0.iter()) {
            match value.kind() {
                None => return Ok(None),
                Some(kind) if kind != *expected => {
                    return Err(InternalError::command_invariant(format!(
                        "key of shape {} received {kind} where {expected} was declared",
                        self.shape
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(Some(values))
    }

    #[must_use]
    pub fn equals(&self, left: &[Value], right: &[Value]) -> bool {
        left.len() == self.shape.len() && left == right
    }

    #[must_use]
    pub fn compare(&self, left: &[Value], right: &[Value]) -> Ordering {
        canonical_cmp_tuple(left, right)
    }
}

///
/// IndexFactory
///
/// Builds principal- and dependent-side indexes for foreign keys whose
/// principal key has this factory's shape.
///

#[derive(Debug)]
pub struct IndexFactory {
    comparer: KeyComparer,
}

impl IndexFactory {
    /// Shared factory for `shape`, created on first use.
    #[must_use]
    pub fn get(shape: &KeyShape) -> Arc<Self> {
        if let Some(factory) = FACTORIES
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(shape)
        {
            return Arc::clone(factory);
        }

        let mut factories = FACTORIES.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(factories.entry(shape.clone()).or_insert_with(|| {
            Arc::new(Self {
                comparer: KeyComparer::new(shape.clone()),
            })
        }))
    }

    #[must_use]
    pub const fn comparer(&self) -> &KeyComparer {
        &self.comparer
    }

    /// Index over the principal-key values of `intent`.
    pub fn principal_index(
        &self,
        intent: &WriteIntent,
        foreign_key: &ForeignKeyModel,
        source: ValueSource,
    ) -> Result<Option<KeyValueIndex>, InternalError> {
        self.index(foreign_key, &foreign_key.principal_key.properties, intent, source)
    }

    /// Index over the foreign-key values of `intent`.
    pub fn dependent_index(
        &self,
        intent: &WriteIntent,
        foreign_key: &ForeignKeyModel,
        source: ValueSource,
    ) -> Result<Option<KeyValueIndex>, InternalError> {
        self.index(foreign_key, &foreign_key.properties, intent, source)
    }

    fn index(
        &self,
        foreign_key: &ForeignKeyModel,
        properties: &[usize],
        intent: &WriteIntent,
        source: ValueSource,
    ) -> Result<Option<KeyValueIndex>, InternalError> {
        let mut values = Vec::with_capacity(properties.len());
        for property in properties {
            let value = match source {
                ValueSource::Current => intent.current_value(*property),
                ValueSource::Original => intent.original_value(*property),
            };
            let value = value.ok_or_else(|| {
                InternalError::command_invariant(format!(
                    "foreign key '{}' references property #{property} missing from the write",
                    foreign_key.name
                ))
            })?;
            values.push(value.clone());
        }

        Ok(self.comparer.check(values)?.map(|values| KeyValueIndex {
            foreign_key: foreign_key.id,
            from_original: source.is_original(),
            values,
        }))
    }
}

#[cfg(test)]
fn cached_factory_count() -> usize {
    FACTORIES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .len()
}

///
/// TESTS
///
