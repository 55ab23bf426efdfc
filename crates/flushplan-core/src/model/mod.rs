//! Read-only metadata view consumed by the write-ordering engine.
//!
//! The model only carries what ordering and batching need: table identity,
//! property kinds, primary keys, and foreign keys in both directions
//! (declared on an entity, and referencing it).
//!
//! Models are assembled through [`ModelBuilder`] and validated once; every
//! id handed out by a [`Model`] indexes directly into its arenas.

mod builder;
mod entity;
mod foreign_key;

use crate::{error::InternalError, value::ValueKind};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

pub use builder::{EntityDef, ForeignKeyDef, ModelBuilder};
pub use entity::{EntityModel, KeyModel, PropertyModel};
pub use foreign_key::ForeignKeyModel;

///
/// EntityId
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("entity#{_0}")]
pub struct EntityId(pub(crate) usize);

///
/// ForeignKeyId
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("fk#{_0}")]
pub struct ForeignKeyId(pub(crate) usize);

///
/// TableId
///
/// Physical write target. `schema` is optional; an absent schema orders
/// before any named schema.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TableId {
    pub schema: Option<String>,
    pub name: String,
}

impl TableId {
    pub fn new(schema: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.map(ToString::to_string),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

///
/// KeyShape
///
/// Ordered value kinds of one key. Two keys with the same shape share one
/// comparer and one index factory.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct KeyShape(pub Vec<ValueKind>);

impl KeyShape {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({kinds})")
    }
}

///
/// Model
///

#[derive(Debug)]
pub struct Model {
    entities: Vec<EntityModel>,
    foreign_keys: Vec<ForeignKeyModel>,
    entity_names: BTreeMap<String, EntityId>,
    declared: Vec<Vec<ForeignKeyId>>,
    referencing: Vec<Vec<ForeignKeyId>>,
}

impl Model {
    #[must_use]
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new()
    }

    /// Entity by id. Ids are only minted by this model, so lookups cannot miss.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> &EntityModel {
        &self.entities[id.0]
    }

    /// Entity by id, rejecting ids that do not belong to this model.
    pub fn try_entity(&self, id: EntityId) -> Result<&EntityModel, InternalError> {
        self.entities.get(id.0).ok_or_else(|| {
            InternalError::model_invariant(format!("unknown entity id {id} for this model"))
        })
    }

    #[must_use]
    pub fn entity_id(&self, name: &str) -> Option<EntityId> {
        self.entity_names.get(name).copied()
    }

    #[must_use]
    pub fn entities(&self) -> &[EntityModel] {
        &self.entities
    }

    #[must_use]
    pub fn foreign_key(&self, id: ForeignKeyId) -> &ForeignKeyModel {
        &self.foreign_keys[id.0]
    }

    /// Foreign keys declared on `entity` (it is the dependent side).
    pub fn declared_foreign_keys(
        &self,
        entity: EntityId,
    ) -> impl Iterator<Item = &ForeignKeyModel> + '_ {
        self.declared[entity.0]
            .iter()
            .map(|id| &self.foreign_keys[id.0])
    }

    /// Foreign keys of any entity that point at `entity` (it is the principal side).
    pub fn referencing_foreign_keys(
        &self,
        entity: EntityId,
    ) -> impl Iterator<Item = &ForeignKeyModel> + '_ {
        self.referencing[entity.0]
            .iter()
            .map(|id| &self.foreign_keys[id.0])
    }
}
