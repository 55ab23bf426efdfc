use crate::{
    error::InternalError,
    model::{
        EntityId, EntityModel, ForeignKeyId, ForeignKeyModel, KeyModel, KeyShape, Model,
        PropertyModel, TableId,
    },
    value::ValueKind,
};
use std::collections::{BTreeMap, BTreeSet};

///
/// EntityDef
///
/// Declarative entity description consumed by [`ModelBuilder`].
///

#[derive(Clone, Debug)]
pub struct EntityDef {
    name: String,
    schema: Option<String>,
    table: Option<String>,
    properties: Vec<PropertyModel>,
    key: Vec<String>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            table: None,
            properties: Vec::new(),
            key: Vec::new(),
        }
    }

    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Table name; defaults to the entity name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn property(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.push_property(name.into(), kind, false, false)
    }

    /// Property whose value is assigned by the store on insert.
    #[must_use]
    pub fn generated_property(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.push_property(name.into(), kind, true, false)
    }

    /// Property checked against its original value on update/delete.
    #[must_use]
    pub fn concurrency_token(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.push_property(name.into(), kind, false, true)
    }

    #[must_use]
    pub fn key(mut self, properties: &[&str]) -> Self {
        self.key = properties.iter().map(ToString::to_string).collect();
        self
    }

    fn push_property(
        mut self,
        name: String,
        kind: ValueKind,
        store_generated: bool,
        concurrency_token: bool,
    ) -> Self {
        self.properties.push(PropertyModel {
            column: name.clone(),
            name,
            kind,
            store_generated,
            concurrency_token,
        });
        self
    }
}

///
/// ForeignKeyDef
///

#[derive(Clone, Debug)]
pub struct ForeignKeyDef {
    name: String,
    dependent: String,
    properties: Vec<String>,
    principal: String,
    principal_properties: Option<Vec<String>>,
    unique: bool,
}

impl ForeignKeyDef {
    /// Foreign key from `dependent.properties` to the principal's primary key.
    pub fn new(
        name: impl Into<String>,
        dependent: impl Into<String>,
        properties: &[&str],
        principal: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dependent: dependent.into(),
            properties: properties.iter().map(ToString::to_string).collect(),
            principal: principal.into(),
            principal_properties: None,
            unique: false,
        }
    }

    /// Target an alternate key instead of the principal's primary key.
    #[must_use]
    pub fn principal_key(mut self, properties: &[&str]) -> Self {
        self.principal_properties = Some(properties.iter().map(ToString::to_string).collect());
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

///
/// ModelBuilder
///

#[derive(Debug, Default)]
pub struct ModelBuilder {
    entities: Vec<EntityDef>,
    foreign_keys: Vec<ForeignKeyDef>,
}

impl ModelBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entity(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    #[must_use]
    pub fn foreign_key(mut self, foreign_key: ForeignKeyDef) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Resolve names and validate every key before handing out ids.
    pub fn build(self) -> Result<Model, InternalError> {
        let mut entities = Vec::with_capacity(self.entities.len());
        let mut entity_names = BTreeMap::new();

        // Phase 1: entities and primary keys.
        for def in self.entities {
            let id = EntityId(entities.len());
            if entity_names.insert(def.name.clone(), id).is_some() {
                return Err(InternalError::model_invariant(format!(
                    "duplicate entity name '{}'",
                    def.name
                )));
            }

            let mut seen = BTreeSet::new();
            for property in &def.properties {
                if !seen.insert(property.name.as_str()) {
                    return Err(InternalError::model_invariant(format!(
                        "duplicate property '{}' on entity '{}'",
                        property.name, def.name
                    )));
                }
            }

            if def.key.is_empty() {
                return Err(InternalError::model_invariant(format!(
                    "entity '{}' has no primary key",
                    def.name
                )));
            }
            let primary_key = resolve_key(&def.name, &def.properties, &def.key)?;

            entities.push(EntityModel {
                id,
                table: TableId {
                    schema: def.schema,
                    name: def.table.unwrap_or_else(|| def.name.clone()),
                },
                name: def.name,
                properties: def.properties,
                primary_key,
            });
        }

        // Phase 2: foreign keys, resolved against both ends.
        let mut foreign_keys = Vec::with_capacity(self.foreign_keys.len());
        let mut declared = vec![Vec::new(); entities.len()];
        let mut referencing = vec![Vec::new(); entities.len()];
        let mut fk_names = BTreeSet::new();

        for def in self.foreign_keys {
            if !fk_names.insert(def.name.clone()) {
                return Err(InternalError::model_invariant(format!(
                    "duplicate foreign key name '{}'",
                    def.name
                )));
            }

            let lookup = |name: &str| {
                entity_names.get(name).copied().ok_or_else(|| {
                    InternalError::model_invariant(format!(
                        "foreign key '{}' references unknown entity '{name}'",
                        def.name
                    ))
                })
            };
            let dependent = lookup(&def.dependent)?;
            let principal = lookup(&def.principal)?;

            let dependent_model: &EntityModel = &entities[dependent.0];
            let principal_model: &EntityModel = &entities[principal.0];

            let dependent_key =
                resolve_key(&dependent_model.name, &dependent_model.properties, &def.properties)?;
            let principal_key = match &def.principal_properties {
                Some(properties) => {
                    resolve_key(&principal_model.name, &principal_model.properties, properties)?
                }
                None => principal_model.primary_key.clone(),
            };

            if dependent_key.shape != principal_key.shape {
                return Err(InternalError::model_invariant(format!(
                    "foreign key '{}' shape {} does not match principal key shape {} on '{}'",
                    def.name, dependent_key.shape, principal_key.shape, principal_model.name
                )));
            }

            let id = ForeignKeyId(foreign_keys.len());
            declared[dependent.0].push(id);
            referencing[principal.0].push(id);
            foreign_keys.push(ForeignKeyModel {
                id,
                name: def.name,
                dependent,
                properties: dependent_key.properties,
                principal,
                principal_key,
                unique: def.unique,
            });
        }

        Ok(Model {
            entities,
            foreign_keys,
            entity_names,
            declared,
            referencing,
        })
    }
}

// Resolve property names into positions and the matching key shape.
fn resolve_key(
    entity: &str,
    properties: &[PropertyModel],
    names: &[String],
) -> Result<KeyModel, InternalError> {
    if names.is_empty() {
        return Err(InternalError::model_invariant(format!(
            "empty key declared on entity '{entity}'"
        )));
    }

    let mut positions = Vec::with_capacity(names.len());
    let mut kinds = Vec::with_capacity(names.len());
    for name in names {
        let position = properties
            .iter()
            .position(|property| &property.name == name)
            .ok_or_else(|| {
                InternalError::model_invariant(format!(
                    "key references unknown property '{name}' on entity '{entity}'"
                ))
            })?;
        positions.push(position);
        kinds.push(properties[position].kind);
    }

    Ok(KeyModel {
        properties: positions,
        shape: KeyShape(kinds),
    })
}
