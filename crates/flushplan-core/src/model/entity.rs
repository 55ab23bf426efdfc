use crate::{
    model::{EntityId, KeyShape, TableId},
    value::ValueKind,
};

///
/// EntityModel
/// Runtime model for one entity type mapped to one table.
///

#[derive(Debug)]
pub struct EntityModel {
    pub id: EntityId,
    /// Stable name used in diagnostics and cycle reports.
    pub name: String,
    pub table: TableId,
    /// Ordered property list; tracked-entry value vectors follow this order.
    pub properties: Vec<PropertyModel>,
    pub primary_key: KeyModel,
}

impl EntityModel {
    #[must_use]
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|property| property.name == name)
    }
}

///
/// PropertyModel
///

#[derive(Clone, Debug)]
pub struct PropertyModel {
    pub name: String,
    pub column: String,
    pub kind: ValueKind,

    /// Value is produced by the store on insert and read back afterwards.
    pub store_generated: bool,

    /// Original value participates in the WHERE clause of updates and deletes.
    pub concurrency_token: bool,
}

///
/// KeyModel
///
/// Ordered property positions of a primary or principal key, plus the
/// value shape used to select its comparer.
///

#[derive(Clone, Debug)]
pub struct KeyModel {
    pub properties: Vec<usize>,
    pub shape: KeyShape,
}

impl KeyModel {
    #[must_use]
    pub fn contains(&self, property: usize) -> bool {
        self.properties.contains(&property)
    }
}
