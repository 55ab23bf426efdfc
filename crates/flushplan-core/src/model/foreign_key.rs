use crate::model::{EntityId, ForeignKeyId, KeyModel};

///
/// ForeignKeyModel
///
/// Relationship from the dependent entity's `properties` to the principal
/// entity's `principal_key`. Property lists are positionally aligned.
///

#[derive(Debug)]
pub struct ForeignKeyModel {
    pub id: ForeignKeyId,
    pub name: String,
    pub dependent: EntityId,
    pub properties: Vec<usize>,
    pub principal: EntityId,
    pub principal_key: KeyModel,

    /// At most one dependent row may reference a given principal value.
    pub unique: bool,
}

impl ForeignKeyModel {
    /// True when the dependent-side property at `property` is part of this key.
    #[must_use]
    pub fn covers_dependent(&self, property: usize) -> bool {
        self.properties.contains(&property)
    }

    #[must_use]
    pub const fn is_self_referencing(&self) -> bool {
        self.dependent.0 == self.principal.0
    }
}
