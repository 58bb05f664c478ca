//! Entity descriptor: the static shape of one persisted record type.
//!
//! # Responsibility
//! - Declare fields with semantic type and nullability.
//! - Declare the primary key field and outgoing relations.
//!
//! # Invariants
//! - Immutable once registered with the catalog.
//! - The primary key must be a declared, non-nullable field.

use serde::{Deserialize, Serialize};

/// Semantic type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Text,
}

/// One declared field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

/// One named relation to another entity, resolved through an explicit
/// foreign-key field. Dotted field paths (`team.name`) hop through the
/// relation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation name used in dotted paths and fetch lists.
    pub name: String,
    /// Local field holding the target key value.
    pub local_key: String,
    /// Target entity name.
    pub target_entity: String,
    /// Key field on the target entity, usually its primary key.
    pub target_key: String,
}

/// Static schema definition for one persisted record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    name: String,
    primary_key: String,
    fields: Vec<FieldDef>,
    relations: Vec<RelationDef>,
}

impl EntityDescriptor {
    /// Starts a descriptor for `name` keyed by `primary_key`.
    ///
    /// The primary key field itself must still be declared via
    /// [`field`](Self::field); the catalog rejects descriptors whose
    /// key is undeclared or nullable.
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Declares one field.
    pub fn field(mut self, name: &str, field_type: FieldType, nullable: bool) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            field_type,
            nullable,
        });
        self
    }

    /// Declares one relation hop to another entity.
    pub fn relation(mut self, name: &str, local_key: &str, target_entity: &str, target_key: &str) -> Self {
        self.relations.push(RelationDef {
            name: name.to_string(),
            local_key: local_key.to_string(),
            target_entity: target_entity.to_string(),
            target_key: target_key.to_string(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    /// Finds a declared field by name.
    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Finds a declared relation by name.
    pub fn find_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|relation| relation.name == name)
    }
}
