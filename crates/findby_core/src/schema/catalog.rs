//! Schema catalog: registration and field-path resolution.
//!
//! # Responsibility
//! - Own all registered entity descriptors.
//! - Resolve dotted field paths through relation hops.
//!
//! # Invariants
//! - Registration is startup-only; lookups never mutate.
//! - Relation targets are resolved at lookup time, so mutually related
//!   entities may register in any order.

use crate::schema::descriptor::{EntityDescriptor, FieldDef, RelationDef};
use crate::schema::{SchemaError, SchemaResult};
use log::info;
use std::collections::BTreeMap;

/// Static catalog of entity descriptors, built once at startup.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    entities: BTreeMap<String, EntityDescriptor>,
}

impl SchemaCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one descriptor.
    ///
    /// # Errors
    /// - `DuplicateEntity` when the name is already registered.
    /// - `InvalidDescriptor` when fields are duplicated, the primary
    ///   key is undeclared or nullable, or a relation names a missing
    ///   local key field.
    pub fn register(&mut self, descriptor: EntityDescriptor) -> SchemaResult<()> {
        if self.entities.contains_key(descriptor.name()) {
            return Err(SchemaError::DuplicateEntity(descriptor.name().to_string()));
        }
        validate_descriptor(&descriptor)?;

        info!(
            "event=entity_registered module=schema status=ok entity={} fields={} relations={}",
            descriptor.name(),
            descriptor.fields().len(),
            descriptor.relations().len()
        );
        self.entities.insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    /// Returns the descriptor for `entity`.
    pub fn descriptor(&self, entity: &str) -> SchemaResult<&EntityDescriptor> {
        self.entities
            .get(entity)
            .ok_or_else(|| SchemaError::UnknownEntity(entity.to_string()))
    }

    /// Resolves a possibly dotted field path starting at `entity`.
    ///
    /// Non-final segments must name relations; the final segment must
    /// name a plain field on the entity reached by the hops.
    pub fn lookup(&self, entity: &str, path: &str) -> SchemaResult<&FieldDef> {
        let mut current = self.descriptor(entity)?;
        let segments: Vec<&str> = path.split('.').collect();

        for (index, segment) in segments.iter().enumerate() {
            let last = index == segments.len() - 1;
            if last {
                return current.find_field(segment).ok_or_else(|| SchemaError::UnknownField {
                    entity: entity.to_string(),
                    path: path.to_string(),
                    segment: (*segment).to_string(),
                });
            }
            let relation = current.find_relation(segment).ok_or_else(|| SchemaError::UnknownField {
                entity: entity.to_string(),
                path: path.to_string(),
                segment: (*segment).to_string(),
            })?;
            current = self.descriptor(&relation.target_entity)?;
        }

        // Unreachable: split always yields at least one segment.
        Err(SchemaError::UnknownField {
            entity: entity.to_string(),
            path: path.to_string(),
            segment: path.to_string(),
        })
    }

    /// Returns the relation named `relation` on `entity`.
    pub fn relation(&self, entity: &str, relation: &str) -> SchemaResult<&RelationDef> {
        let descriptor = self.descriptor(entity)?;
        descriptor
            .find_relation(relation)
            .ok_or_else(|| SchemaError::UnknownField {
                entity: entity.to_string(),
                path: relation.to_string(),
                segment: relation.to_string(),
            })
    }

    /// Iterates all registered descriptors in name order.
    pub fn descriptors(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }
}

fn validate_descriptor(descriptor: &EntityDescriptor) -> SchemaResult<()> {
    let invalid = |message: String| SchemaError::InvalidDescriptor {
        entity: descriptor.name().to_string(),
        message,
    };

    let mut seen = std::collections::BTreeSet::new();
    for field in descriptor.fields() {
        if !seen.insert(field.name.as_str()) {
            return Err(invalid(format!("duplicate field `{}`", field.name)));
        }
    }

    match descriptor.find_field(descriptor.primary_key()) {
        None => {
            return Err(invalid(format!(
                "primary key `{}` is not a declared field",
                descriptor.primary_key()
            )));
        }
        Some(key_field) if key_field.nullable => {
            return Err(invalid(format!(
                "primary key `{}` must not be nullable",
                descriptor.primary_key()
            )));
        }
        Some(_) => {}
    }

    for relation in descriptor.relations() {
        if descriptor.find_field(&relation.local_key).is_none() {
            return Err(invalid(format!(
                "relation `{}` names missing local key `{}`",
                relation.name, relation.local_key
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::SchemaCatalog;
    use crate::schema::{EntityDescriptor, FieldType, SchemaError};

    fn member() -> EntityDescriptor {
        EntityDescriptor::new("Member", "id")
            .field("id", FieldType::Int, false)
            .field("username", FieldType::Text, true)
            .field("age", FieldType::Int, true)
            .field("teamId", FieldType::Int, true)
            .relation("team", "teamId", "Team", "id")
    }

    fn team() -> EntityDescriptor {
        EntityDescriptor::new("Team", "id")
            .field("id", FieldType::Int, false)
            .field("name", FieldType::Text, true)
    }

    #[test]
    fn register_rejects_duplicate_entity() {
        let mut catalog = SchemaCatalog::new();
        catalog.register(member()).unwrap();
        assert_eq!(
            catalog.register(member()),
            Err(SchemaError::DuplicateEntity("Member".to_string()))
        );
    }

    #[test]
    fn lookup_resolves_plain_and_dotted_paths() {
        let mut catalog = SchemaCatalog::new();
        catalog.register(member()).unwrap();
        catalog.register(team()).unwrap();

        assert_eq!(catalog.lookup("Member", "username").unwrap().name, "username");
        assert_eq!(catalog.lookup("Member", "team.name").unwrap().name, "name");
    }

    #[test]
    fn lookup_reports_the_failing_segment() {
        let mut catalog = SchemaCatalog::new();
        catalog.register(member()).unwrap();
        catalog.register(team()).unwrap();

        let err = catalog.lookup("Member", "team.motto").unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownField {
                entity: "Member".to_string(),
                path: "team.motto".to_string(),
                segment: "motto".to_string(),
            }
        );
    }

    #[test]
    fn register_rejects_nullable_primary_key() {
        let bad = EntityDescriptor::new("Bad", "id").field("id", FieldType::Int, true);
        let mut catalog = SchemaCatalog::new();
        assert!(matches!(
            catalog.register(bad),
            Err(SchemaError::InvalidDescriptor { .. })
        ));
    }
}
