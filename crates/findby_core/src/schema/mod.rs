//! Schema catalog: static entity metadata for derivation and storage.
//!
//! # Responsibility
//! - Define entity descriptors (fields, primary key, relations).
//! - Resolve field paths, including dotted relation paths, for the
//!   parser and the execution adapter.
//!
//! # Invariants
//! - Descriptors are registered once at startup and never mutated.
//! - Every field path a plan references resolves here at registration
//!   time, never per call.

pub mod catalog;
pub mod descriptor;

pub use catalog::SchemaCatalog;
pub use descriptor::{EntityDescriptor, FieldDef, FieldType, RelationDef};

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for schema registration and lookup.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Configuration-time schema error. Fatal to startup; never produced
/// during query execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// An entity with this name is already registered.
    DuplicateEntity(String),
    /// No entity with this name is registered.
    UnknownEntity(String),
    /// A field path segment does not resolve against the descriptor graph.
    UnknownField {
        entity: String,
        path: String,
        segment: String,
    },
    /// A descriptor is internally inconsistent (bad primary key,
    /// duplicate field, relation over a missing local key).
    InvalidDescriptor { entity: String, message: String },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateEntity(name) => write!(f, "entity `{name}` is already registered"),
            Self::UnknownEntity(name) => write!(f, "unknown entity `{name}`"),
            Self::UnknownField {
                entity,
                path,
                segment,
            } => write!(
                f,
                "unknown field `{path}` on entity `{entity}`: segment `{segment}` does not resolve"
            ),
            Self::InvalidDescriptor { entity, message } => {
                write!(f, "invalid descriptor for entity `{entity}`: {message}")
            }
        }
    }
}

impl Error for SchemaError {}
