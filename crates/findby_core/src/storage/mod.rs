//! Storage interface consumed by the execution adapter.
//!
//! # Responsibility
//! - Define the backend contract: scan, count, insert, delete, update.
//! - Define the bound (value-carrying) filter passed to backends.
//!
//! # Invariants
//! - Filters reaching a backend reference plain fields of one entity;
//!   dotted relation paths are rewritten by the adapter first.
//! - Backends do not retry; retry policy belongs to the caller side of
//!   this boundary.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::model::Value;
use crate::plan::{Assignment, Comparator, LockMode, SortSpec};
use crate::model::Row;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer failure. Wrapped into an execution error (with the
/// triggering method attached) by the adapter.
#[derive(Debug)]
pub enum StorageError {
    /// The filter or row references an entity the backend does not know.
    UnknownEntity(String),
    /// The filter or assignment references an undeclared field.
    UnknownField { entity: String, field: String },
    /// Two values of different families were ordered against each other.
    IncomparableValues { field: String },
    /// An update assignment does not apply to the stored value.
    InvalidAssignment { field: String, message: String },
    /// A filter leaf carries fewer values than its comparator needs.
    MalformedFilter { field: String },
    /// The entity shape cannot be represented by this backend.
    UnsupportedSchema { entity: String, message: String },
    /// Underlying SQLite failure.
    Sqlite(rusqlite::Error),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEntity(entity) => write!(f, "storage does not know entity `{entity}`"),
            Self::UnknownField { entity, field } => {
                write!(f, "entity `{entity}` has no field `{field}`")
            }
            Self::IncomparableValues { field } => {
                write!(f, "values of different families compared on field `{field}`")
            }
            Self::InvalidAssignment { field, message } => {
                write!(f, "invalid assignment to field `{field}`: {message}")
            }
            Self::MalformedFilter { field } => {
                write!(f, "filter on field `{field}` is missing bound values")
            }
            Self::UnsupportedSchema { entity, message } => {
                write!(f, "entity `{entity}` cannot be stored: {message}")
            }
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Bound filter tree: the parameterized plan filter with concrete
/// values substituted into every slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Matches every row.
    All,
    Cmp {
        field: String,
        comparator: Comparator,
        values: Vec<Value>,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    /// Convenience leaf constructor used by literal plans and tests.
    pub fn cmp(field: &str, comparator: Comparator, values: Vec<Value>) -> Self {
        Self::Cmp {
            field: field.to_string(),
            comparator,
            values,
        }
    }
}

/// Per-scan options: sort, window and locking hint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOptions {
    pub sort: Option<SortSpec>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub lock: LockMode,
}

/// Backend contract. One call is one synchronous storage round trip;
/// any blocking, locking or retrying happens behind this trait.
pub trait Storage {
    /// Returns matching rows, sorted and windowed per `opts`. Equal
    /// sort keys are tie-broken by primary key so paging is stable.
    fn scan(&self, entity: &str, filter: &Filter, opts: &ScanOptions) -> StorageResult<Vec<Row>>;

    /// Returns the number of matching rows.
    fn count(&self, entity: &str, filter: &Filter) -> StorageResult<u64>;

    /// Persists one row, assigning the primary key when absent, and
    /// returns the stored row.
    fn insert(&self, entity: &str, row: Row) -> StorageResult<Row>;

    /// Deletes matching rows, returning the affected count.
    fn delete_where(&self, entity: &str, filter: &Filter) -> StorageResult<u64>;

    /// Applies assignments to matching rows, returning the affected
    /// count.
    fn update_where(
        &self,
        entity: &str,
        filter: &Filter,
        assignments: &[Assignment],
    ) -> StorageResult<u64>;
}
