//! Execution adapter: bound plans against the storage interface.
//!
//! # Responsibility
//! - Define the invocation argument and outcome contracts.
//! - Surface per-call execution errors with the triggering method
//!   attached.
//!
//! # Invariants
//! - Execution errors are per-call and never retried here; retrying is
//!   the storage collaborator's business.
//! - Storage failures are wrapped, never swallowed.

pub mod adapter;
pub mod page;

pub use adapter::{ExecutionAdapter, Outcome, RelatedRows, ResultSet};
pub use page::Page;

use crate::model::Value;
use crate::plan::{PageRequest, SortSpec};
use crate::schema::SchemaError;
use crate::storage::StorageError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for execution.
pub type ExecResult<T> = Result<T, ExecError>;

/// One positional invocation argument. `Page` and `Sort` arguments are
/// recognized by kind, matching their declared parameter slots.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Values(Vec<Value>),
    Page(PageRequest),
    Sort(SortSpec),
}

impl Arg {
    /// Builds a collection argument for an `In` clause.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Values(values.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<Vec<Value>> for Arg {
    fn from(values: Vec<Value>) -> Self {
        Self::Values(values)
    }
}

impl From<PageRequest> for Arg {
    fn from(request: PageRequest) -> Self {
        Self::Page(request)
    }
}

impl From<SortSpec> for Arg {
    fn from(sort: SortSpec) -> Self {
        Self::Sort(sort)
    }
}

/// Per-call execution error, carrying the method signature that
/// triggered it.
#[derive(Debug)]
pub enum ExecError {
    /// Storage-layer failure, wrapped untouched.
    Storage {
        method: String,
        source: StorageError,
    },
    /// Supplied argument count does not match the plan's slots.
    ArgumentCount {
        method: String,
        expected: usize,
        got: usize,
    },
    /// An argument's kind does not match its slot (scalar where a
    /// collection is needed, missing page request, ...).
    ArgumentKind {
        method: String,
        position: usize,
        message: String,
    },
    /// A single-result method matched more than one row.
    NonUniqueResult { method: String, matches: usize },
    /// A plan referenced schema elements that no longer resolve.
    Schema {
        method: String,
        source: SchemaError,
    },
}

impl ExecError {
    /// Method signature that triggered this error.
    pub fn method(&self) -> &str {
        match self {
            Self::Storage { method, .. }
            | Self::ArgumentCount { method, .. }
            | Self::ArgumentKind { method, .. }
            | Self::NonUniqueResult { method, .. }
            | Self::Schema { method, .. } => method,
        }
    }
}

impl Display for ExecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage { method, source } => write!(f, "method `{method}`: {source}"),
            Self::ArgumentCount {
                method,
                expected,
                got,
            } => write!(
                f,
                "method `{method}` expects {expected} argument(s), got {got}"
            ),
            Self::ArgumentKind {
                method,
                position,
                message,
            } => write!(f, "method `{method}` argument {position}: {message}"),
            Self::NonUniqueResult { method, matches } => write!(
                f,
                "method `{method}` expected at most one row, matched {matches}"
            ),
            Self::Schema { method, source } => write!(f, "method `{method}`: {source}"),
        }
    }
}

impl Error for ExecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage { source, .. } => Some(source),
            Self::Schema { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Wraps a storage error with its method context.
pub(crate) fn storage_error(method: &str, source: StorageError) -> ExecError {
    ExecError::Storage {
        method: method.to_string(),
        source,
    }
}
