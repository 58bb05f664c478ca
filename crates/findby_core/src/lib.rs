//! Derived-query engine: method names in, executed queries out.
//! This crate is the single source of truth for the derivation grammar
//! and its execution semantics.

pub mod derive;
pub mod exec;
pub mod logging;
pub mod model;
pub mod plan;
pub mod repo;
pub mod schema;
pub mod storage;

pub use derive::{MethodSignature, ParamKind};
pub use exec::{Arg, ExecutionAdapter, Outcome, Page, ResultSet};
pub use logging::{default_log_level, init_logging, logging_settings};
pub use model::{Row, Value};
pub use plan::{
    Assignment, Comparator, LockMode, Operation, PageRequest, QueryPlan, ReturnShape, SortSpec,
};
pub use repo::{RepoError, RepoResult, Repository};
pub use schema::{EntityDescriptor, FieldType, SchemaCatalog};
pub use storage::{memory::MemoryStore, sqlite::SqliteStore, Storage};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
