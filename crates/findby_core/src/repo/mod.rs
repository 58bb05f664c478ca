//! Repository facade: named methods over one entity.
//!
//! # Responsibility
//! - Register derived and literal query plans under method names.
//! - Cache compiled plans and dispatch invocations to the adapter.
//! - Offer a typed call surface per return shape.
//!
//! # Invariants
//! - A method derives exactly once, at registration; invocation only
//!   reads the cache.
//! - Registration failures leave the cache untouched; a method that
//!   fails to derive is never callable.
//!
//! # See also
//! - [`crate::derive`] for the method-name grammar.
//! - [`crate::exec`] for invocation semantics.

use crate::derive::{compile, parse, DeriveError, MethodSignature};
use crate::exec::{Arg, ExecError, ExecutionAdapter, Outcome, Page, ResultSet};
use crate::model::Row;
use crate::plan::{FilterNode, Operation, QueryPlan, ReturnShape};
use crate::schema::{SchemaCatalog, SchemaError};
use crate::storage::{Storage, StorageError};
use log::{info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock};

/// Result type for repository calls.
pub type RepoResult<T> = Result<T, RepoError>;

/// Repository-level error: registration, dispatch or typed-surface
/// failures, plus wrapped collaborator errors.
#[derive(Debug)]
pub enum RepoError {
    Derive(DeriveError),
    Exec(ExecError),
    Schema(SchemaError),
    Storage(StorageError),
    /// Invocation of a method name that was never registered.
    UnknownMethod(String),
    /// Second registration under an already taken method name.
    MethodAlreadyRegistered(String),
    /// A typed call whose shape does not match the plan's outcome.
    ShapeMismatch {
        method: String,
        expected: &'static str,
        got: &'static str,
    },
    /// A literal plan that fails structural validation.
    InvalidPlan { name: String, message: String },
    /// A projection mapper rejected a row.
    Projection { method: String, message: String },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Derive(source) => write!(f, "{source}"),
            Self::Exec(source) => write!(f, "{source}"),
            Self::Schema(source) => write!(f, "{source}"),
            Self::Storage(source) => write!(f, "{source}"),
            Self::UnknownMethod(method) => write!(f, "unknown method `{method}`"),
            Self::MethodAlreadyRegistered(method) => {
                write!(f, "method `{method}` is already registered")
            }
            Self::ShapeMismatch {
                method,
                expected,
                got,
            } => write!(
                f,
                "method `{method}` produces `{got}`, called through the `{expected}` surface"
            ),
            Self::InvalidPlan { name, message } => {
                write!(f, "invalid plan `{name}`: {message}")
            }
            Self::Projection { method, message } => {
                write!(f, "projection for method `{method}` failed: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Derive(source) => Some(source),
            Self::Exec(source) => Some(source),
            Self::Schema(source) => Some(source),
            Self::Storage(source) => Some(source),
            _ => None,
        }
    }
}

impl From<DeriveError> for RepoError {
    fn from(source: DeriveError) -> Self {
        Self::Derive(source)
    }
}

impl From<ExecError> for RepoError {
    fn from(source: ExecError) -> Self {
        Self::Exec(source)
    }
}

impl From<SchemaError> for RepoError {
    fn from(source: SchemaError) -> Self {
        Self::Schema(source)
    }
}

impl From<StorageError> for RepoError {
    fn from(source: StorageError) -> Self {
        Self::Storage(source)
    }
}

/// Named query methods over one entity, dispatching to one storage
/// backend.
#[derive(Debug)]
pub struct Repository<S: Storage> {
    entity: String,
    schema: Arc<SchemaCatalog>,
    store: S,
    plans: RwLock<HashMap<String, Arc<QueryPlan>>>,
}

impl<S: Storage> Repository<S> {
    /// Creates a repository for a registered entity.
    ///
    /// # Errors
    /// - `Schema` when the entity is not in the catalog.
    pub fn new(entity: &str, schema: Arc<SchemaCatalog>, store: S) -> RepoResult<Self> {
        schema.descriptor(entity)?;
        Ok(Self {
            entity: entity.to_string(),
            schema,
            store,
            plans: RwLock::new(HashMap::new()),
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let plans = self.plans.read().expect("plan cache poisoned");
        let mut names: Vec<String> = plans.keys().cloned().collect();
        names.sort();
        names
    }

    /// Derives and caches a plan for one method signature.
    ///
    /// # Errors
    /// - `MethodAlreadyRegistered` when the name is taken.
    /// - `Derive` when the name fails the grammar or the catalog.
    pub fn register(&self, signature: MethodSignature) -> RepoResult<()> {
        let name = signature.name.clone();
        self.check_name_free(&name)?;

        // Derivation runs outside the cache lock; only the publish
        // step takes the write guard.
        let parsed = parse(&self.entity, &signature, &self.schema).inspect_err(|err| {
            warn!(
                "event=method_registered module=repo status=error entity={} method={name} reason=\"{err}\"",
                self.entity
            );
        })?;
        let plan = compile(&self.entity, &parsed);

        self.publish(&name, plan)
    }

    /// Caches a caller-supplied literal plan under a method name, the
    /// way an annotated query overrides name derivation.
    ///
    /// # Errors
    /// - `InvalidPlan` for structural problems: wrong entity, bad slot
    ///   wiring, missing or forbidden assignments, shape mismatches.
    /// - `Schema` when a filter path, fetch relation or assignment
    ///   field does not resolve.
    pub fn register_plan(&self, name: &str, plan: QueryPlan) -> RepoResult<()> {
        self.check_name_free(name)?;
        self.validate_plan(name, &plan)?;
        self.publish(name, plan)
    }

    /// Raw dispatch: looks up the plan and executes it.
    pub fn call(&self, method: &str, args: &[Arg]) -> RepoResult<Outcome> {
        let plan = self.plan(method)?;
        let adapter = ExecutionAdapter::new(&self.schema, &self.store);
        Ok(adapter.execute(method, &plan, args)?)
    }

    /// Cached plan for a registered method.
    pub fn plan(&self, method: &str) -> RepoResult<Arc<QueryPlan>> {
        let plans = self.plans.read().expect("plan cache poisoned");
        plans
            .get(method)
            .cloned()
            .ok_or_else(|| RepoError::UnknownMethod(method.to_string()))
    }

    /// Invokes a many-shaped find and returns its rows.
    pub fn find(&self, method: &str, args: &[Arg]) -> RepoResult<Vec<Row>> {
        match self.call(method, args)? {
            Outcome::Rows(result) => Ok(result.rows),
            other => Err(shape_mismatch(method, "rows", &other)),
        }
    }

    /// Invokes a many-shaped find and keeps the eagerly fetched
    /// related rows alongside the main sequence.
    pub fn find_with_related(&self, method: &str, args: &[Arg]) -> RepoResult<ResultSet> {
        match self.call(method, args)? {
            Outcome::Rows(result) => Ok(result),
            other => Err(shape_mismatch(method, "rows", &other)),
        }
    }

    /// Invokes a single-shaped find.
    pub fn find_one(&self, method: &str, args: &[Arg]) -> RepoResult<Option<Row>> {
        match self.call(method, args)? {
            Outcome::One(row) => Ok(row),
            other => Err(shape_mismatch(method, "one", &other)),
        }
    }

    /// Invokes a page- or slice-shaped find.
    pub fn page(&self, method: &str, args: &[Arg]) -> RepoResult<Page> {
        match self.call(method, args)? {
            Outcome::Page(page) => Ok(page),
            other => Err(shape_mismatch(method, "page", &other)),
        }
    }

    /// Invokes a slice-shaped find. Same window payload as [`page`],
    /// with `total_elements` always absent.
    ///
    /// [`page`]: Repository::page
    pub fn slice(&self, method: &str, args: &[Arg]) -> RepoResult<Page> {
        self.page(method, args)
    }

    pub fn count(&self, method: &str, args: &[Arg]) -> RepoResult<u64> {
        match self.call(method, args)? {
            Outcome::Count(total) => Ok(total),
            other => Err(shape_mismatch(method, "count", &other)),
        }
    }

    pub fn exists(&self, method: &str, args: &[Arg]) -> RepoResult<bool> {
        match self.call(method, args)? {
            Outcome::Exists(found) => Ok(found),
            other => Err(shape_mismatch(method, "exists", &other)),
        }
    }

    /// Invokes a delete method and returns the removed row count.
    pub fn delete(&self, method: &str, args: &[Arg]) -> RepoResult<u64> {
        match self.call(method, args)? {
            Outcome::Affected(affected) => Ok(affected),
            other => Err(shape_mismatch(method, "affected", &other)),
        }
    }

    /// Invokes an update method and returns the affected row count.
    /// There is no cache of loaded rows here, so nothing needs
    /// flushing or clearing around the bulk write.
    pub fn update(&self, method: &str, args: &[Arg]) -> RepoResult<u64> {
        match self.call(method, args)? {
            Outcome::Affected(affected) => Ok(affected),
            other => Err(shape_mismatch(method, "affected", &other)),
        }
    }

    /// Invokes a many-shaped find and maps each row through an
    /// explicit projection. Mapping happens after the scan; the
    /// backend always returns whole rows.
    pub fn find_projected<T>(
        &self,
        method: &str,
        args: &[Arg],
        mapper: impl Fn(&Row) -> Result<T, String>,
    ) -> RepoResult<Vec<T>> {
        let rows = self.find(method, args)?;
        rows.iter()
            .map(|row| {
                mapper(row).map_err(|message| RepoError::Projection {
                    method: method.to_string(),
                    message,
                })
            })
            .collect()
    }

    /// Inserts one row, returning it with its assigned primary key.
    pub fn save(&self, row: Row) -> RepoResult<Row> {
        Ok(self.store.insert(&self.entity, row)?)
    }

    /// Storage backend, for callers that need backend-specific checks.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn check_name_free(&self, name: &str) -> RepoResult<()> {
        let plans = self.plans.read().expect("plan cache poisoned");
        if plans.contains_key(name) {
            return Err(RepoError::MethodAlreadyRegistered(name.to_string()));
        }
        Ok(())
    }

    fn publish(&self, name: &str, plan: QueryPlan) -> RepoResult<()> {
        let mut plans = self.plans.write().expect("plan cache poisoned");
        // Re-checked under the write guard; two racing registrations
        // must not silently overwrite each other.
        if plans.contains_key(name) {
            return Err(RepoError::MethodAlreadyRegistered(name.to_string()));
        }
        info!(
            "event=method_registered module=repo status=ok entity={} method={name} plan=\"{}\"",
            self.entity,
            plan.describe()
        );
        plans.insert(name.to_string(), Arc::new(plan));
        Ok(())
    }

    fn validate_plan(&self, name: &str, plan: &QueryPlan) -> RepoResult<()> {
        let invalid = |message: String| RepoError::InvalidPlan {
            name: name.to_string(),
            message,
        };

        if plan.entity != self.entity {
            return Err(invalid(format!(
                "plan targets entity `{}`, repository owns `{}`",
                plan.entity, self.entity
            )));
        }

        let mut seen_slots = Vec::new();
        check_filter(&self.schema, &self.entity, &plan.filter, &mut seen_slots)
            .map_err(|err| match err {
                PlanCheck::Schema(source) => RepoError::Schema(source),
                PlanCheck::Structural(message) => invalid(message),
            })?;
        seen_slots.sort_unstable();
        let expected: Vec<usize> = (0..plan.value_slots).collect();
        if seen_slots != expected {
            return Err(invalid(format!(
                "filter slots {seen_slots:?} do not cover 0..{}",
                plan.value_slots
            )));
        }

        let descriptor = self.schema.descriptor(&self.entity)?;
        if let Some(sort) = &plan.sort {
            if descriptor.find_field(&sort.field).is_none() {
                return Err(invalid(format!("sort names unknown field `{}`", sort.field)));
            }
        }
        for relation in &plan.fetch_relations {
            self.schema.relation(&self.entity, relation)?;
        }

        match plan.operation {
            Operation::Update => {
                if plan.assignments.is_empty() {
                    return Err(invalid("update plans need at least one assignment".to_string()));
                }
                for assignment in &plan.assignments {
                    let field = match assignment {
                        crate::plan::Assignment::Set { field, .. } => field,
                        crate::plan::Assignment::Increment { field, .. } => field,
                    };
                    if descriptor.find_field(field).is_none() {
                        return Err(invalid(format!("assignment names unknown field `{field}`")));
                    }
                }
            }
            _ if !plan.assignments.is_empty() => {
                return Err(invalid(
                    "only update plans may carry assignments".to_string(),
                ));
            }
            _ => {}
        }

        match plan.operation {
            Operation::Find => {
                let windowed = matches!(plan.shape, ReturnShape::Page | ReturnShape::Slice);
                if windowed && !plan.accepts_page {
                    return Err(invalid(
                        "page and slice shapes need a pagination parameter".to_string(),
                    ));
                }
                if plan.shape == ReturnShape::One && plan.accepts_page {
                    return Err(invalid(
                        "single-result plans cannot take a pagination parameter".to_string(),
                    ));
                }
            }
            _ => {
                if plan.shape != ReturnShape::Many {
                    return Err(invalid(
                        "non-find plans use the many shape".to_string(),
                    ));
                }
                if plan.accepts_page || plan.accepts_sort {
                    return Err(invalid(
                        "non-find plans take neither pagination nor sort parameters".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

enum PlanCheck {
    Schema(SchemaError),
    Structural(String),
}

fn check_filter(
    schema: &SchemaCatalog,
    entity: &str,
    node: &FilterNode,
    seen_slots: &mut Vec<usize>,
) -> Result<(), PlanCheck> {
    match node {
        FilterNode::All => Ok(()),
        FilterNode::And(left, right) | FilterNode::Or(left, right) => {
            check_filter(schema, entity, left, seen_slots)?;
            check_filter(schema, entity, right, seen_slots)
        }
        FilterNode::Leaf {
            path,
            comparator,
            slots,
        } => {
            schema.lookup(entity, path).map_err(PlanCheck::Schema)?;
            let consumed = if comparator.takes_collection() {
                1
            } else {
                comparator.value_arity()
            };
            if slots.len() != consumed {
                return Err(PlanCheck::Structural(format!(
                    "clause on `{path}` wires {} slot(s), comparator takes {consumed}",
                    slots.len()
                )));
            }
            seen_slots.extend_from_slice(slots);
            Ok(())
        }
    }
}

fn shape_mismatch(method: &str, expected: &'static str, got: &Outcome) -> RepoError {
    RepoError::ShapeMismatch {
        method: method.to_string(),
        expected,
        got: got.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::{RepoError, Repository};
    use crate::derive::{MethodSignature, ParamKind};
    use crate::plan::{Comparator, FilterNode, Operation, QueryPlan, ReturnShape};
    use crate::schema::{EntityDescriptor, FieldType, SchemaCatalog};
    use crate::storage::memory::MemoryStore;
    use std::sync::Arc;

    fn catalog() -> Arc<SchemaCatalog> {
        let mut catalog = SchemaCatalog::new();
        catalog
            .register(
                EntityDescriptor::new("Member", "id")
                    .field("id", FieldType::Int, false)
                    .field("username", FieldType::Text, true)
                    .field("age", FieldType::Int, true),
            )
            .unwrap();
        Arc::new(catalog)
    }

    fn repository() -> Repository<MemoryStore> {
        let schema = catalog();
        let store = MemoryStore::new(Arc::clone(&schema));
        Repository::new("Member", schema, store).unwrap()
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let repo = repository();
        let signature = MethodSignature::new("findByUsername", ReturnShape::Many)
            .param(ParamKind::Value);
        repo.register(signature.clone()).unwrap();
        assert!(matches!(
            repo.register(signature),
            Err(RepoError::MethodAlreadyRegistered(name)) if name == "findByUsername"
        ));
    }

    #[test]
    fn failed_derivation_leaves_the_cache_empty() {
        let repo = repository();
        let signature = MethodSignature::new("findByNickname", ReturnShape::Many)
            .param(ParamKind::Value);
        assert!(matches!(
            repo.register(signature),
            Err(RepoError::Derive(_))
        ));
        assert!(repo.methods().is_empty());
    }

    #[test]
    fn literal_plan_slot_wiring_is_validated() {
        let repo = repository();
        let mut plan = QueryPlan::new("Member", Operation::Find, ReturnShape::Many);
        plan.filter = FilterNode::Leaf {
            path: "age".to_string(),
            comparator: Comparator::GreaterThan,
            slots: vec![1],
        };
        plan.value_slots = 1;
        assert!(matches!(
            repo.register_plan("membersOlderThan", plan),
            Err(RepoError::InvalidPlan { .. })
        ));
    }

    #[test]
    fn literal_update_plan_requires_assignments() {
        let repo = repository();
        let plan = QueryPlan::new("Member", Operation::Update, ReturnShape::Many);
        assert!(matches!(
            repo.register_plan("bumpEveryone", plan),
            Err(RepoError::InvalidPlan { .. })
        ));
    }
}
