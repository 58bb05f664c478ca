//! Plan execution against the storage interface.
//!
//! # Responsibility
//! - Bind positional arguments into the parameterized filter tree.
//! - Rewrite dotted relation predicates into explicit semi-joins.
//! - Drive scan/count/delete/update calls per operation and shape.
//! - Fetch related rows eagerly when the plan asks for them.
//!
//! # Invariants
//! - A slice-shaped query never issues a count call; it probes one row
//!   past the window instead.
//! - Windowed scans always carry a deterministic sort: the caller's,
//!   the plan's, or primary-key ascending as fallback.
//! - Nothing is ever fetched implicitly on field access.

use crate::exec::page::Page;
use crate::exec::{storage_error, Arg, ExecError, ExecResult};
use crate::model::{Row, Value};
use crate::plan::{Comparator, FilterNode, Operation, PageRequest, QueryPlan, ReturnShape, SortSpec};
use crate::schema::SchemaCatalog;
use crate::storage::{Filter, ScanOptions, Storage};
use log::debug;

/// Rows plus eagerly fetched related rows, positionally aligned:
/// `matches[i]` holds the related rows for `rows[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedRows {
    pub relation: String,
    pub matches: Vec<Vec<Row>>,
}

/// Result of a `Find` returning a plain sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub related: Vec<RelatedRows>,
}

impl ResultSet {
    /// Drops related rows and keeps the main sequence.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Typed execution outcome, one variant per return shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Rows(ResultSet),
    One(Option<Row>),
    Page(Page),
    Count(u64),
    Exists(bool),
    Affected(u64),
}

impl Outcome {
    /// Short name used in shape-mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rows(_) => "rows",
            Self::One(_) => "one",
            Self::Page(_) => "page",
            Self::Count(_) => "count",
            Self::Exists(_) => "exists",
            Self::Affected(_) => "affected",
        }
    }
}

/// Binds arguments into plans and evaluates them against storage.
pub struct ExecutionAdapter<'a, S: Storage> {
    schema: &'a SchemaCatalog,
    store: &'a S,
}

struct BoundCall {
    filter: Filter,
    page: Option<PageRequest>,
    sort: Option<SortSpec>,
}

impl<'a, S: Storage> ExecutionAdapter<'a, S> {
    pub fn new(schema: &'a SchemaCatalog, store: &'a S) -> Self {
        Self { schema, store }
    }

    /// Executes one plan invocation.
    ///
    /// # Errors
    /// - `ArgumentCount`/`ArgumentKind` when arguments do not line up
    ///   with the plan's slots.
    /// - `NonUniqueResult` for single-shape finds matching several rows.
    /// - `Storage` wrapping any backend failure, untouched and
    ///   unretried.
    pub fn execute(&self, method: &str, plan: &QueryPlan, args: &[Arg]) -> ExecResult<Outcome> {
        let bound = bind(method, plan, args)?;
        let sort = self.effective_sort(method, plan, &bound)?;
        let filter = self.resolve(method, &plan.entity, bound.filter)?;

        let outcome = match plan.operation {
            Operation::Find => self.execute_find(method, plan, filter, sort, bound.page)?,
            Operation::Count => {
                let total = self
                    .store
                    .count(&plan.entity, &filter)
                    .map_err(|source| storage_error(method, source))?;
                Outcome::Count(total)
            }
            Operation::Exists => {
                let opts = ScanOptions {
                    limit: Some(1),
                    lock: plan.lock,
                    ..ScanOptions::default()
                };
                let rows = self
                    .store
                    .scan(&plan.entity, &filter, &opts)
                    .map_err(|source| storage_error(method, source))?;
                Outcome::Exists(!rows.is_empty())
            }
            Operation::Delete => {
                let affected = self
                    .store
                    .delete_where(&plan.entity, &filter)
                    .map_err(|source| storage_error(method, source))?;
                Outcome::Affected(affected)
            }
            Operation::Update => {
                let affected = self
                    .store
                    .update_where(&plan.entity, &filter, &plan.assignments)
                    .map_err(|source| storage_error(method, source))?;
                Outcome::Affected(affected)
            }
        };

        debug!(
            "event=plan_executed module=exec status=ok entity={} method={method} outcome={}",
            plan.entity,
            outcome.kind()
        );
        Ok(outcome)
    }

    fn execute_find(
        &self,
        method: &str,
        plan: &QueryPlan,
        filter: Filter,
        sort: SortSpec,
        page: Option<PageRequest>,
    ) -> ExecResult<Outcome> {
        match plan.shape {
            ReturnShape::One => {
                let opts = ScanOptions {
                    sort: Some(sort),
                    limit: Some(2),
                    lock: plan.lock,
                    ..ScanOptions::default()
                };
                let mut rows = self
                    .store
                    .scan(&plan.entity, &filter, &opts)
                    .map_err(|source| storage_error(method, source))?;
                if rows.len() > 1 {
                    return Err(ExecError::NonUniqueResult {
                        method: method.to_string(),
                        matches: rows.len(),
                    });
                }
                Ok(Outcome::One(rows.pop()))
            }
            ReturnShape::Many => {
                let opts = match &page {
                    // A windowed plain list: apply the window, skip the
                    // count entirely.
                    Some(request) => ScanOptions {
                        sort: Some(sort),
                        offset: Some(request.offset()),
                        limit: Some(u64::from(request.size)),
                        lock: plan.lock,
                    },
                    None => ScanOptions {
                        sort: Some(sort),
                        lock: plan.lock,
                        ..ScanOptions::default()
                    },
                };
                let rows = self
                    .store
                    .scan(&plan.entity, &filter, &opts)
                    .map_err(|source| storage_error(method, source))?;
                let related = self.fetch_related(method, plan, &rows)?;
                Ok(Outcome::Rows(ResultSet { rows, related }))
            }
            ReturnShape::Page => {
                let request = expect_page(method, page)?;
                let total = self
                    .store
                    .count(&plan.entity, &filter)
                    .map_err(|source| storage_error(method, source))?;
                let opts = ScanOptions {
                    sort: Some(sort),
                    offset: Some(request.offset()),
                    limit: Some(u64::from(request.size)),
                    lock: plan.lock,
                };
                let rows = self
                    .store
                    .scan(&plan.entity, &filter, &opts)
                    .map_err(|source| storage_error(method, source))?;
                let has_next = request.offset() + (rows.len() as u64) < total;
                Ok(Outcome::Page(Page {
                    rows,
                    number: request.page,
                    size: request.size,
                    total_elements: Some(total),
                    has_next,
                }))
            }
            ReturnShape::Slice => {
                let request = expect_page(method, page)?;
                // Probe one row past the window; its presence is the
                // has-next flag, and no count call is ever made.
                let opts = ScanOptions {
                    sort: Some(sort),
                    offset: Some(request.offset()),
                    limit: Some(u64::from(request.size) + 1),
                    lock: plan.lock,
                };
                let mut rows = self
                    .store
                    .scan(&plan.entity, &filter, &opts)
                    .map_err(|source| storage_error(method, source))?;
                let has_next = rows.len() as u64 > u64::from(request.size);
                rows.truncate(request.size as usize);
                Ok(Outcome::Page(Page {
                    rows,
                    number: request.page,
                    size: request.size,
                    total_elements: None,
                    has_next,
                }))
            }
        }
    }

    /// Sort precedence: explicit sort argument, then the page
    /// request's sort, then the plan's static sort, then primary-key
    /// ascending so windows stay stable.
    fn effective_sort(
        &self,
        method: &str,
        plan: &QueryPlan,
        bound: &BoundCall,
    ) -> ExecResult<SortSpec> {
        if let Some(sort) = &bound.sort {
            return Ok(sort.clone());
        }
        if let Some(request) = &bound.page {
            if let Some(sort) = &request.sort {
                return Ok(sort.clone());
            }
        }
        if let Some(sort) = &plan.sort {
            return Ok(sort.clone());
        }
        let descriptor = self
            .schema
            .descriptor(&plan.entity)
            .map_err(|source| ExecError::Schema {
                method: method.to_string(),
                source,
            })?;
        Ok(SortSpec::asc(descriptor.primary_key()))
    }

    /// Rewrites dotted relation predicates into explicit semi-joins:
    /// scan the target entity with the tail predicate, then replace
    /// the leaf with `local_key In matched_keys`.
    fn resolve(&self, method: &str, entity: &str, filter: Filter) -> ExecResult<Filter> {
        match filter {
            Filter::Cmp {
                field,
                comparator,
                values,
            } if field.contains('.') => {
                let (head, tail) = field.split_once('.').expect("field contains a dot");
                let relation = self
                    .schema
                    .relation(entity, head)
                    .map_err(|source| ExecError::Schema {
                        method: method.to_string(),
                        source,
                    })?;
                let inner = self.resolve(
                    method,
                    &relation.target_entity,
                    Filter::Cmp {
                        field: tail.to_string(),
                        comparator,
                        values,
                    },
                )?;
                let matched = self
                    .store
                    .scan(&relation.target_entity, &inner, &ScanOptions::default())
                    .map_err(|source| storage_error(method, source))?;
                let keys: Vec<Value> = matched
                    .iter()
                    .map(|row| row.value_or_null(&relation.target_key))
                    .filter(|key| !key.is_null())
                    .collect();
                Ok(Filter::Cmp {
                    field: relation.local_key.clone(),
                    comparator: Comparator::In,
                    values: keys,
                })
            }
            Filter::And(left, right) => Ok(Filter::And(
                Box::new(self.resolve(method, entity, *left)?),
                Box::new(self.resolve(method, entity, *right)?),
            )),
            Filter::Or(left, right) => Ok(Filter::Or(
                Box::new(self.resolve(method, entity, *left)?),
                Box::new(self.resolve(method, entity, *right)?),
            )),
            other => Ok(other),
        }
    }

    /// Fetches each plan-listed relation with one batched `In` scan
    /// and aligns the results with the main rows.
    fn fetch_related(
        &self,
        method: &str,
        plan: &QueryPlan,
        rows: &[Row],
    ) -> ExecResult<Vec<RelatedRows>> {
        let mut related = Vec::with_capacity(plan.fetch_relations.len());
        for name in &plan.fetch_relations {
            let relation = self
                .schema
                .relation(&plan.entity, name)
                .map_err(|source| ExecError::Schema {
                    method: method.to_string(),
                    source,
                })?;

            let mut keys: Vec<Value> = Vec::new();
            for row in rows {
                let key = row.value_or_null(&relation.local_key);
                if !key.is_null() && !keys.iter().any(|known| known.semantically_equals(&key)) {
                    keys.push(key);
                }
            }

            let fetched = if keys.is_empty() {
                Vec::new()
            } else {
                self.store
                    .scan(
                        &relation.target_entity,
                        &Filter::Cmp {
                            field: relation.target_key.clone(),
                            comparator: Comparator::In,
                            values: keys,
                        },
                        &ScanOptions::default(),
                    )
                    .map_err(|source| storage_error(method, source))?
            };

            let matches = rows
                .iter()
                .map(|row| {
                    let key = row.value_or_null(&relation.local_key);
                    fetched
                        .iter()
                        .filter(|candidate| {
                            candidate
                                .value_or_null(&relation.target_key)
                                .semantically_equals(&key)
                        })
                        .cloned()
                        .collect()
                })
                .collect();
            related.push(RelatedRows {
                relation: name.clone(),
                matches,
            });
        }
        Ok(related)
    }
}

fn expect_page(method: &str, page: Option<PageRequest>) -> ExecResult<PageRequest> {
    page.ok_or_else(|| ExecError::ArgumentKind {
        method: method.to_string(),
        position: 0,
        message: "paged methods require a pagination argument".to_string(),
    })
}

fn bind(method: &str, plan: &QueryPlan, args: &[Arg]) -> ExecResult<BoundCall> {
    let mut slot_args: Vec<&Arg> = Vec::new();
    let mut page: Option<PageRequest> = None;
    let mut sort: Option<SortSpec> = None;

    for (position, arg) in args.iter().enumerate() {
        let kind_error = |message: String| ExecError::ArgumentKind {
            method: method.to_string(),
            position,
            message,
        };
        match arg {
            Arg::Value(_) | Arg::Values(_) => {
                if page.is_some() || sort.is_some() {
                    return Err(kind_error(
                        "value arguments must precede pagination and sort arguments".to_string(),
                    ));
                }
                slot_args.push(arg);
            }
            Arg::Page(request) => {
                if !plan.accepts_page {
                    return Err(kind_error(
                        "method does not take a pagination argument".to_string(),
                    ));
                }
                if page.replace(request.clone()).is_some() {
                    return Err(kind_error("duplicate pagination argument".to_string()));
                }
            }
            Arg::Sort(spec) => {
                if !plan.accepts_sort {
                    return Err(kind_error("method does not take a sort argument".to_string()));
                }
                if sort.replace(spec.clone()).is_some() {
                    return Err(kind_error("duplicate sort argument".to_string()));
                }
            }
        }
    }

    if slot_args.len() != plan.value_slots {
        return Err(ExecError::ArgumentCount {
            method: method.to_string(),
            expected: plan.value_slots,
            got: slot_args.len(),
        });
    }
    if plan.accepts_page && page.is_none() {
        return Err(ExecError::ArgumentKind {
            method: method.to_string(),
            position: args.len(),
            message: "missing pagination argument".to_string(),
        });
    }
    if plan.accepts_sort && sort.is_none() {
        return Err(ExecError::ArgumentKind {
            method: method.to_string(),
            position: args.len(),
            message: "missing sort argument".to_string(),
        });
    }

    let filter = bind_node(method, &plan.filter, &slot_args)?;
    Ok(BoundCall { filter, page, sort })
}

fn bind_node(method: &str, node: &FilterNode, slot_args: &[&Arg]) -> ExecResult<Filter> {
    match node {
        FilterNode::All => Ok(Filter::All),
        FilterNode::And(left, right) => Ok(Filter::And(
            Box::new(bind_node(method, left, slot_args)?),
            Box::new(bind_node(method, right, slot_args)?),
        )),
        FilterNode::Or(left, right) => Ok(Filter::Or(
            Box::new(bind_node(method, left, slot_args)?),
            Box::new(bind_node(method, right, slot_args)?),
        )),
        FilterNode::Leaf {
            path,
            comparator,
            slots,
        } => {
            let mut values = Vec::with_capacity(slots.len());
            for slot in slots {
                let arg = slot_args.get(*slot).ok_or_else(|| ExecError::ArgumentCount {
                    method: method.to_string(),
                    expected: slot + 1,
                    got: slot_args.len(),
                })?;
                match (comparator.takes_collection(), arg) {
                    (true, Arg::Values(list)) => values.extend(list.iter().cloned()),
                    (true, Arg::Value(_)) => {
                        return Err(ExecError::ArgumentKind {
                            method: method.to_string(),
                            position: *slot,
                            message: "`In` clauses take a collection argument".to_string(),
                        });
                    }
                    (false, Arg::Value(value)) => values.push(value.clone()),
                    (false, Arg::Values(_)) => {
                        return Err(ExecError::ArgumentKind {
                            method: method.to_string(),
                            position: *slot,
                            message: "scalar clause received a collection argument".to_string(),
                        });
                    }
                    (_, Arg::Page(_) | Arg::Sort(_)) => unreachable!("filtered during binding"),
                }
            }
            Ok(Filter::Cmp {
                field: path.clone(),
                comparator: *comparator,
                values,
            })
        }
    }
}
