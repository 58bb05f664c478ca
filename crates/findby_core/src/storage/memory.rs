//! In-memory storage backend.
//!
//! # Responsibility
//! - Evaluate bound filters against in-process tables.
//! - Assign monotonic integer primary keys on insert.
//!
//! # Invariants
//! - Scans return deterministic order: requested sort (nulls last),
//!   then primary key ascending as tie-break.
//! - Cross-family ordering comparisons fail instead of guessing.

use crate::model::{Row, Value};
use crate::plan::{Assignment, Comparator, LockMode, SortDirection};
use crate::schema::SchemaCatalog;
use crate::storage::{Filter, ScanOptions, Storage, StorageError, StorageResult};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: Vec<Row>,
}

/// In-memory backend over `RwLock`-guarded tables, one per entity.
#[derive(Debug)]
pub struct MemoryStore {
    schema: Arc<SchemaCatalog>,
    tables: RwLock<HashMap<String, Table>>,
    last_scan_lock: RwLock<LockMode>,
}

impl MemoryStore {
    pub fn new(schema: Arc<SchemaCatalog>) -> Self {
        Self {
            schema,
            tables: RwLock::new(HashMap::new()),
            last_scan_lock: RwLock::new(LockMode::None),
        }
    }

    /// Lock mode the most recent scan carried. Lets callers verify the
    /// locking hint crosses the storage boundary untouched.
    pub fn last_scan_lock(&self) -> LockMode {
        *self.last_scan_lock.read().expect("lock state poisoned")
    }

    fn primary_key(&self, entity: &str) -> StorageResult<String> {
        let descriptor = self
            .schema
            .descriptor(entity)
            .map_err(|_| StorageError::UnknownEntity(entity.to_string()))?;
        Ok(descriptor.primary_key().to_string())
    }
}

impl Storage for MemoryStore {
    fn scan(&self, entity: &str, filter: &Filter, opts: &ScanOptions) -> StorageResult<Vec<Row>> {
        let primary_key = self.primary_key(entity)?;
        *self.last_scan_lock.write().expect("lock state poisoned") = opts.lock;

        let tables = self.tables.read().expect("tables poisoned");
        let mut matched: Vec<Row> = Vec::new();
        if let Some(table) = tables.get(entity) {
            for row in &table.rows {
                if evaluate(filter, row)? {
                    matched.push(row.clone());
                }
            }
        }
        drop(tables);

        matched.sort_by(|a, b| {
            let by_sort = match &opts.sort {
                Some(sort) => {
                    let left = a.value_or_null(&sort.field);
                    let right = b.value_or_null(&sort.field);
                    ordered(&left, &right, sort.direction)
                }
                None => Ordering::Equal,
            };
            by_sort.then_with(|| {
                a.value_or_null(&primary_key)
                    .compare(&b.value_or_null(&primary_key))
                    .unwrap_or(Ordering::Equal)
            })
        });

        let offset = opts.offset.unwrap_or(0) as usize;
        let mut windowed: Vec<Row> = matched.into_iter().skip(offset).collect();
        if let Some(limit) = opts.limit {
            windowed.truncate(limit as usize);
        }
        Ok(windowed)
    }

    fn count(&self, entity: &str, filter: &Filter) -> StorageResult<u64> {
        self.primary_key(entity)?;
        let tables = self.tables.read().expect("tables poisoned");
        let mut total = 0u64;
        if let Some(table) = tables.get(entity) {
            for row in &table.rows {
                if evaluate(filter, row)? {
                    total += 1;
                }
            }
        }
        Ok(total)
    }

    fn insert(&self, entity: &str, mut row: Row) -> StorageResult<Row> {
        let primary_key = self.primary_key(entity)?;
        let mut tables = self.tables.write().expect("tables poisoned");
        let table = tables.entry(entity.to_string()).or_insert_with(|| Table {
            next_id: 1,
            rows: Vec::new(),
        });

        match row.get(&primary_key) {
            None | Some(Value::Null) => {
                row.set(&primary_key, table.next_id);
                table.next_id += 1;
            }
            Some(Value::Int(value)) => {
                table.next_id = table.next_id.max(value + 1);
            }
            Some(_) => {}
        }

        table.rows.push(row.clone());
        Ok(row)
    }

    fn delete_where(&self, entity: &str, filter: &Filter) -> StorageResult<u64> {
        self.primary_key(entity)?;
        let mut tables = self.tables.write().expect("tables poisoned");
        let Some(table) = tables.get_mut(entity) else {
            return Ok(0);
        };

        let mut kept = Vec::with_capacity(table.rows.len());
        let mut removed = 0u64;
        for row in table.rows.drain(..) {
            if evaluate(filter, &row)? {
                removed += 1;
            } else {
                kept.push(row);
            }
        }
        table.rows = kept;
        Ok(removed)
    }

    fn update_where(
        &self,
        entity: &str,
        filter: &Filter,
        assignments: &[Assignment],
    ) -> StorageResult<u64> {
        self.primary_key(entity)?;
        let mut tables = self.tables.write().expect("tables poisoned");
        let Some(table) = tables.get_mut(entity) else {
            return Ok(0);
        };

        let mut affected = 0u64;
        for row in &mut table.rows {
            if !evaluate(filter, row)? {
                continue;
            }
            for assignment in assignments {
                match assignment {
                    Assignment::Set { field, value } => row.set(field, value.clone()),
                    Assignment::Increment { field, delta } => match row.value_or_null(field) {
                        Value::Int(current) => row.set(field, current + delta),
                        other => {
                            return Err(StorageError::InvalidAssignment {
                                field: field.clone(),
                                message: format!("cannot increment non-integer value {other}"),
                            });
                        }
                    },
                }
            }
            affected += 1;
        }
        Ok(affected)
    }
}

fn ordered(left: &Value, right: &Value, direction: SortDirection) -> Ordering {
    // Nulls sort last in both directions; incomparable pairs fall back
    // to the primary-key tie-break.
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ordering = left.compare(right).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    }
}

/// Evaluates one bound filter against one row.
pub(crate) fn evaluate(filter: &Filter, row: &Row) -> StorageResult<bool> {
    match filter {
        Filter::All => Ok(true),
        Filter::And(left, right) => Ok(evaluate(left, row)? && evaluate(right, row)?),
        Filter::Or(left, right) => Ok(evaluate(left, row)? || evaluate(right, row)?),
        Filter::Cmp {
            field,
            comparator,
            values,
        } => evaluate_cmp(field, *comparator, values, row),
    }
}

fn evaluate_cmp(
    field: &str,
    comparator: Comparator,
    values: &[Value],
    row: &Row,
) -> StorageResult<bool> {
    if values.len() < comparator.value_arity() {
        return Err(StorageError::MalformedFilter {
            field: field.to_string(),
        });
    }
    let actual = row.value_or_null(field);

    match comparator {
        Comparator::IsNull => return Ok(actual.is_null()),
        Comparator::IsNotNull => return Ok(!actual.is_null()),
        _ => {}
    }

    // SQL three-valued logic collapsed to boolean: a null on either
    // side of a value comparison is simply no match.
    if actual.is_null() {
        return Ok(false);
    }

    match comparator {
        Comparator::Equals | Comparator::NotEquals => {
            let operand = &values[0];
            if operand.is_null() {
                return Ok(false);
            }
            let ordering = actual
                .compare(operand)
                .ok_or_else(|| StorageError::IncomparableValues {
                    field: field.to_string(),
                })?;
            let equal = ordering == Ordering::Equal;
            Ok(if comparator == Comparator::Equals {
                equal
            } else {
                !equal
            })
        }
        Comparator::GreaterThan
        | Comparator::GreaterThanEqual
        | Comparator::LessThan
        | Comparator::LessThanEqual => {
            let operand = &values[0];
            if operand.is_null() {
                return Ok(false);
            }
            let ordering = actual
                .compare(operand)
                .ok_or_else(|| StorageError::IncomparableValues {
                    field: field.to_string(),
                })?;
            Ok(match comparator {
                Comparator::GreaterThan => ordering == Ordering::Greater,
                Comparator::GreaterThanEqual => ordering != Ordering::Less,
                Comparator::LessThan => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
        Comparator::Between => {
            let (low, high) = (&values[0], &values[1]);
            if low.is_null() || high.is_null() {
                return Ok(false);
            }
            let above = actual
                .compare(low)
                .ok_or_else(|| StorageError::IncomparableValues {
                    field: field.to_string(),
                })?;
            let below = actual
                .compare(high)
                .ok_or_else(|| StorageError::IncomparableValues {
                    field: field.to_string(),
                })?;
            Ok(above != Ordering::Less && below != Ordering::Greater)
        }
        Comparator::In => Ok(values.iter().any(|value| actual.semantically_equals(value))),
        Comparator::Like => {
            let Value::Text(pattern) = &values[0] else {
                return Err(StorageError::IncomparableValues {
                    field: field.to_string(),
                });
            };
            match &actual {
                Value::Text(text) => Ok(like_regex(pattern).is_match(text)),
                _ => Ok(false),
            }
        }
        Comparator::IsNull | Comparator::IsNotNull => unreachable!("handled above"),
    }
}

/// Translates a SQL LIKE pattern (`%` any run, `_` any char) into an
/// anchored regular expression.
fn like_regex(pattern: &str) -> Regex {
    let mut translated = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated).expect("translated LIKE pattern is a valid regex")
}
