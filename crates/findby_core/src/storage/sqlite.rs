//! SQLite storage backend.
//!
//! # Responsibility
//! - Create one table per registered entity from its descriptor.
//! - Render bound filter trees into parameterized WHERE clauses.
//! - Keep scan ordering deterministic (sort, NULLS LAST, primary key
//!   tie-break).
//!
//! # Invariants
//! - SQL text is assembled only from catalog identifiers and `?`
//!   placeholders; every value travels as a bound parameter.
//! - The pessimistic lock hint is accepted and ignored: SQLite has no
//!   row locks to take, and that is logged, not hidden.

use crate::model::{Row, Value};
use crate::plan::{Assignment, Comparator, LockMode, SortDirection};
use crate::schema::{EntityDescriptor, FieldType, SchemaCatalog};
use crate::storage::{Filter, ScanOptions, Storage, StorageError, StorageResult};
use log::{debug, info};
use rusqlite::{params_from_iter, Connection};
use std::sync::Arc;
use std::time::Instant;

/// SQLite-backed storage over a bootstrapped connection.
#[derive(Debug)]
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
    schema: Arc<SchemaCatalog>,
}

impl<'conn> SqliteStore<'conn> {
    /// Creates the backend and the table for every registered entity.
    ///
    /// # Errors
    /// - `UnsupportedSchema` when an entity's primary key is not an
    ///   integer field.
    /// - `Sqlite` for any DDL failure.
    pub fn try_new(conn: &'conn Connection, schema: Arc<SchemaCatalog>) -> StorageResult<Self> {
        let started_at = Instant::now();
        info!("event=store_init module=storage status=start backend=sqlite");

        for descriptor in schema.descriptors() {
            create_table(conn, descriptor)?;
        }

        info!(
            "event=store_init module=storage status=ok backend=sqlite duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(Self { conn, schema })
    }

    fn descriptor(&self, entity: &str) -> StorageResult<&EntityDescriptor> {
        self.schema
            .descriptor(entity)
            .map_err(|_| StorageError::UnknownEntity(entity.to_string()))
    }
}

impl Storage for SqliteStore<'_> {
    fn scan(&self, entity: &str, filter: &Filter, opts: &ScanOptions) -> StorageResult<Vec<Row>> {
        let descriptor = self.descriptor(entity)?;
        if opts.lock == LockMode::PessimisticWrite {
            debug!(
                "event=lock_hint_ignored module=storage backend=sqlite entity={entity} lock=pessimistic_write"
            );
        }

        let columns: Vec<String> = descriptor
            .fields()
            .iter()
            .map(|field| quoted(&field.name))
            .collect();
        let (where_sql, mut params) = render_filter(descriptor, filter)?;

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            columns.join(", "),
            quoted(descriptor.name()),
            where_sql
        );

        sql.push_str(" ORDER BY ");
        if let Some(sort) = &opts.sort {
            check_field(descriptor, &sort.field)?;
            let direction = match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            sql.push_str(&format!(
                "{} {direction} NULLS LAST, ",
                quoted(&sort.field)
            ));
        }
        sql.push_str(&format!("{} ASC", quoted(descriptor.primary_key())));

        match (opts.limit, opts.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(rusqlite::types::Value::Integer(limit as i64));
                params.push(rusqlite::types::Value::Integer(offset.unwrap_or(0) as i64));
            }
            (None, Some(offset)) if offset > 0 => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(rusqlite::types::Value::Integer(offset as i64));
            }
            (None, _) => {}
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut sql_rows = stmt.query(params_from_iter(params))?;
        let mut rows = Vec::new();
        while let Some(sql_row) = sql_rows.next()? {
            rows.push(row_from_sql(descriptor, sql_row)?);
        }
        Ok(rows)
    }

    fn count(&self, entity: &str, filter: &Filter) -> StorageResult<u64> {
        let descriptor = self.descriptor(entity)?;
        let (where_sql, params) = render_filter(descriptor, filter)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {where_sql}",
            quoted(descriptor.name())
        );
        let total: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        Ok(total as u64)
    }

    fn insert(&self, entity: &str, mut row: Row) -> StorageResult<Row> {
        let descriptor = self.descriptor(entity)?;
        let primary_key = descriptor.primary_key();

        let mut columns = Vec::new();
        let mut params = Vec::new();
        for field in descriptor.fields() {
            if let Some(value) = row.get(&field.name) {
                if field.name == primary_key && value.is_null() {
                    continue;
                }
                columns.push(quoted(&field.name));
                params.push(to_sql_value(value));
            }
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quoted(descriptor.name()))
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                quoted(descriptor.name()),
                columns.join(", ")
            )
        };
        self.conn.execute(&sql, params_from_iter(params))?;

        match row.get(primary_key) {
            None | Some(Value::Null) => {
                row.set(primary_key, self.conn.last_insert_rowid());
            }
            Some(_) => {}
        }
        Ok(row)
    }

    fn delete_where(&self, entity: &str, filter: &Filter) -> StorageResult<u64> {
        let descriptor = self.descriptor(entity)?;
        let (where_sql, params) = render_filter(descriptor, filter)?;
        let sql = format!(
            "DELETE FROM {} WHERE {where_sql}",
            quoted(descriptor.name())
        );
        let affected = self.conn.execute(&sql, params_from_iter(params))?;
        Ok(affected as u64)
    }

    fn update_where(
        &self,
        entity: &str,
        filter: &Filter,
        assignments: &[Assignment],
    ) -> StorageResult<u64> {
        let descriptor = self.descriptor(entity)?;

        let mut set_parts = Vec::new();
        let mut params = Vec::new();
        for assignment in assignments {
            match assignment {
                Assignment::Set { field, value } => {
                    check_field(descriptor, field)?;
                    set_parts.push(format!("{} = ?", quoted(field)));
                    params.push(to_sql_value(value));
                }
                Assignment::Increment { field, delta } => {
                    check_field(descriptor, field)?;
                    let column = quoted(field);
                    set_parts.push(format!("{column} = {column} + ?"));
                    params.push(rusqlite::types::Value::Integer(*delta));
                }
            }
        }

        let (where_sql, where_params) = render_filter(descriptor, filter)?;
        params.extend(where_params);
        let sql = format!(
            "UPDATE {} SET {} WHERE {where_sql}",
            quoted(descriptor.name()),
            set_parts.join(", ")
        );
        let affected = self.conn.execute(&sql, params_from_iter(params))?;
        Ok(affected as u64)
    }
}

fn create_table(conn: &Connection, descriptor: &EntityDescriptor) -> StorageResult<()> {
    let primary_key = descriptor.primary_key();
    let key_field = descriptor
        .find_field(primary_key)
        .expect("catalog validated the primary key");
    if key_field.field_type != FieldType::Int {
        return Err(StorageError::UnsupportedSchema {
            entity: descriptor.name().to_string(),
            message: format!("primary key `{primary_key}` must be an integer field"),
        });
    }

    let mut columns = Vec::new();
    for field in descriptor.fields() {
        if field.name == primary_key {
            columns.push(format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                quoted(&field.name)
            ));
        } else {
            let sql_type = match field.field_type {
                FieldType::Int | FieldType::Bool => "INTEGER",
                FieldType::Float => "REAL",
                FieldType::Text => "TEXT",
            };
            columns.push(format!("{} {sql_type}", quoted(&field.name)));
        }
    }

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quoted(descriptor.name()),
        columns.join(", ")
    ))?;
    Ok(())
}

fn render_filter(
    descriptor: &EntityDescriptor,
    filter: &Filter,
) -> StorageResult<(String, Vec<rusqlite::types::Value>)> {
    match filter {
        Filter::All => Ok(("1 = 1".to_string(), Vec::new())),
        Filter::And(left, right) => {
            let (left_sql, mut params) = render_filter(descriptor, left)?;
            let (right_sql, right_params) = render_filter(descriptor, right)?;
            params.extend(right_params);
            Ok((format!("({left_sql} AND {right_sql})"), params))
        }
        Filter::Or(left, right) => {
            let (left_sql, mut params) = render_filter(descriptor, left)?;
            let (right_sql, right_params) = render_filter(descriptor, right)?;
            params.extend(right_params);
            Ok((format!("({left_sql} OR {right_sql})"), params))
        }
        Filter::Cmp {
            field,
            comparator,
            values,
        } => {
            check_field(descriptor, field)?;
            if values.len() < comparator.value_arity() {
                return Err(StorageError::MalformedFilter {
                    field: field.clone(),
                });
            }
            let column = quoted(field);
            match comparator {
                Comparator::IsNull => Ok((format!("{column} IS NULL"), Vec::new())),
                Comparator::IsNotNull => Ok((format!("{column} IS NOT NULL"), Vec::new())),
                Comparator::Between => Ok((
                    format!("{column} BETWEEN ? AND ?"),
                    vec![to_sql_value(&values[0]), to_sql_value(&values[1])],
                )),
                Comparator::In => {
                    if values.is_empty() {
                        // Empty IN matches nothing, same as the memory
                        // backend.
                        return Ok(("1 = 0".to_string(), Vec::new()));
                    }
                    let placeholders = vec!["?"; values.len()].join(", ");
                    Ok((
                        format!("{column} IN ({placeholders})"),
                        values.iter().map(to_sql_value).collect(),
                    ))
                }
                _ => Ok((
                    format!("{column} {} ?", comparator.symbol()),
                    vec![to_sql_value(&values[0])],
                )),
            }
        }
    }
}

fn check_field(descriptor: &EntityDescriptor, field: &str) -> StorageResult<()> {
    if descriptor.find_field(field).is_none() {
        return Err(StorageError::UnknownField {
            entity: descriptor.name().to_string(),
            field: field.to_string(),
        });
    }
    Ok(())
}

fn quoted(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(value) => rusqlite::types::Value::Integer(i64::from(*value)),
        Value::Int(value) => rusqlite::types::Value::Integer(*value),
        Value::Float(value) => rusqlite::types::Value::Real(*value),
        Value::Text(value) => rusqlite::types::Value::Text(value.clone()),
    }
}

fn row_from_sql(descriptor: &EntityDescriptor, sql_row: &rusqlite::Row<'_>) -> StorageResult<Row> {
    let mut row = Row::new();
    for (index, field) in descriptor.fields().iter().enumerate() {
        match field.field_type {
            FieldType::Int => {
                if let Some(value) = sql_row.get::<_, Option<i64>>(index)? {
                    row.set(&field.name, value);
                }
            }
            FieldType::Bool => {
                if let Some(value) = sql_row.get::<_, Option<i64>>(index)? {
                    row.set(&field.name, value != 0);
                }
            }
            FieldType::Float => {
                if let Some(value) = sql_row.get::<_, Option<f64>>(index)? {
                    row.set(&field.name, value);
                }
            }
            FieldType::Text => {
                if let Some(value) = sql_row.get::<_, Option<String>>(index)? {
                    row.set(&field.name, value);
                }
            }
        }
    }
    Ok(row)
}
