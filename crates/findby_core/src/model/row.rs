//! Row record exchanged between the engine and storage backends.
//!
//! # Responsibility
//! - Hold one stored record as an ordered field-name/value map.
//! - Provide typed accessors used by tests, projections and the CLI.
//!
//! # Invariants
//! - Field names are plain (undotted) names local to one entity.
//! - A missing field reads as `Value::Null`.

use crate::model::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One stored record. The primary key is an ordinary field whose name
/// the entity descriptor declares; storage backends assign it on
/// insert when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field assignment.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets one field value, replacing any previous value.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.values.insert(field.to_string(), value.into());
    }

    /// Returns the stored value for `field`, if any was set.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Returns the field value, reading absent fields as `Null`.
    pub fn value_or_null(&self, field: &str) -> Value {
        self.values.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Returns the field as text when it holds a `Text` value.
    pub fn text(&self, field: &str) -> Option<&str> {
        match self.values.get(field) {
            Some(Value::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns the field as an integer when it holds an `Int` value.
    pub fn int(&self, field: &str) -> Option<i64> {
        match self.values.get(field) {
            Some(Value::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Iterates fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}
