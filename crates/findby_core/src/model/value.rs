//! Scalar value type for rows, filter parameters and sort keys.
//!
//! # Responsibility
//! - Represent every scalar a registered field can hold.
//! - Provide family-aware equality and ordering used by filter
//!   evaluation and in-memory sorting.
//!
//! # Invariants
//! - `Int` and `Float` belong to one numeric family and compare by
//!   numeric value.
//! - `Null` is not equal to `Null`; null checks go through `is_null`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Scalar stored in a [`Row`](super::Row) field or bound as a filter
/// parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Comparison family of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFamily {
    Null,
    Bool,
    Number,
    Text,
}

impl Value {
    /// Returns the comparison family this value belongs to.
    pub fn family(&self) -> ValueFamily {
        match self {
            Self::Null => ValueFamily::Null,
            Self::Bool(_) => ValueFamily::Bool,
            Self::Int(_) | Self::Float(_) => ValueFamily::Number,
            Self::Text(_) => ValueFamily::Text,
        }
    }

    /// Returns whether this value is the SQL-style null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Orders two values of the same family.
    ///
    /// Returns `None` when the families differ or either side is null,
    /// in which case the caller must surface an incomparable-values
    /// error instead of guessing.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality with numeric-family widening (`Int(1)` equals
    /// `Float(1.0)`), and with nulls never equal to anything.
    pub fn semantically_equals(&self, other: &Self) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        match self.compare(other) {
            Some(ordering) => ordering == Ordering::Equal,
            None => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "\"{value}\""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Value, ValueFamily};
    use std::cmp::Ordering;

    #[test]
    fn int_and_float_share_a_family() {
        assert_eq!(Value::Int(1).family(), ValueFamily::Number);
        assert_eq!(Value::Float(1.5).family(), ValueFamily::Number);
        assert_eq!(
            Value::Int(2).compare(&Value::Float(1.5)),
            Some(Ordering::Greater)
        );
        assert!(Value::Int(1).semantically_equals(&Value::Float(1.0)));
    }

    #[test]
    fn cross_family_comparison_is_undefined() {
        assert_eq!(Value::Int(1).compare(&Value::Text("1".to_string())), None);
        assert!(!Value::Int(1).semantically_equals(&Value::Text("1".to_string())));
    }

    #[test]
    fn null_is_not_equal_to_null() {
        assert!(!Value::Null.semantically_equals(&Value::Null));
        assert!(Value::Null.is_null());
    }
}
