//! Query derivation: method names in, parameterized plans out.
//!
//! # Responsibility
//! - Define the registered method signature contract (name, declared
//!   parameter kinds, return shape).
//! - Surface derivation errors with the triggering method name and
//!   clause index attached.
//!
//! # Invariants
//! - Derivation failures are registration-time failures; a method that
//!   fails to derive is never callable.
//! - Field paths are validated against the schema catalog during
//!   parsing, never per invocation.

pub mod compile;
pub mod parser;

pub use compile::compile;
pub use parser::{parse, ParsedMethod};

use crate::plan::ReturnShape;
use crate::schema::SchemaError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for derivation.
pub type DeriveResult<T> = Result<T, DeriveError>;

/// Declared kind of one method parameter. Trailing `Page` and `Sort`
/// parameters are recognized by kind, never by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// One scalar filter parameter.
    Value,
    /// One collection parameter, consumed by `In`.
    ValueList,
    /// Trailing pagination window.
    Page,
    /// Trailing per-call sort.
    Sort,
}

/// A repository method signature as registered by the caller.
///
/// The return shape is declared explicitly: the engine has no caller
/// return type to reflect over, so the registration carries what the
/// original system encoded in the method's declared return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<ParamKind>,
    pub shape: ReturnShape,
}

impl MethodSignature {
    pub fn new(name: &str, shape: ReturnShape) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            shape,
        }
    }

    /// Appends one declared parameter.
    pub fn param(mut self, kind: ParamKind) -> Self {
        self.params.push(kind);
        self
    }
}

/// Registration-time derivation error. Fatal for the offending method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeriveError {
    /// The method name does not fit the grammar, or its segments do
    /// not line up with the declared parameters.
    MalformedMethodName {
        method: String,
        clause: Option<usize>,
        message: String,
    },
    /// A segment ends in comparator keywords that match no known
    /// comparator.
    UnknownComparator {
        method: String,
        clause: usize,
        suffix: String,
    },
    /// A clause field path failed schema catalog validation.
    UnknownField {
        method: String,
        clause: usize,
        source: SchemaError,
    },
}

impl DeriveError {
    fn clause_suffix(clause: Option<usize>) -> String {
        match clause {
            Some(index) => format!(" (clause {index})"),
            None => String::new(),
        }
    }
}

impl Display for DeriveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedMethodName {
                method,
                clause,
                message,
            } => write!(
                f,
                "malformed method name `{method}`{}: {message}",
                Self::clause_suffix(*clause)
            ),
            Self::UnknownComparator {
                method,
                clause,
                suffix,
            } => write!(
                f,
                "unknown comparator suffix `{suffix}` in method `{method}` (clause {clause})"
            ),
            Self::UnknownField {
                method,
                clause,
                source,
            } => write!(f, "method `{method}` (clause {clause}): {source}"),
        }
    }
}

impl Error for DeriveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UnknownField { source, .. } => Some(source),
            _ => None,
        }
    }
}
