//! Tabular data model shared by schema, planning and storage layers.
//!
//! # Responsibility
//! - Define the scalar `Value` type and its comparison semantics.
//! - Define the `Row` record exchanged with storage backends.
//!
//! # Invariants
//! - Ordering is only defined inside one value family (numbers with
//!   numbers, text with text); cross-family ordering is undefined.
//! - `Null` never compares equal to anything, including `Null`.

pub mod row;
pub mod value;

pub use row::Row;
pub use value::{Value, ValueFamily};
