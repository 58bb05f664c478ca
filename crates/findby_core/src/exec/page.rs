//! Paged result payloads.
//!
//! # Responsibility
//! - Carry one window of rows plus pagination metadata.
//!
//! # Invariants
//! - `total_elements` is `Some` for page semantics and `None` for
//!   slice semantics; slices only know whether a next window exists.

use crate::model::Row;
use serde::{Deserialize, Serialize};

/// One window of a paginated result.
///
/// Page-shaped queries fill `total_elements`; slice-shaped queries
/// leave it `None` and derive `has_next` by probing one row past the
/// window instead of counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub rows: Vec<Row>,
    /// Zero-based page index.
    pub number: u32,
    /// Requested window size (the row count may be smaller on the
    /// final page).
    pub size: u32,
    /// Total matching rows; `None` under slice semantics.
    pub total_elements: Option<u64>,
    pub has_next: bool,
}

impl Page {
    /// Total page count, when the total element count is known.
    pub fn total_pages(&self) -> Option<u64> {
        self.total_elements.map(|total| {
            if self.size == 0 {
                0
            } else {
                total.div_ceil(u64::from(self.size))
            }
        })
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }
}
