//! Query plan data model: the compiled, parameterized form of a query.
//!
//! # Responsibility
//! - Define comparators, clauses, filter trees, sort and pagination
//!   contracts shared by the parser, compiler, adapter and storage.
//! - Render plans to a stable human-readable description.
//!
//! # Invariants
//! - Plans are parameterized: they hold slot indices, never bound
//!   values, so one plan serves every invocation of its method.
//! - `And` binds tighter than `Or`; the tree shape encodes precedence.
//! - Comparator parameter arity is fixed: `Between` takes 2 values,
//!   `In` takes 1 collection, `IsNull`/`IsNotNull` take none, all
//!   others take 1 value.

use serde::{Deserialize, Serialize};

/// Filter comparator derived from a method-name suffix or supplied in
/// a literal plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Like,
    In,
    IsNull,
    IsNotNull,
    Between,
}

impl Comparator {
    /// Number of scalar parameter slots this comparator consumes.
    pub fn value_arity(self) -> usize {
        match self {
            Self::IsNull | Self::IsNotNull => 0,
            Self::Between => 2,
            _ => 1,
        }
    }

    /// Whether the single consumed parameter must be a collection.
    pub fn takes_collection(self) -> bool {
        matches!(self, Self::In)
    }

    /// SQL-flavoured operator symbol used in descriptions and by the
    /// SQLite backend.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "<>",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::Like => "LIKE",
            Self::In => "IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
            Self::Between => "BETWEEN",
        }
    }
}

/// Logical connector between one clause and the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connector {
    And,
    Or,
}

/// One filter condition parsed from a method-name segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateClause {
    /// Field path, possibly dotted through relations (`team.name`).
    pub path: String,
    pub comparator: Comparator,
    /// Connector to the following clause; `None` on the last clause.
    pub connector: Option<Connector>,
}

/// Operation kind of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Find,
    Count,
    Exists,
    Delete,
    Update,
}

/// Result shape a `Find` plan produces for its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnShape {
    /// At most one row; more than one match is an error.
    One,
    /// Plain ordered sequence.
    Many,
    /// Windowed result with total element count.
    Page,
    /// Windowed result without a count, only a has-next flag.
    Slice,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

/// Pagination window requested by the caller at invocation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based page index.
    pub page: u32,
    /// Page size; must be non-zero.
    pub size: u32,
    /// Optional per-call sort carried with the window.
    pub sort: Option<SortSpec>,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            sort: None,
        }
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Row offset of this window.
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

/// Locking hint forwarded to the storage backend untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    #[default]
    None,
    /// Ask the backend to take exclusive row locks for the scan.
    PessimisticWrite,
}

/// One field assignment of an `Update` plan. Assignment operands are
/// plan constants; only the filter is parameterized per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assignment {
    Set {
        field: String,
        value: crate::model::Value,
    },
    Increment {
        field: String,
        delta: i64,
    },
}

/// Parameterized filter tree. Leaves carry parameter slot indices
/// assigned left-to-right in clause declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterNode {
    /// Match-all marker used by `findAll`-style plans.
    All,
    Leaf {
        path: String,
        comparator: Comparator,
        slots: Vec<usize>,
    },
    And(Box<FilterNode>, Box<FilterNode>),
    Or(Box<FilterNode>, Box<FilterNode>),
}

impl FilterNode {
    /// Number of leaf conditions in this tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::All => 0,
            Self::Leaf { .. } => 1,
            Self::And(left, right) | Self::Or(left, right) => {
                left.leaf_count() + right.leaf_count()
            }
        }
    }

    /// Renders the tree as a human-readable predicate, preserving
    /// clause order and making precedence explicit with parentheses.
    pub fn describe(&self) -> String {
        match self {
            Self::All => "true".to_string(),
            Self::Leaf {
                path,
                comparator,
                slots,
            } => match comparator {
                Comparator::IsNull | Comparator::IsNotNull => {
                    format!("{path} {}", comparator.symbol())
                }
                Comparator::Between => {
                    format!("{path} BETWEEN ?{} AND ?{}", slots[0], slots[1])
                }
                Comparator::In => format!("{path} IN ?{}", slots[0]),
                _ => format!("{path} {} ?{}", comparator.symbol(), slots[0]),
            },
            Self::And(left, right) => {
                format!("{} AND {}", left.describe(), right.describe())
            }
            Self::Or(left, right) => {
                format!(
                    "{} OR {}",
                    parenthesize_and(left),
                    parenthesize_and(right)
                )
            }
        }
    }
}

fn parenthesize_and(node: &FilterNode) -> String {
    match node {
        FilterNode::And(_, _) => format!("({})", node.describe()),
        _ => node.describe(),
    }
}

/// The compiled, parameterized representation of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub entity: String,
    pub operation: Operation,
    pub shape: ReturnShape,
    pub filter: FilterNode,
    /// Total scalar slots the filter consumes.
    pub value_slots: usize,
    /// Static sort baked into the plan (literal plans only).
    pub sort: Option<SortSpec>,
    /// Whether the method takes a trailing per-call sort parameter.
    pub accepts_sort: bool,
    /// Whether the method takes a trailing pagination parameter.
    pub accepts_page: bool,
    /// Relations to fetch eagerly after the main scan.
    pub fetch_relations: Vec<String>,
    pub lock: LockMode,
    /// Assignments applied by `Update` plans.
    pub assignments: Vec<Assignment>,
}

impl QueryPlan {
    /// Starts a literal plan; fields are public so callers can refine
    /// sort, fetch list, lock mode and assignments directly.
    pub fn new(entity: &str, operation: Operation, shape: ReturnShape) -> Self {
        Self {
            entity: entity.to_string(),
            operation,
            shape,
            filter: FilterNode::All,
            value_slots: 0,
            sort: None,
            accepts_sort: false,
            accepts_page: false,
            fetch_relations: Vec::new(),
            lock: LockMode::default(),
            assignments: Vec::new(),
        }
    }

    /// One-line description: operation, entity and predicate.
    pub fn describe(&self) -> String {
        let operation = match self.operation {
            Operation::Find => "find",
            Operation::Count => "count",
            Operation::Exists => "exists",
            Operation::Delete => "delete",
            Operation::Update => "update",
        };
        format!("{operation} {} where {}", self.entity, self.filter.describe())
    }
}
