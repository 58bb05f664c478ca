//! Predicate compiler: parsed clauses to an executable filter tree.
//!
//! # Responsibility
//! - Assign parameter slots left-to-right in clause declaration order.
//! - Shape the tree so `And` binds tighter than `Or`.
//!
//! # Invariants
//! - The produced plan is parameterized and reusable; binding happens
//!   per invocation in the execution adapter.
//! - Slot numbering is dense and starts at zero.

use crate::derive::parser::ParsedMethod;
use crate::plan::{Connector, FilterNode, QueryPlan};

/// Compiles a parsed method into a reusable query plan.
pub fn compile(entity: &str, parsed: &ParsedMethod) -> QueryPlan {
    let mut next_slot = 0usize;

    // And-runs first, then Or-join the runs, folding left so clause
    // order is preserved in the tree and in slot numbering.
    let mut or_groups: Vec<FilterNode> = Vec::new();
    let mut current: Option<FilterNode> = None;

    for clause in &parsed.clauses {
        let arity = clause.comparator.value_arity();
        let slots: Vec<usize> = (next_slot..next_slot + arity).collect();
        next_slot += arity;

        let leaf = FilterNode::Leaf {
            path: clause.path.clone(),
            comparator: clause.comparator,
            slots,
        };
        current = Some(match current.take() {
            None => leaf,
            Some(left) => FilterNode::And(Box::new(left), Box::new(leaf)),
        });

        if clause.connector == Some(Connector::Or) {
            or_groups.push(current.take().expect("current group is non-empty"));
        }
    }
    if let Some(group) = current {
        or_groups.push(group);
    }

    let filter = match or_groups.len() {
        0 => FilterNode::All,
        _ => {
            let mut groups = or_groups.into_iter();
            let first = groups.next().expect("at least one group");
            groups.fold(first, |left, right| {
                FilterNode::Or(Box::new(left), Box::new(right))
            })
        }
    };

    let mut plan = QueryPlan::new(entity, parsed.operation, parsed.shape);
    plan.filter = filter;
    plan.value_slots = next_slot;
    plan.accepts_page = parsed.accepts_page;
    plan.accepts_sort = parsed.accepts_sort;
    plan
}

#[cfg(test)]
mod tests {
    use super::compile;
    use crate::derive::{parse, MethodSignature, ParamKind};
    use crate::plan::{FilterNode, ReturnShape};
    use crate::schema::{EntityDescriptor, FieldType, SchemaCatalog};

    fn catalog() -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new();
        catalog
            .register(
                EntityDescriptor::new("Member", "id")
                    .field("id", FieldType::Int, false)
                    .field("username", FieldType::Text, true)
                    .field("age", FieldType::Int, true),
            )
            .unwrap();
        catalog
    }

    fn plan_for(name: &str, params: &[ParamKind]) -> crate::plan::QueryPlan {
        let mut signature = MethodSignature::new(name, ReturnShape::Many);
        for kind in params {
            signature = signature.param(*kind);
        }
        let parsed = parse("Member", &signature, &catalog()).unwrap();
        compile("Member", &parsed)
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let plan = plan_for(
            "findByUsernameAndAgeGreaterThanOrUsernameLike",
            &[ParamKind::Value, ParamKind::Value, ParamKind::Value],
        );
        // (username = ?0 AND age > ?1) OR username LIKE ?2
        match &plan.filter {
            FilterNode::Or(left, right) => {
                assert!(matches!(**left, FilterNode::And(_, _)));
                assert!(matches!(**right, FilterNode::Leaf { .. }));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
        assert_eq!(plan.value_slots, 3);
        assert_eq!(plan.filter.leaf_count(), 3);
    }

    #[test]
    fn slots_are_assigned_in_declaration_order() {
        let plan = plan_for(
            "findByAgeBetweenAndUsername",
            &[ParamKind::Value, ParamKind::Value, ParamKind::Value],
        );
        assert_eq!(
            plan.filter.describe(),
            "age BETWEEN ?0 AND ?1 AND username = ?2"
        );
    }

    #[test]
    fn match_all_compiles_to_the_all_node() {
        let plan = plan_for("findAll", &[]);
        assert_eq!(plan.filter, FilterNode::All);
        assert_eq!(plan.value_slots, 0);
    }
}
