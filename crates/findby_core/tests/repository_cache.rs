use findby_core::derive::{MethodSignature, ParamKind};
use findby_core::exec::Arg;
use findby_core::model::Row;
use findby_core::plan::{
    Comparator, FilterNode, LockMode, Operation, QueryPlan, ReturnShape,
};
use findby_core::repo::{RepoError, Repository};
use findby_core::schema::{EntityDescriptor, FieldType, SchemaCatalog};
use findby_core::storage::memory::MemoryStore;
use std::sync::Arc;

fn member_catalog() -> Arc<SchemaCatalog> {
    let mut catalog = SchemaCatalog::new();
    catalog
        .register(
            EntityDescriptor::new("Member", "id")
                .field("id", FieldType::Int, false)
                .field("username", FieldType::Text, true)
                .field("age", FieldType::Int, true),
        )
        .unwrap();
    Arc::new(catalog)
}

fn member_repo() -> Repository<MemoryStore> {
    let schema = member_catalog();
    let store = MemoryStore::new(Arc::clone(&schema));
    Repository::new("Member", schema, store).unwrap()
}

#[test]
fn registration_publishes_one_plan_reused_by_every_call() {
    let repo = member_repo();
    repo.register(
        MethodSignature::new("findByUsername", ReturnShape::Many).param(ParamKind::Value),
    )
    .unwrap();

    let first = repo.plan("findByUsername").unwrap();
    repo.find("findByUsername", &[Arg::from("AAA")]).unwrap();
    repo.find("findByUsername", &[Arg::from("BBB")]).unwrap();
    let second = repo.plan("findByUsername").unwrap();

    // Same Arc, not an equal re-derivation.
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn concurrent_readers_share_the_cache() {
    let repo = Arc::new(member_repo());
    repo.save(Row::new().with("username", "AAA").with("age", 10))
        .unwrap();
    repo.register(
        MethodSignature::new("findByUsername", ReturnShape::Many).param(ParamKind::Value),
    )
    .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repo = Arc::clone(&repo);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let rows = repo.find("findByUsername", &[Arg::from("AAA")]).unwrap();
                    assert_eq!(rows.len(), 1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn repository_for_an_unknown_entity_is_rejected() {
    let schema = member_catalog();
    let store = MemoryStore::new(Arc::clone(&schema));
    let err = Repository::new("Ghost", schema, store).unwrap_err();
    assert!(matches!(err, RepoError::Schema(_)));
}

#[test]
fn literal_plan_and_derived_method_share_one_namespace() {
    let repo = member_repo();
    repo.register(
        MethodSignature::new("findByUsername", ReturnShape::Many).param(ParamKind::Value),
    )
    .unwrap();

    let mut plan = QueryPlan::new("Member", Operation::Find, ReturnShape::Many);
    plan.filter = FilterNode::Leaf {
        path: "username".to_string(),
        comparator: Comparator::Equals,
        slots: vec![0],
    };
    plan.value_slots = 1;
    let err = repo.register_plan("findByUsername", plan).unwrap_err();
    assert!(matches!(err, RepoError::MethodAlreadyRegistered(_)));
}

#[test]
fn literal_plan_name_is_free_of_the_grammar() {
    let repo = member_repo();
    repo.save(Row::new().with("username", "AAA").with("age", 10))
        .unwrap();

    // `membersNamed` derives to nothing; as a literal plan the name is
    // just a cache key.
    let mut plan = QueryPlan::new("Member", Operation::Find, ReturnShape::Many);
    plan.filter = FilterNode::Leaf {
        path: "username".to_string(),
        comparator: Comparator::Equals,
        slots: vec![0],
    };
    plan.value_slots = 1;
    repo.register_plan("membersNamed", plan).unwrap();

    let rows = repo.find("membersNamed", &[Arg::from("AAA")]).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn lock_hint_reaches_the_storage_scan() {
    let repo = member_repo();
    repo.save(Row::new().with("username", "AAA").with("age", 10))
        .unwrap();

    let mut plan = QueryPlan::new("Member", Operation::Find, ReturnShape::One);
    plan.filter = FilterNode::Leaf {
        path: "username".to_string(),
        comparator: Comparator::Equals,
        slots: vec![0],
    };
    plan.value_slots = 1;
    plan.lock = LockMode::PessimisticWrite;
    repo.register_plan("findByUsernameForUpdate", plan).unwrap();

    repo.find_one("findByUsernameForUpdate", &[Arg::from("AAA")])
        .unwrap();
    assert_eq!(repo.store().last_scan_lock(), LockMode::PessimisticWrite);

    repo.register(
        MethodSignature::new("findByUsername", ReturnShape::Many).param(ParamKind::Value),
    )
    .unwrap();
    repo.find("findByUsername", &[Arg::from("AAA")]).unwrap();
    assert_eq!(repo.store().last_scan_lock(), LockMode::None);
}

#[test]
fn typed_surface_rejects_shape_mismatches() {
    let repo = member_repo();
    repo.register(
        MethodSignature::new("countByAge", ReturnShape::Many).param(ParamKind::Value),
    )
    .unwrap();

    let err = repo.find("countByAge", &[Arg::from(10)]).unwrap_err();
    match err {
        RepoError::ShapeMismatch { expected, got, .. } => {
            assert_eq!(expected, "rows");
            assert_eq!(got, "count");
        }
        other => panic!("expected ShapeMismatch, got {other:?}"),
    }
}

#[test]
fn plans_describe_and_serialize_stably() {
    let repo = member_repo();
    repo.register(
        MethodSignature::new("findByUsernameAndAgeGreaterThan", ReturnShape::Many)
            .param(ParamKind::Value)
            .param(ParamKind::Value),
    )
    .unwrap();

    let plan = repo.plan("findByUsernameAndAgeGreaterThan").unwrap();
    assert_eq!(
        plan.describe(),
        "find Member where username = ?0 AND age > ?1"
    );

    let json = serde_json::to_string(plan.as_ref()).unwrap();
    let restored: QueryPlan = serde_json::from_str(&json).unwrap();
    assert_eq!(*plan, restored);
}
