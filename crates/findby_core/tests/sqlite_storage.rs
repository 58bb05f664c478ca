use findby_core::derive::{MethodSignature, ParamKind};
use findby_core::exec::Arg;
use findby_core::model::Row;
use findby_core::plan::{
    Assignment, Comparator, FilterNode, Operation, QueryPlan, ReturnShape, SortSpec,
};
use findby_core::repo::Repository;
use findby_core::schema::{EntityDescriptor, FieldType, SchemaCatalog};
use findby_core::storage::sqlite::SqliteStore;
use findby_core::storage::StorageError;
use rusqlite::Connection;
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

fn sqlite_repo(conn: &Connection) -> Repository<SqliteStore<'_>> {
    let schema = member_catalog();
    let store = SqliteStore::try_new(conn, Arc::clone(&schema)).unwrap();
    Repository::new("Member", schema, store).unwrap()
}

fn seed(repo: &Repository<SqliteStore<'_>>, members: &[(&str, i64)]) {
    for (username, age) in members {
        repo.save(Row::new().with("username", *username).with("age", *age))
            .unwrap();
    }
}

#[test]
fn derived_query_runs_against_sqlite() {
    let conn = Connection::open_in_memory().unwrap();
    let repo = sqlite_repo(&conn);
    seed(&repo, &[("AAA", 10), ("AAA", 20), ("BBB", 30)]);
    repo.register(
        MethodSignature::new("findByUsernameAndAgeGreaterThan", ReturnShape::Many)
            .param(ParamKind::Value)
            .param(ParamKind::Value),
    )
    .unwrap();

    let rows = repo
        .find(
            "findByUsernameAndAgeGreaterThan",
            &[Arg::from("AAA"), Arg::from(15)],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].int("age"), Some(20));
}

#[test]
fn insert_assigns_rowids_and_round_trips_values() {
    let conn = Connection::open_in_memory().unwrap();
    let repo = sqlite_repo(&conn);

    let saved = repo
        .save(Row::new().with("username", "AAA").with("age", 10))
        .unwrap();
    assert_eq!(saved.int("id"), Some(1));

    repo.register(MethodSignature::new("findAll", ReturnShape::Many))
        .unwrap();
    let rows = repo.find("findAll", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("username"), Some("AAA"));
    assert_eq!(rows[0].int("age"), Some(10));
}

#[test]
fn null_fields_sort_last_in_both_directions() {
    let conn = Connection::open_in_memory().unwrap();
    let repo = sqlite_repo(&conn);
    repo.save(Row::new().with("age", 10)).unwrap();
    repo.save(Row::new().with("username", "BBB").with("age", 10))
        .unwrap();
    repo.save(Row::new().with("username", "AAA").with("age", 10))
        .unwrap();

    repo.register(
        MethodSignature::new("findByAge", ReturnShape::Many)
            .param(ParamKind::Value)
            .param(ParamKind::Sort),
    )
    .unwrap();

    let ascending = repo
        .find("findByAge", &[Arg::from(10), Arg::from(SortSpec::asc("username"))])
        .unwrap();
    let names: Vec<Option<&str>> = ascending.iter().map(|r| r.text("username")).collect();
    assert_eq!(names, [Some("AAA"), Some("BBB"), None]);

    let descending = repo
        .find("findByAge", &[Arg::from(10), Arg::from(SortSpec::desc("username"))])
        .unwrap();
    let names: Vec<Option<&str>> = descending.iter().map(|r| r.text("username")).collect();
    assert_eq!(names, [Some("BBB"), Some("AAA"), None]);
}

#[test]
fn literal_bulk_update_plan_increments_in_place() {
    let conn = Connection::open_in_memory().unwrap();
    let repo = sqlite_repo(&conn);
    seed(&repo, &[("AAA", 19), ("BBB", 20), ("CCC", 21)]);

    let mut plan = QueryPlan::new("Member", Operation::Update, ReturnShape::Many);
    plan.filter = FilterNode::Leaf {
        path: "age".to_string(),
        comparator: Comparator::GreaterThanEqual,
        slots: vec![0],
    };
    plan.value_slots = 1;
    plan.assignments = vec![Assignment::Increment {
        field: "age".to_string(),
        delta: 1,
    }];
    repo.register_plan("bulkAgePlus", plan).unwrap();

    let affected = repo.update("bulkAgePlus", &[Arg::from(20)]).unwrap();
    assert_eq!(affected, 2);

    repo.register(
        MethodSignature::new("findByAgeGreaterThanEqual", ReturnShape::Many)
            .param(ParamKind::Value),
    )
    .unwrap();
    let rows = repo
        .find("findByAgeGreaterThanEqual", &[Arg::from(21)])
        .unwrap();
    let ages: Vec<i64> = rows.iter().filter_map(|r| r.int("age")).collect();
    assert_eq!(ages, [21, 22]);
}

#[test]
fn literal_set_assignment_overwrites_fields() {
    let conn = Connection::open_in_memory().unwrap();
    let repo = sqlite_repo(&conn);
    seed(&repo, &[("AAA", 10), ("BBB", 20)]);

    let mut plan = QueryPlan::new("Member", Operation::Update, ReturnShape::Many);
    plan.filter = FilterNode::Leaf {
        path: "username".to_string(),
        comparator: Comparator::Equals,
        slots: vec![0],
    };
    plan.value_slots = 1;
    plan.assignments = vec![Assignment::Set {
        field: "age".to_string(),
        value: findby_core::Value::Int(0),
    }];
    repo.register_plan("resetAgeByUsername", plan).unwrap();

    assert_eq!(
        repo.update("resetAgeByUsername", &[Arg::from("AAA")]).unwrap(),
        1
    );
}

#[test]
fn delete_reports_removed_row_count() {
    let conn = Connection::open_in_memory().unwrap();
    let repo = sqlite_repo(&conn);
    seed(&repo, &[("AAA", 10), ("BBB", 20), ("CCC", 20)]);
    repo.register(
        MethodSignature::new("deleteByAge", ReturnShape::Many).param(ParamKind::Value),
    )
    .unwrap();
    repo.register(
        MethodSignature::new("countByAge", ReturnShape::Many).param(ParamKind::Value),
    )
    .unwrap();

    assert_eq!(repo.delete("deleteByAge", &[Arg::from(20)]).unwrap(), 2);
    assert_eq!(repo.count("countByAge", &[Arg::from(20)]).unwrap(), 0);
}

#[test]
fn file_backed_database_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("members.db");

    {
        let conn = Connection::open(&path).unwrap();
        let repo = sqlite_repo(&conn);
        seed(&repo, &[("AAA", 10)]);
    }

    let conn = Connection::open(&path).unwrap();
    let repo = sqlite_repo(&conn);
    repo.register(MethodSignature::new("findAll", ReturnShape::Many))
        .unwrap();
    let rows = repo.find("findAll", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("username"), Some("AAA"));
}

#[test]
fn non_integer_primary_keys_are_rejected_at_store_init() {
    let mut catalog = SchemaCatalog::new();
    catalog
        .register(
            EntityDescriptor::new("Tag", "slug").field("slug", FieldType::Text, false),
        )
        .unwrap();
    let schema = Arc::new(catalog);

    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteStore::try_new(&conn, schema).unwrap_err();
    assert!(matches!(err, StorageError::UnsupportedSchema { .. }));
}
