use findby_core::derive::{MethodSignature, ParamKind};
use findby_core::exec::Arg;
use findby_core::model::Row;
use findby_core::plan::{Comparator, FilterNode, Operation, QueryPlan, ReturnShape};
use findby_core::repo::{RepoError, Repository};
use findby_core::schema::{EntityDescriptor, FieldType, SchemaCatalog, SchemaError};
use findby_core::storage::memory::MemoryStore;
use findby_core::storage::Storage;
use std::sync::Arc;

fn catalog() -> Arc<SchemaCatalog> {
    let mut catalog = SchemaCatalog::new();
    catalog
        .register(
            EntityDescriptor::new("Member", "id")
                .field("id", FieldType::Int, false)
                .field("username", FieldType::Text, true)
                .field("age", FieldType::Int, true)
                .field("teamId", FieldType::Int, true)
                .relation("team", "teamId", "Team", "id"),
        )
        .unwrap();
    catalog
        .register(
            EntityDescriptor::new("Team", "id")
                .field("id", FieldType::Int, false)
                .field("name", FieldType::Text, true),
        )
        .unwrap();
    Arc::new(catalog)
}

struct Fixture {
    members: Repository<MemoryStore>,
}

fn fixture() -> Fixture {
    let schema = catalog();
    let store = MemoryStore::new(Arc::clone(&schema));

    store
        .insert("Team", Row::new().with("name", "teamA"))
        .unwrap();
    store
        .insert("Team", Row::new().with("name", "teamB"))
        .unwrap();

    let members = Repository::new("Member", schema, store).unwrap();
    for (username, age, team) in [("AAA", 10, 1i64), ("BBB", 20, 1), ("CCC", 30, 2)] {
        members
            .save(
                Row::new()
                    .with("username", username)
                    .with("age", age)
                    .with("teamId", team),
            )
            .unwrap();
    }
    Fixture { members }
}

#[test]
fn dotted_predicate_filters_through_the_relation() {
    let repo = fixture().members;
    repo.register(
        MethodSignature::new("findByTeam_Name", ReturnShape::Many).param(ParamKind::Value),
    )
    .unwrap();

    let rows = repo.find("findByTeam_Name", &[Arg::from("teamA")]).unwrap();
    let usernames: Vec<&str> = rows.iter().filter_map(|r| r.text("username")).collect();
    assert_eq!(usernames, ["AAA", "BBB"]);
}

#[test]
fn dotted_predicate_combines_with_local_clauses() {
    let repo = fixture().members;
    repo.register(
        MethodSignature::new("findByTeam_NameAndAgeGreaterThan", ReturnShape::Many)
            .param(ParamKind::Value)
            .param(ParamKind::Value),
    )
    .unwrap();

    let rows = repo
        .find(
            "findByTeam_NameAndAgeGreaterThan",
            &[Arg::from("teamA"), Arg::from(15)],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("username"), Some("BBB"));
}

#[test]
fn dotted_path_to_an_unknown_relation_fails_registration() {
    let repo = fixture().members;
    let err = repo
        .register(
            MethodSignature::new("findBySquad_Name", ReturnShape::Many).param(ParamKind::Value),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Derive(findby_core::derive::DeriveError::UnknownField { .. })
    ));
}

#[test]
fn fetch_relations_load_related_rows_alongside_the_result() {
    let repo = fixture().members;

    let mut plan = QueryPlan::new("Member", Operation::Find, ReturnShape::Many);
    plan.filter = FilterNode::Leaf {
        path: "age".to_string(),
        comparator: Comparator::GreaterThanEqual,
        slots: vec![0],
    };
    plan.value_slots = 1;
    plan.fetch_relations = vec!["team".to_string()];
    repo.register_plan("findWithTeamByMinAge", plan).unwrap();

    let result = repo
        .find_with_related("findWithTeamByMinAge", &[Arg::from(20)])
        .unwrap();

    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.related.len(), 1);
    let related = &result.related[0];
    assert_eq!(related.relation, "team");
    assert_eq!(related.matches.len(), result.rows.len());
    // BBB belongs to teamA, CCC to teamB.
    assert_eq!(related.matches[0][0].text("name"), Some("teamA"));
    assert_eq!(related.matches[1][0].text("name"), Some("teamB"));
}

#[test]
fn fetch_relation_with_a_null_key_yields_no_related_rows() {
    let repo = fixture().members;
    repo.save(Row::new().with("username", "DDD").with("age", 40))
        .unwrap();

    let mut plan = QueryPlan::new("Member", Operation::Find, ReturnShape::Many);
    plan.fetch_relations = vec!["team".to_string()];
    repo.register_plan("findAllWithTeam", plan).unwrap();

    let result = repo.find_with_related("findAllWithTeam", &[]).unwrap();
    assert_eq!(result.rows.len(), 4);
    let orphan = result.related[0]
        .matches
        .last()
        .expect("four member rows give four match lists");
    assert!(orphan.is_empty());
}

#[test]
fn unknown_fetch_relation_fails_plan_registration() {
    let repo = fixture().members;
    let mut plan = QueryPlan::new("Member", Operation::Find, ReturnShape::Many);
    plan.fetch_relations = vec!["squad".to_string()];
    let err = repo.register_plan("findAllWithSquad", plan).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Schema(SchemaError::UnknownField { .. })
    ));
}

#[test]
fn projection_maps_rows_through_an_explicit_mapper() {
    let repo = fixture().members;
    repo.register(
        MethodSignature::new("findByAgeGreaterThan", ReturnShape::Many).param(ParamKind::Value),
    )
    .unwrap();

    #[derive(Debug, PartialEq)]
    struct UsernameOnly {
        username: String,
    }

    let projected = repo
        .find_projected("findByAgeGreaterThan", &[Arg::from(15)], |row| {
            row.text("username")
                .map(|username| UsernameOnly {
                    username: username.to_string(),
                })
                .ok_or_else(|| "username is null".to_string())
        })
        .unwrap();

    assert_eq!(
        projected,
        [
            UsernameOnly {
                username: "BBB".to_string()
            },
            UsernameOnly {
                username: "CCC".to_string()
            }
        ]
    );
}

#[test]
fn projection_mapper_failure_surfaces_the_method() {
    let repo = fixture().members;
    repo.save(Row::new().with("age", 50)).unwrap();
    repo.register(MethodSignature::new("findAll", ReturnShape::Many))
        .unwrap();

    let err = repo
        .find_projected("findAll", &[], |row| {
            row.text("username")
                .map(str::to_string)
                .ok_or_else(|| "username is null".to_string())
        })
        .unwrap_err();
    match err {
        RepoError::Projection { method, message } => {
            assert_eq!(method, "findAll");
            assert!(message.contains("null"));
        }
        other => panic!("expected Projection, got {other:?}"),
    }
}
