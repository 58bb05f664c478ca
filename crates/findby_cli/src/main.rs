//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `findby_core` wiring:
//!   register a schema, derive one method, run it end to end.
//! - Keep output deterministic for quick local sanity checks.

use findby_core::{
    Arg, EntityDescriptor, FieldType, MethodSignature, ParamKind, Repository, ReturnShape, Row,
    SchemaCatalog,
};
use findby_core::storage::memory::MemoryStore;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("findby smoke failed: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    println!("findby_core version={}", findby_core::core_version());

    let mut catalog = SchemaCatalog::new();
    catalog
        .register(
            EntityDescriptor::new("Member", "id")
                .field("id", FieldType::Int, false)
                .field("username", FieldType::Text, true)
                .field("age", FieldType::Int, true),
        )
        .map_err(|err| err.to_string())?;
    let schema = Arc::new(catalog);

    let store = MemoryStore::new(Arc::clone(&schema));
    let repo = Repository::new("Member", schema, store).map_err(|err| err.to_string())?;

    repo.save(Row::new().with("username", "AAA").with("age", 10))
        .map_err(|err| err.to_string())?;
    repo.save(Row::new().with("username", "AAA").with("age", 20))
        .map_err(|err| err.to_string())?;

    repo.register(
        MethodSignature::new("findByUsernameAndAgeGreaterThan", ReturnShape::Many)
            .param(ParamKind::Value)
            .param(ParamKind::Value),
    )
    .map_err(|err| err.to_string())?;

    let rows = repo
        .find(
            "findByUsernameAndAgeGreaterThan",
            &[Arg::from("AAA"), Arg::from(15)],
        )
        .map_err(|err| err.to_string())?;

    for row in &rows {
        println!(
            "matched username={} age={}",
            row.text("username").unwrap_or("<null>"),
            row.int("age").unwrap_or(-1)
        );
    }
    if rows.len() == 1 {
        Ok(())
    } else {
        Err(format!("expected exactly one match, got {}", rows.len()))
    }
}
