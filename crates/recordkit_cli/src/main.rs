//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise define, create and read against an in-memory engine.
//! - Print one JSON line per step for quick local sanity checks.

use recordkit_core::{
    AccessOptions, AccessService, Catalog, ControlService, FieldRule, ModelConfig,
    ObjectSchema, RecordConfig, RecordError, SqliteEngine,
};
use serde_json::{json, Value};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    println!("recordkit_core ping={}", recordkit_core::ping());
    println!("recordkit_core version={}", recordkit_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=cli_smoke module=cli status=error error_code={}", err.code());
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), RecordError> {
    let engine = Arc::new(SqliteEngine::open_in_memory()?);
    let mut catalog = Catalog::new(engine);
    catalog.define(
        "Account",
        ModelConfig::new("Accounts", "id").with_schema(
            ObjectSchema::new()
                .field("id", FieldRule::string().required())
                .field("email", FieldRule::string().email().required())
                .field("name", FieldRule::string().max_len(64)),
        ),
        Some(RecordConfig::new().with_create_normalize(|mut data| {
            if let Some(Value::String(email)) = data.get_mut("email") {
                *email = email.trim().to_lowercase();
            }
            data
        })),
    )?;

    let catalog = Arc::new(catalog);
    let control = ControlService::new(Arc::clone(&catalog));
    let access = AccessService::new(catalog);

    let id = uuid::Uuid::new_v4().to_string();
    let created = control.create(
        "Account",
        json!({ "id": id, "email": " Demo@Example.com ", "name": "demo" }),
        None,
    )?;
    println!("{}", json!({ "step": "create", "item": created.into_value() }));

    let fetched = access.get_item(
        "Account",
        id.as_str(),
        Some(AccessOptions::default().with_format("first")),
    )?;
    println!("{}", json!({ "step": "get", "item": fetched.into_value() }));

    Ok(())
}
