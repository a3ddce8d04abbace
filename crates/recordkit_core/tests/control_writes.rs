use recordkit_core::storage::query::QueryRequest;
use recordkit_core::storage::{EngineParams, StorageResult};
use recordkit_core::{
    AccessService, Catalog, ConflictError, ControlService, CreateOptions, Document, EngineResult,
    FieldRule, GuardConfig, ItemKey, ManualClock, ModelConfig, NoopGuardCache, ObjectSchema,
    RecordConfig, RecordError, SqliteEngine, StorageEngine, StorageError, TableSpec,
    TtlGuardCache, ValidationError, WriteOptions, WriteParams,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Delegating engine that records every write it receives.
struct RecordingEngine {
    inner: SqliteEngine,
    writes: AtomicUsize,
    last_params: Mutex<Option<WriteParams>>,
}

impl RecordingEngine {
    fn new() -> Self {
        Self {
            inner: SqliteEngine::open_in_memory().unwrap(),
            writes: AtomicUsize::new(0),
            last_params: Mutex::new(None),
        }
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn last_params(&self) -> WriteParams {
        self.last_params.lock().unwrap().clone().expect("a write was sent")
    }

    fn record(&self, params: &WriteParams) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params.clone());
    }
}

impl StorageEngine for RecordingEngine {
    fn define_table(&self, table: &TableSpec) -> StorageResult<()> {
        self.inner.define_table(table)
    }

    fn get_item(
        &self,
        table: &TableSpec,
        key: &ItemKey,
        params: &EngineParams,
    ) -> StorageResult<EngineResult> {
        self.inner.get_item(table, key, params)
    }

    fn batch_get(
        &self,
        table: &TableSpec,
        keys: &[ItemKey],
        params: &EngineParams,
    ) -> StorageResult<EngineResult> {
        self.inner.batch_get(table, keys, params)
    }

    fn put_item(
        &self,
        table: &TableSpec,
        item: &Document,
        params: &WriteParams,
    ) -> StorageResult<EngineResult> {
        self.record(params);
        self.inner.put_item(table, item, params)
    }

    fn update_item(
        &self,
        table: &TableSpec,
        item: &Document,
        params: &WriteParams,
    ) -> StorageResult<EngineResult> {
        self.record(params);
        self.inner.update_item(table, item, params)
    }

    fn delete_item(
        &self,
        table: &TableSpec,
        key: &ItemKey,
        params: &WriteParams,
    ) -> StorageResult<EngineResult> {
        self.record(params);
        self.inner.delete_item(table, key, params)
    }

    fn query(&self, table: &TableSpec, request: &QueryRequest) -> StorageResult<EngineResult> {
        self.inner.query(table, request)
    }
}

struct Fixture {
    engine: Arc<RecordingEngine>,
    clock: Arc<ManualClock>,
    control: ControlService,
    access: AccessService,
}

fn fixture() -> Fixture {
    let engine = Arc::new(RecordingEngine::new());
    let mut catalog = Catalog::new(engine.clone());
    catalog
        .define(
            "Event",
            ModelConfig::new("Events", "id").with_range_key("sort"),
            Some(
                RecordConfig::new().with_update_schema(
                    ObjectSchema::new()
                        .field("id", FieldRule::string().required())
                        .field("sort", FieldRule::integer().required())
                        .field("title", FieldRule::string().nullable()),
                ),
            ),
        )
        .unwrap();
    catalog
        .define(
            "Account",
            ModelConfig::new("Accounts", "id").with_schema(
                ObjectSchema::new()
                    .field("id", FieldRule::string().required())
                    .field("email", FieldRule::string().email().required()),
            ),
            None,
        )
        .unwrap();

    let catalog = Arc::new(catalog);
    let clock = Arc::new(ManualClock::new());
    let guard = Arc::new(TtlGuardCache::with_clock(clock.clone()));
    Fixture {
        engine,
        clock,
        control: ControlService::with_guard(Arc::clone(&catalog), guard, GuardConfig::default()),
        access: AccessService::new(catalog),
    }
}

#[test]
fn create_synthesizes_not_equal_condition_on_hash_and_range_key() {
    let fx = fixture();
    fx.control
        .create("Event", json!({ "id": "x", "sort": 1, "title": "t" }), None)
        .unwrap();

    let params = fx.engine.last_params();
    assert_eq!(params.condition(), Some("#id <> :id AND #sort <> :sort"));
    assert_eq!(params.expression_attribute_names.len(), 2);
    assert_eq!(params.expression_attribute_names["#id"], "id");
    assert_eq!(params.expression_attribute_names["#sort"], "sort");
    assert_eq!(params.expression_attribute_values[":id"], json!("x"));
    assert_eq!(params.expression_attribute_values[":sort"], json!(1));
}

#[test]
fn update_synthesizes_equal_condition_on_hash_and_range_key() {
    let fx = fixture();
    fx.control
        .create("Event", json!({ "id": "x", "sort": 1, "title": "t" }), None)
        .unwrap();
    let updated = fx
        .control
        .update(
            "Event",
            json!({ "id": "x", "sort": 1, "title": "renamed", "extra": 1 }),
            None,
        )
        .unwrap();

    let params = fx.engine.last_params();
    assert_eq!(params.condition(), Some("#id = :id AND #sort = :sort"));
    assert_eq!(params.expression_attribute_values[":id"], json!("x"));
    assert_eq!(params.expression_attribute_values[":sort"], json!(1));
    assert_eq!(
        updated.into_value(),
        json!({ "id": "x", "sort": 1, "title": "renamed" })
    );
}

#[test]
fn duplicate_create_fails_the_conditional_write() {
    let fx = fixture();
    let data = json!({ "id": "a1", "email": "a@b.io" });
    fx.control.create("Account", data.clone(), None).unwrap();

    let err = fx.control.create("Account", data, None).unwrap_err();
    assert!(matches!(
        err,
        RecordError::Storage(StorageError::ConditionalCheckFailed { .. })
    ));
    assert_eq!(fx.engine.writes(), 2);
}

#[test]
fn update_of_missing_item_fails_the_conditional_write() {
    let fx = fixture();
    let err = fx
        .control
        .update("Event", json!({ "id": "nope", "sort": 1 }), None)
        .unwrap_err();
    assert!(matches!(
        err,
        RecordError::Storage(StorageError::ConditionalCheckFailed { .. })
    ));
    assert!(fx
        .access
        .get_item_by_range_key("Event", "nope", 1, None)
        .unwrap()
        .into_value()
        .is_null());
}

#[test]
fn caller_condition_is_sent_untouched() {
    let fx = fixture();
    let params: WriteParams = serde_json::from_value(json!({
        "ConditionExpression": "attribute_not_exists(#id)",
        "ExpressionAttributeNames": { "#id": "id" }
    }))
    .unwrap();

    fx.control
        .create(
            "Account",
            json!({ "id": "a1", "email": "a@b.io" }),
            Some(CreateOptions::default().with_params(params.clone())),
        )
        .unwrap();
    assert_eq!(fx.engine.last_params(), params);
}

#[test]
fn validation_failure_never_reaches_storage() {
    let fx = fixture();
    let err = fx
        .control
        .create("Account", json!({ "id": "a1", "email": "nope" }), None)
        .unwrap_err();
    assert!(matches!(err, RecordError::Validation(ValidationError::Schema(_))));

    let err = fx
        .control
        .create("Account", json!(["not", "an", "object"]), None)
        .unwrap_err();
    assert!(matches!(err, RecordError::InvalidInput(_)));

    assert_eq!(fx.engine.writes(), 0);
}

#[test]
fn unknown_model_is_a_registry_error() {
    let fx = fixture();
    let err = fx.control.create("Missing", json!({}), None).unwrap_err();
    assert!(matches!(err, RecordError::Registry(_)));
    assert_eq!(err.code(), "registry_lookup_failed");
}

#[test]
fn guarded_create_rejects_duplicate_within_ttl_without_storage_call() {
    let fx = fixture();
    let options = || Some(CreateOptions::default().with_keys(["email"]));

    fx.control
        .create("Account", json!({ "id": "a1", "email": "a@b.io" }), options())
        .unwrap();
    assert_eq!(fx.engine.writes(), 1);
    assert_eq!(
        fx.engine.last_params().condition(),
        Some("#email <> :email")
    );

    fx.clock.advance(Duration::from_millis(2_900));
    let err = fx
        .control
        .create("Account", json!({ "id": "a2", "email": "a@b.io" }), options())
        .unwrap_err();
    match err {
        RecordError::Conflict(conflict) => {
            assert_eq!(
                conflict,
                ConflictError {
                    model: "Account".to_string(),
                    field: "email".to_string(),
                    value: json!("a@b.io"),
                }
            );
            assert_eq!(
                conflict.to_string(),
                "Account object with email=\"a@b.io\" is in creating state"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.engine.writes(), 1);

    fx.clock.advance(Duration::from_millis(200));
    fx.control
        .create("Account", json!({ "id": "a2", "email": "a@b.io" }), options())
        .unwrap();
    assert_eq!(fx.engine.writes(), 2);
}

#[test]
fn guard_tokens_are_scoped_by_value() {
    let fx = fixture();
    let options = || Some(CreateOptions::default().with_keys(["email"]));

    fx.control
        .create("Account", json!({ "id": "a1", "email": "a@b.io" }), options())
        .unwrap();
    fx.control
        .create("Account", json!({ "id": "a2", "email": "c@d.io" }), options())
        .unwrap();
    assert_eq!(fx.engine.writes(), 2);
}

#[test]
fn noop_guard_lets_duplicates_reach_storage() {
    let engine = Arc::new(RecordingEngine::new());
    let mut catalog = Catalog::new(engine.clone());
    catalog
        .define("Account", ModelConfig::new("Accounts", "id"), None)
        .unwrap();
    let control = ControlService::with_guard(
        Arc::new(catalog),
        Arc::new(NoopGuardCache),
        GuardConfig::default(),
    );
    let options = || Some(CreateOptions::default().with_keys(["id"]));

    control.create("Account", json!({ "id": "a1" }), options()).unwrap();
    let err = control
        .create("Account", json!({ "id": "a1" }), options())
        .unwrap_err();
    assert!(matches!(err, RecordError::Storage(_)));
    assert_eq!(engine.writes(), 2);
}

#[test]
fn put_replaces_without_condition() {
    let fx = fixture();
    fx.control
        .create("Event", json!({ "id": "x", "sort": 1, "title": "old", "kept": 1 }), None)
        .unwrap();
    fx.control
        .put("Event", json!({ "id": "x", "sort": 1, "title": "new" }), None)
        .unwrap();

    assert_eq!(fx.engine.last_params(), WriteParams::default());
    let stored = fx
        .access
        .get_item_by_range_key("Event", "x", 1, None)
        .unwrap()
        .into_value();
    assert_eq!(stored, json!({ "id": "x", "sort": 1, "title": "new" }));
}

#[test]
fn destroy_returns_the_deleted_item_in_requested_format() {
    let fx = fixture();
    fx.control
        .create("Account", json!({ "id": "a1", "email": "a@b.io" }), None)
        .unwrap();

    let deleted = fx
        .control
        .destroy(
            "Account",
            "a1",
            Some(WriteOptions::default().with_format("first")),
        )
        .unwrap();
    assert_eq!(
        deleted.as_data(),
        Some(&json!({ "id": "a1", "email": "a@b.io" }))
    );

    let again = fx.control.destroy("Account", "a1", None).unwrap();
    assert_eq!(again.as_model(), Some(&EngineResult::Empty));
    assert_eq!(
        fx.access.get_item("Account", "a1", None).unwrap().into_value(),
        Value::Null
    );
}

#[test]
fn update_null_removes_attribute() {
    let fx = fixture();
    fx.control
        .create("Event", json!({ "id": "x", "sort": 2, "title": "t" }), None)
        .unwrap();
    let updated = fx
        .control
        .update(
            "Event",
            json!({ "id": "x", "sort": 2, "title": null }),
            Some(WriteOptions::default().with_format("json")),
        )
        .unwrap();
    assert_eq!(updated.into_value(), json!({ "id": "x", "sort": 2 }));
}

#[test]
fn distinct_generated_ids_pass_guard_and_condition() {
    let fx = fixture();
    for _ in 0..3 {
        let id = Uuid::new_v4().to_string();
        fx.control
            .create(
                "Account",
                json!({ "id": id, "email": format!("{id}@example.com") }),
                Some(CreateOptions::default().with_keys(["id"])),
            )
            .unwrap();
    }
    assert_eq!(fx.engine.writes(), 3);
}
