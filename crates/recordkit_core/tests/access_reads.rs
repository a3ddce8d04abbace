use recordkit_core::{
    AccessOptions, AccessService, Catalog, ControlService, EngineResult, IndexSpec, KeyInput,
    ModelConfig, QueryOptions, RecordError, SelectMode, SortOrder, SqliteEngine, StorageError,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn services() -> (ControlService, AccessService) {
    let engine = Arc::new(SqliteEngine::open_in_memory().unwrap());
    let mut catalog = Catalog::new(engine);
    catalog
        .define(
            "Event",
            ModelConfig::new("Events", "userId")
                .with_range_key("at")
                .with_index(IndexSpec::new("ByKind", "kind").with_range_key("at")),
            None,
        )
        .unwrap();
    catalog
        .define("Account", ModelConfig::new("Accounts", "id"), None)
        .unwrap();

    let catalog = Arc::new(catalog);
    (
        ControlService::new(Arc::clone(&catalog)),
        AccessService::new(catalog),
    )
}

fn seeded() -> (ControlService, AccessService) {
    let (control, access) = services();
    for (user, at, kind, day) in [
        ("u1", 1, "login", "2024-01-01"),
        ("u1", 2, "view", "2024-01-02"),
        ("u1", 3, "login", "2024-02-01"),
        ("u1", 4, "logout", "2024-02-02"),
        ("u2", 1, "login", "2024-01-05"),
    ] {
        control
            .put(
                "Event",
                json!({ "userId": user, "at": at, "kind": kind, "day": day }),
                None,
            )
            .unwrap();
    }
    for id in ["a1", "a2"] {
        control
            .put("Account", json!({ "id": id, "name": id }), None)
            .unwrap();
    }
    (control, access)
}

fn ats(value: &Value) -> Vec<i64> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["at"].as_i64().unwrap())
        .collect()
}

#[test]
fn get_item_without_options_passes_engine_result_through() {
    let (_, access) = seeded();
    let result = access.get_item("Account", "a1", None).unwrap();
    match result.as_model() {
        Some(EngineResult::Item(item)) => {
            assert_eq!(item.to_json(), json!({ "id": "a1", "name": "a1" }));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn get_item_by_range_key_honours_format() {
    let (_, access) = seeded();

    let raw = access.get_item_by_range_key("Event", "u1", 2, None).unwrap();
    assert!(matches!(raw.as_model(), Some(EngineResult::Item(_))));

    let first = access
        .get_item_by_range_key(
            "Event",
            "u1",
            2,
            Some(AccessOptions::default().with_format("first")),
        )
        .unwrap();
    assert_eq!(
        first.as_data(),
        Some(&json!({ "userId": "u1", "at": 2, "kind": "view", "day": "2024-01-02" }))
    );

    let missing = access
        .get_item_by_range_key(
            "Event",
            "u1",
            99,
            Some(AccessOptions::default().with_format("first")),
        )
        .unwrap();
    assert_eq!(missing.as_data(), Some(&Value::Null));
}

#[test]
fn get_item_requires_range_key_on_ranged_model() {
    let (_, access) = seeded();
    let err = access.get_item("Event", "u1", None).unwrap_err();
    assert!(matches!(err, RecordError::InvalidInput(_)));

    let fields = json!({ "userId": "u1", "at": 3 });
    let item = access.get_item("Event", fields, None).unwrap().into_value();
    assert_eq!(item["kind"], "login");
}

#[test]
fn get_item_passes_engine_params() {
    let (_, access) = seeded();
    let options = AccessOptions::from_json(json!({
        "format": "first",
        "params": { "AttributesToGet": ["name"] }
    }))
    .unwrap();
    let item = access.get_item("Account", "a2", Some(options)).unwrap();
    assert_eq!(item.into_value(), json!({ "name": "a2" }));
}

#[test]
fn get_items_defaults_to_items_format() {
    let (_, access) = seeded();
    let items = access
        .get_items("Account", ["a1", "missing", "a2"], None)
        .unwrap();
    assert_eq!(
        items.as_data(),
        Some(&json!([{ "id": "a1", "name": "a1" }, { "id": "a2", "name": "a2" }]))
    );

    let model = access
        .get_items(
            "Account",
            vec![KeyInput::from("a1")],
            Some(AccessOptions::default().with_format("model")),
        )
        .unwrap();
    assert!(matches!(model.as_model(), Some(EngineResult::Items(items)) if items.len() == 1));
}

#[test]
fn query_returns_partition_in_range_order() {
    let (_, access) = seeded();
    let mut options = QueryOptions::new("u1");
    options.format = Some("items".into());
    let items = access.query("Event", &options).unwrap().into_value();
    assert_eq!(ats(&items), vec![1, 2, 3, 4]);

    options.sort = Some(SortOrder::Descending);
    let items = access.query("Event", &options).unwrap().into_value();
    assert_eq!(ats(&items), vec![4, 3, 2, 1]);
}

#[test]
fn query_applies_range_filters() {
    let (_, access) = seeded();
    let cases = [
        (json!({ "operation": "gte", "value": 3 }), vec![3, 4]),
        (json!({ "operation": "gt", "value": 3 }), vec![4]),
        (json!({ "operation": "lt", "value": 3 }), vec![1, 2]),
        (json!({ "operation": "lte", "value": 1 }), vec![1]),
        (json!({ "operation": "equals", "value": 2 }), vec![2]),
        (json!({ "operation": "between", "value": [2, 3] }), vec![2, 3]),
        (
            json!({ "name": "day", "operation": "beginsWith", "value": "2024-02" }),
            vec![3, 4],
        ),
    ];

    for (range_key, expected) in cases {
        let options = QueryOptions::from_json(json!({
            "key": "u1",
            "rangeKey": range_key.clone(),
            "format": "items"
        }))
        .unwrap();
        let items = access.query("Event", &options).unwrap().into_value();
        assert_eq!(ats(&items), expected, "range filter {range_key}");
    }
}

#[test]
fn query_pages_with_limit_and_start_key() {
    let (_, access) = seeded();
    let mut options = QueryOptions::new("u1");
    options.limit = Some(2);
    options.format = Some("json".into());

    let page = access.query("Event", &options).unwrap().into_value();
    assert_eq!(ats(&page["Items"]), vec![1, 2]);
    assert_eq!(page["LastEvaluatedKey"], json!({ "userId": "u1", "at": 2 }));

    options.start_key = Some(page["LastEvaluatedKey"].clone());
    let page = access.query("Event", &options).unwrap().into_value();
    assert_eq!(ats(&page["Items"]), vec![3, 4]);
    assert!(page.get("LastEvaluatedKey").is_none());

    options.start_key = Some(json!(3));
    let page = access.query("Event", &options).unwrap().into_value();
    assert_eq!(ats(&page["Items"]), vec![4]);
}

#[test]
fn query_pages_backwards_in_descending_order() {
    let (_, access) = seeded();
    let mut options = QueryOptions::new("u1");
    options.limit = Some(2);
    options.sort = Some(SortOrder::Descending);
    options.format = Some("json".into());

    let page = access.query("Event", &options).unwrap().into_value();
    assert_eq!(ats(&page["Items"]), vec![4, 3]);
    assert_eq!(page["LastEvaluatedKey"], json!({ "userId": "u1", "at": 3 }));

    options.start_key = Some(page["LastEvaluatedKey"].clone());
    let page = access.query("Event", &options).unwrap().into_value();
    assert_eq!(ats(&page["Items"]), vec![2, 1]);
    assert!(page.get("LastEvaluatedKey").is_none());

    options.start_key = Some(json!(2));
    let page = access.query("Event", &options).unwrap().into_value();
    assert_eq!(ats(&page["Items"]), vec![1]);
}

#[test]
fn index_query_pages_on_index_keys() {
    let (_, access) = seeded();
    let mut options = QueryOptions::new("login");
    options.index = Some("ByKind".into());
    options.limit = Some(2);
    options.format = Some("json".into());

    let page = access.query("Event", &options).unwrap().into_value();
    assert_eq!(
        page["Items"],
        json!([
            { "userId": "u1", "at": 1, "kind": "login", "day": "2024-01-01" },
            { "userId": "u2", "at": 1, "kind": "login", "day": "2024-01-05" }
        ])
    );
    assert_eq!(
        page["LastEvaluatedKey"],
        json!({ "userId": "u2", "at": 1, "kind": "login" })
    );

    options.start_key = Some(page["LastEvaluatedKey"].clone());
    let page = access.query("Event", &options).unwrap().into_value();
    assert_eq!(ats(&page["Items"]), vec![3]);
    assert!(page.get("LastEvaluatedKey").is_none());

    // Every item at the scalar start position is skipped, whichever user owns it.
    options.start_key = Some(json!(1));
    let page = access.query("Event", &options).unwrap().into_value();
    assert_eq!(
        page["Items"],
        json!([{ "userId": "u1", "at": 3, "kind": "login", "day": "2024-02-01" }])
    );
}

#[test]
fn query_uses_secondary_index() {
    let (_, access) = seeded();
    let options = QueryOptions::from_json(json!({
        "key": "login",
        "index": "ByKind",
        "attributes": ["userId", "at"],
        "format": "items"
    }))
    .unwrap();
    let items = access.query("Event", &options).unwrap().into_value();
    assert_eq!(
        items,
        json!([
            { "userId": "u1", "at": 1 },
            { "userId": "u2", "at": 1 },
            { "userId": "u1", "at": 3 }
        ])
    );

    let unknown = QueryOptions::from_json(json!({ "key": "login", "index": "ByDay" })).unwrap();
    let err = access.query("Event", &unknown).unwrap_err();
    assert!(matches!(
        err,
        RecordError::Storage(StorageError::UnknownIndex { .. })
    ));
}

#[test]
fn count_select_returns_count_only() {
    let (_, access) = seeded();
    let mut options = QueryOptions::new("u1");
    options.select = Some(SelectMode::Count);
    options.format = Some("json".into());
    let page = access.query("Event", &options).unwrap().into_value();
    assert_eq!(page["Count"], 4);
    assert_eq!(page["Items"], json!([]));
}

#[test]
fn first_format_on_query() {
    let (_, access) = seeded();
    let options = QueryOptions::from_json(json!({
        "key": "u1",
        "sort": "descending",
        "format": "first"
    }))
    .unwrap();
    let first = access.query("Event", &options).unwrap().into_value();
    assert_eq!(first["at"], 4);

    let empty = QueryOptions::from_json(json!({ "key": "nobody", "format": "first" })).unwrap();
    assert_eq!(access.query("Event", &empty).unwrap().into_value(), Value::Null);
}

#[test]
fn option_order_does_not_change_built_query() {
    let (_, access) = seeded();
    let limit_first = QueryOptions::from_json(json!({
        "key": "login",
        "limit": 2,
        "index": "ByKind",
        "sort": "descending",
        "select": "ALL_PROJECTED_ATTRIBUTES",
        "rangeKey": { "operation": "gt", "value": 0 },
        "consistentRead": true,
        "attributes": ["at"],
        "startKey": { "kind": "login", "at": 9, "userId": "u9" }
    }))
    .unwrap();
    let index_first = QueryOptions::from_json(json!({
        "startKey": { "userId": "u9", "at": 9, "kind": "login" },
        "attributes": ["at"],
        "consistentRead": true,
        "rangeKey": { "value": 0, "operation": "gt" },
        "select": "ALL_PROJECTED_ATTRIBUTES",
        "sort": "descending",
        "index": "ByKind",
        "limit": 2,
        "key": "login"
    }))
    .unwrap();

    let left = access.build_query("Event", &limit_first).unwrap();
    let right = access.build_query("Event", &index_first).unwrap();
    assert_eq!(left, right);

    let request = left.request();
    assert_eq!(request.index.as_deref(), Some("ByKind"));
    assert_eq!(request.limit, Some(2));
    assert!(request.consistent_read);
    assert_eq!(request.order, SortOrder::Descending);
    assert_eq!(request.select, Some(SelectMode::AllProjectedAttributes));
}

#[test]
fn unknown_model_reads_fail_fast() {
    let (_, access) = seeded();
    let err = access.get_item("Nope", "a1", None).unwrap_err();
    assert!(matches!(err, RecordError::Registry(_)));
    assert!(access.query("Nope", &QueryOptions::new("x")).is_err());
}
