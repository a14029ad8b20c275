//! Integration tests for the reconciling data manager over the in-memory store.

mod schemas;

use dynamap::plan::plan_update;
use dynamap::{
    cursors, generate, row_key, row_version, Condition, DataManager, FindOptions, GetOptions,
    Item, KeyCondition, MapperConfig, MapperError, PrimaryKey, Schema, StoreError, UpdateExpr,
    Value, Versioned, WriteOptions, ANCHOR_RANGE,
};
use schemas::{accounts, grids, item, manager_for, manager_with, store, tagged, things};
use serde_json::json;

fn notes() -> Schema {
    Schema::builder("notes")
        .id("id")
        .column("body")
        .build()
        .unwrap()
}

/// Two range keys sharing the listing rows.
fn books() -> Schema {
    Schema::builder("books")
        .id("id")
        .range("title")
        .range("shelf")
        .column("note")
        .build()
        .unwrap()
}

async fn shelved_books() -> (schemas::Manager, Schema) {
    let schema = books();
    let manager = manager_for(&[schema.clone()]).await;
    let shelved = [
        ("1", "ab", "s1"),
        ("2", "ab cd", "s1"),
        ("3", "b", "s2"),
        ("4", "zz", "ab"),
    ];
    for (id, title, shelf) in shelved {
        let values = item(json!({"id": id, "title": title, "shelf": shelf, "note": "n"}));
        manager.put(&schema, &values, &WriteOptions::new()).await.unwrap();
    }
    (manager, schema)
}

async fn found(manager: &schemas::Manager, schema: &Schema, key: KeyCondition) -> Vec<Value> {
    let page = manager
        .find(schema, &key, None, &FindOptions::default())
        .await
        .unwrap();
    ids(&page.items)
}

fn ids(items: &[Versioned<Item>]) -> Vec<Value> {
    items.iter().map(|v| v.data["id"].clone()).collect()
}

#[tokio::test]
async fn put_then_get_returns_version_one() {
    let schema = notes();
    let manager = manager_for(&[schema.clone()]).await;

    let values = item(json!({"id": 1, "body": "A"}));
    manager.put(&schema, &values, &WriteOptions::new()).await.unwrap();

    let loaded = manager
        .get(&schema, &Value::from(1), &GetOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.data, values);
    assert_eq!(loaded.version, 1);
}

#[tokio::test]
async fn pair_fans_out_over_range_array() {
    let schema = things();
    let manager = manager_for(&[schema.clone()]).await;
    manager
        .put(&schema, &item(json!({"id": "a", "slots": ["x", "y"]})), &WriteOptions::new())
        .await
        .unwrap();

    let rows = store(&manager).items("things");
    let pair: Vec<PrimaryKey> = rows
        .iter()
        .filter_map(row_key)
        .filter(|key| key.hash == "things#k1#a")
        .collect();
    assert_eq!(
        pair,
        vec![
            PrimaryKey::new("things#k1#a", "x"),
            PrimaryKey::new("things#k1#a", "y"),
        ]
    );
    assert_eq!(rows.len(), 4);
}

#[tokio::test]
async fn chunked_update_is_not_atomic_across_chunks() {
    let schema = grids();
    let manager = manager_for(&[schema.clone()]).await;
    manager
        .put(
            &schema,
            &item(json!({"id": "g", "rows": ["a", "b"], "cols": [1, 2, 3, 4, 5], "label": "v1"})),
            &WriteOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(store(&manager).items("grids").len(), 12);

    // Another writer bumped the listing row, so the second chunk's guard fails.
    let listing = PrimaryKey::new("grids#$$hash$$", "$$range$$#g");
    let mut tampered = store(&manager).row("grids", &listing).unwrap();
    tampered.insert("objver".into(), Value::from(5));
    store(&manager).raw_put("grids", tampered).unwrap();

    let calls_before = store(&manager).transact_calls();
    let err = manager
        .update(&schema, &Value::from("g"), &item(json!({"label": "v2"})), &WriteOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_version_conflict(), "got {:?}", err);
    assert_eq!(store(&manager).transact_calls() - calls_before, 2);

    let rows = store(&manager).items("grids");
    let committed = rows.iter().filter(|row| row_version(row) == 2).count();
    assert_eq!(committed, 10);
    assert!(rows
        .iter()
        .filter(|row| row_version(row) == 2)
        .all(|row| row["label"] == Value::from("v2")));

    let last_pair = store(&manager)
        .row("grids", &PrimaryKey::new("grids#grid#b", "5"))
        .unwrap();
    assert_eq!(row_version(&last_pair), 1);
    assert_eq!(last_pair["label"], Value::from("v1"));
    let listing_row = store(&manager).row("grids", &listing).unwrap();
    assert_eq!(listing_row["label"], Value::from("v1"));
}

#[tokio::test]
async fn chunk_size_comes_from_config() {
    let schema = grids();
    let manager = manager_with(MapperConfig::default().with_chunk_size(4), &[schema.clone()]).await;
    manager
        .put(
            &schema,
            &item(json!({"id": "g", "rows": ["a", "b"], "cols": [1, 2, 3, 4, 5]})),
            &WriteOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(store(&manager).transact_calls(), 3);
}

#[tokio::test]
async fn update_rewrites_only_changed_keys() {
    let schema = accounts();
    let manager = manager_for(&[schema.clone()]).await;
    let values = item(json!({"id": 1, "email": "a@x", "handle": "neo", "site": "gh", "name": "N"}));
    manager.put(&schema, &values, &WriteOptions::new()).await.unwrap();

    let old_email = PrimaryKey::new("accounts#email#a@x", "$$range$$#1");
    let new_email = PrimaryKey::new("accounts#email#b@x", "$$range$$#1");

    let mut merged = values.clone();
    merged.insert("email".into(), Value::from("b@x"));
    let plan = plan_update(
        &schema,
        generate(&schema, &merged, 1).unwrap(),
        &store(&manager).items("accounts"),
        Some(1),
        None,
    );
    assert_eq!(plan.deletes(), vec![old_email.clone()]);
    assert_eq!(plan.new_keys(), vec![new_email.clone()]);

    let calls_before = store(&manager).transact_calls();
    let updated = manager
        .update(&schema, &Value::from(1), &item(json!({"email": "b@x"})), &WriteOptions::new())
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.data["name"], Value::from("N"));
    assert_eq!(store(&manager).transact_calls() - calls_before, 1);

    let rows = store(&manager).items("accounts");
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|row| row_version(row) == 2));
    assert!(store(&manager).row("accounts", &old_email).is_none());
    assert!(store(&manager).row("accounts", &new_email).is_some());
}

#[tokio::test]
async fn taken_pair_key_is_a_uniqueness_conflict() {
    let schema = accounts();
    let manager = manager_for(&[schema.clone()]).await;
    manager
        .put(
            &schema,
            &item(json!({"id": 1, "email": "a@x", "handle": "neo", "site": "gh"})),
            &WriteOptions::new(),
        )
        .await
        .unwrap();

    let clash = item(json!({"id": 2, "email": "c@x", "handle": "neo", "site": "gh"}));
    let err = manager.put(&schema, &clash, &WriteOptions::new()).await.unwrap_err();
    assert!(err.is_uniqueness_conflict());
    assert!(store(&manager)
        .row("accounts", &PrimaryKey::new("accounts#2", ANCHOR_RANGE))
        .is_none());

    let other = item(json!({"id": 2, "email": "c@x", "handle": "trinity", "site": "gh"}));
    manager.put(&schema, &other, &WriteOptions::new()).await.unwrap();

    let err = manager
        .update(&schema, &Value::from(2), &item(json!({"handle": "neo"})), &WriteOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_uniqueness_conflict(), "got {:?}", err);

    let current = manager
        .get(&schema, &Value::from(2), &GetOptions::consistent())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.data["handle"], Value::from("trinity"));
}

#[tokio::test]
async fn failing_caller_condition_is_not_a_uniqueness_conflict() {
    let schema = accounts();
    let manager = manager_for(&[schema.clone()]).await;
    let options = WriteOptions::new().when(Condition::exists("name"));
    let err = manager
        .put(&schema, &item(json!({"id": 3, "email": "d@x"})), &options)
        .await
        .unwrap_err();
    match err {
        MapperError::Store(store_err) => assert!(store_err.is_conditional_failure()),
        other => panic!("expected store error, got {:?}", other),
    }
}

#[tokio::test]
async fn opaque_store_errors_pass_through() {
    let schema = notes();
    let manager = manager_for(&[schema.clone()]).await;
    store(&manager).fail_next_transact(StoreError::Storage("throttled".into()));
    let err = manager
        .put(&schema, &item(json!({"id": 1})), &WriteOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MapperError::Store(StoreError::Storage(_))));
}

#[tokio::test]
async fn missing_entities() {
    let schema = notes();
    let manager = manager_for(&[schema.clone()]).await;
    let id = Value::from(99);

    assert!(manager
        .get(&schema, &id, &GetOptions::default())
        .await
        .unwrap()
        .is_none());

    let err = manager
        .update(&schema, &id, &item(json!({"body": "x"})), &WriteOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("could not be found"));

    let err = manager
        .apply(&schema, &id, &UpdateExpr::new().set("body", "x"), &WriteOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let removed = manager.delete(&schema, &id, &WriteOptions::new()).await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(store(&manager).transact_calls(), 0);
}

#[tokio::test]
async fn apply_reaches_every_row() {
    let schema = accounts();
    let manager = manager_for(&[schema.clone()]).await;
    manager
        .put(
            &schema,
            &item(json!({"id": 1, "email": "a@x", "handle": "neo", "site": "gh", "name": "N"})),
            &WriteOptions::new(),
        )
        .await
        .unwrap();

    let version = manager
        .apply(&schema, &Value::from(1), &UpdateExpr::new().set("name", "Z"), &WriteOptions::new())
        .await
        .unwrap();
    assert_eq!(version, 2);

    let rows = store(&manager).items("accounts");
    assert_eq!(rows.len(), 4);
    for row in &rows {
        assert_eq!(row_version(row), 2);
        assert_eq!(row["name"], Value::from("Z"));
    }

    let err = manager
        .apply(
            &schema,
            &Value::from(1),
            &UpdateExpr::new().set("name", "Old"),
            &WriteOptions::new().expecting(1),
        )
        .await
        .unwrap_err();
    match err {
        MapperError::VersionConflict {
            attempted, stored, ..
        } => assert_eq!((attempted, stored), (2, 2)),
        other => panic!("expected version conflict, got {:?}", other),
    }

    let err = manager
        .apply(&schema, &Value::from(1), &UpdateExpr::new().set("email", "z@x"), &WriteOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MapperError::Validation(_)));
}

#[tokio::test]
async fn successive_updates_never_reuse_a_version() {
    let schema = notes();
    let manager = manager_for(&[schema.clone()]).await;
    manager
        .put(&schema, &item(json!({"id": 1, "body": "a"})), &WriteOptions::new())
        .await
        .unwrap();

    let mut versions = vec![];
    for body in ["b", "c", "d"] {
        let updated = manager
            .update(&schema, &Value::from(1), &item(json!({"body": body})), &WriteOptions::new())
            .await
            .unwrap();
        versions.push(updated.version);
    }
    assert_eq!(versions, vec![2, 3, 4]);
}

#[tokio::test]
async fn delete_removes_every_row() {
    let schema = accounts();
    let manager = manager_for(&[schema.clone()]).await;
    manager
        .put(
            &schema,
            &item(json!({"id": 1, "email": "a@x", "handle": "neo", "site": "gh"})),
            &WriteOptions::new(),
        )
        .await
        .unwrap();

    let blocked = WriteOptions::new().when(Condition::eq("name", "nobody"));
    assert!(manager.delete(&schema, &Value::from(1), &blocked).await.is_err());
    assert_eq!(store(&manager).items("accounts").len(), 4);

    let removed = manager
        .delete(&schema, &Value::from(1), &WriteOptions::new())
        .await
        .unwrap();
    assert_eq!(removed, 4);
    assert!(store(&manager).items("accounts").is_empty());
}

#[tokio::test]
async fn cursor_resumes_after_last_item() {
    let schema = notes();
    let manager = manager_for(&[schema.clone()]).await;
    for i in 0..7 {
        manager
            .put(
                &schema,
                &item(json!({"id": format!("n{}", i), "body": format!("b{}", i)})),
                &WriteOptions::new(),
            )
            .await
            .unwrap();
    }

    let mut seen = vec![];
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let mut options = FindOptions::default().limit(3);
        options.cursor = cursor.clone();
        let page = manager
            .find(&schema, &KeyCondition::new(), None, &options)
            .await
            .unwrap();
        if pages == 0 {
            let resume = cursors::decode(page.cursor.as_deref().unwrap()).unwrap();
            assert_eq!(resume, PrimaryKey::new("notes#$$hash$$", "$$range$$#n2"));
        }
        pages += 1;
        seen.extend(ids(&page.items));
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    let expected: Vec<Value> = (0..7).map(|i| Value::from(format!("n{}", i))).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn find_filters_projects_and_reverses() {
    let schema = notes();
    let manager = manager_for(&[schema.clone()]).await;
    for i in 0..4 {
        manager
            .put(
                &schema,
                &item(json!({"id": format!("n{}", i), "body": format!("b{}", i)})),
                &WriteOptions::new(),
            )
            .await
            .unwrap();
    }
    let all = KeyCondition::new();

    let filter = Condition::eq("body", "b3");
    let page = manager
        .find(&schema, &all, Some(&filter), &FindOptions::default())
        .await
        .unwrap();
    assert_eq!(ids(&page.items), vec![Value::from("n3")]);
    assert!(page.cursor.is_none());

    let page = manager
        .find(&schema, &all, None, &FindOptions::default().columns(["body"]))
        .await
        .unwrap();
    assert_eq!(page.len(), 4);
    for found in &page.items {
        assert_eq!(found.data.keys().collect::<Vec<_>>(), vec!["body"]);
        assert_eq!(found.version, 1);
    }

    let page = manager
        .find(&schema, &all, None, &FindOptions::default().descending())
        .await
        .unwrap();
    assert_eq!(page.items[0].data["id"], Value::from("n3"));

    let anchor = manager
        .find(&schema, &KeyCondition::new().eq("id", "n1"), None, &FindOptions::default())
        .await
        .unwrap();
    assert_eq!(ids(&anchor.items), vec![Value::from("n1")]);
}

#[tokio::test]
async fn find_deduplicates_by_entity() {
    let schema = tagged();
    let manager = manager_for(&[schema.clone()]).await;
    manager
        .put(&schema, &item(json!({"id": 1, "tags": ["a", "b", "c"]})), &WriteOptions::new())
        .await
        .unwrap();
    manager
        .put(&schema, &item(json!({"id": 2, "tags": ["b"]})), &WriteOptions::new())
        .await
        .unwrap();

    let everything = manager
        .find(&schema, &KeyCondition::new(), None, &FindOptions::default())
        .await
        .unwrap();
    assert_eq!(ids(&everything.items), vec![Value::from(1), Value::from(2)]);

    let tagged_b = manager
        .find(&schema, &KeyCondition::new().eq("tags", "b"), None, &FindOptions::default())
        .await
        .unwrap();
    assert_eq!(ids(&tagged_b.items), vec![Value::from(1), Value::from(2)]);

    let first = manager
        .find(&schema, &KeyCondition::new(), None, &FindOptions::default().limit(1))
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert!(first.has_more());
}

#[tokio::test]
async fn empty_strings_survive_a_round_trip() {
    let schema = notes();
    let manager = manager_for(&[schema.clone()]).await;
    let values = item(json!({"id": 1, "body": "", "extra": {"nested": [""]}}));
    manager.put(&schema, &values, &WriteOptions::new()).await.unwrap();

    let stored = store(&manager)
        .row("notes", &PrimaryKey::new("notes#1", ANCHOR_RANGE))
        .unwrap();
    assert_eq!(stored["body"], Value::from(dynamap::EMPTY_STRING_MARKER));

    let loaded = manager
        .get(&schema, &Value::from(1), &GetOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.data, values);
}

#[tokio::test]
async fn table_lifecycle() {
    let schema = notes();
    let manager = manager_for(&[schema.clone()]).await;
    manager.delete_table(&schema).await.unwrap();

    let err = manager
        .get(&schema, &Value::from(1), &GetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MapperError::Store(StoreError::TableNotFound(_))));
}

#[tokio::test]
async fn listing_comparisons_select_by_value() {
    let (manager, schema) = shelved_books().await;
    let expect = |values: &[&str]| values.iter().map(|v| Value::from(*v)).collect::<Vec<_>>();

    let le = found(&manager, &schema, KeyCondition::new().le("title", "ab")).await;
    assert_eq!(le, expect(&["1"]));
    let gt = found(&manager, &schema, KeyCondition::new().gt("title", "ab")).await;
    assert_eq!(gt, expect(&["2", "3", "4"]));
    let lt = found(&manager, &schema, KeyCondition::new().lt("title", "b")).await;
    assert_eq!(lt, expect(&["2", "1"]));
    let ge = found(&manager, &schema, KeyCondition::new().ge("title", "b")).await;
    assert_eq!(ge, expect(&["3", "4"]));
    let between = found(&manager, &schema, KeyCondition::new().between("title", "ab", "b")).await;
    assert_eq!(between, expect(&["2", "1", "3"]));
    let eq = found(&manager, &schema, KeyCondition::new().eq("title", "ab")).await;
    assert_eq!(eq, expect(&["1"]));
}

#[tokio::test]
async fn listing_rows_of_other_range_keys_do_not_match() {
    let (manager, schema) = shelved_books().await;

    let page = manager
        .find(&schema, &KeyCondition::new().le("shelf", "ab"), None, &FindOptions::default())
        .await
        .unwrap();
    assert_eq!(ids(&page.items), vec![Value::from("4")]);

    let page = manager
        .find(
            &schema,
            &KeyCondition::new().le("title", "ab"),
            None,
            &FindOptions::default().columns(["note"]),
        )
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page.items[0].data.keys().collect::<Vec<_>>(), vec!["note"]);
}

#[tokio::test]
async fn empty_string_id_round_trips() {
    let schema = notes();
    let manager = manager_for(&[schema.clone()]).await;
    let id = Value::from("");

    manager
        .put(&schema, &item(json!({"id": "", "body": "x"})), &WriteOptions::new())
        .await
        .unwrap();
    let loaded = manager
        .get(&schema, &id, &GetOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.data["id"], id);
    assert_eq!(loaded.version, 1);

    let updated = manager
        .update(&schema, &id, &item(json!({"body": "y"})), &WriteOptions::new())
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.data["body"], Value::from("y"));

    manager.delete(&schema, &id, &WriteOptions::new()).await.unwrap();
    assert!(manager
        .get(&schema, &id, &GetOptions::default())
        .await
        .unwrap()
        .is_none());
    assert!(store(&manager).items("notes").is_empty());
}
