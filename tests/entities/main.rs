//! Integration tests for typed entities (`#[derive(Mapped)]` + EntityRepository).

mod models;

use dynamap::{
    mapper, DataManager, EntitiesExt, FindOptions, GetOptions, InMemoryStore, KeyCondition,
    Mapped, MapperError, UpdateExpr, Value, WriteOptions, ANCHOR_RANGE,
};
use models::{PageCounter, Post, User};

#[test]
fn derive_builds_schema() {
    let schema = User::schema().unwrap();
    assert_eq!(schema.table_name(), "users");
    assert_eq!(schema.data_prefix(), "usr");
    assert_eq!(schema.id_key().property, "id");
    assert_eq!(schema.hash_keys()[0].attribute, "mail");
    assert_eq!(schema.attribute_for("email"), "mail");
    assert!(schema.versioning_enabled());
    assert!(!schema.strongly_consistent_default());

    let posts = Post::schema().unwrap();
    assert_eq!(posts.id_key().property, "id");
    let pair = posts.pair("byBoard").unwrap();
    assert_eq!(pair.hashes[0].property, "board");
    assert_eq!(pair.ranges[0].property, "lanes");
    assert!(posts.column("title").is_some());
    assert!(posts.column("draft").is_none());

    let counters = PageCounter::schema().unwrap();
    assert_eq!(counters.table_name(), "page_counters");
    assert!(!counters.versioning_enabled());
    assert!(counters.strongly_consistent_default());
}

#[tokio::test]
async fn put_then_get() {
    let manager = mapper(InMemoryStore::new());
    let users = manager.entities::<User>().unwrap();
    users.create_table().await.unwrap();

    let written = users.put(&User::new("u1", "a@b.c", "Ann")).await.unwrap();
    assert_eq!(written.version, 1);

    let loaded = users.get("u1").await.unwrap().unwrap();
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.data, User::new("u1", "a@b.c", "Ann"));

    let anchor = manager
        .inner()
        .store()
        .row("users", &dynamap::PrimaryKey::new("usr#u1", ANCHOR_RANGE))
        .unwrap();
    assert_eq!(anchor["mail"], Value::from("a@b.c"));

    assert!(users.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn stale_copy_loses_the_race() {
    let manager = mapper(InMemoryStore::new());
    let users = manager.entities::<User>().unwrap();
    users.create_table().await.unwrap();
    users.put(&User::new("u1", "a@b.c", "Ann")).await.unwrap();

    let e1 = users.get("u1").await.unwrap().unwrap();
    let mut e2 = users.get("u1").await.unwrap().unwrap();
    assert_eq!((e1.version, e2.version), (1, 1));

    e2.data.name = "Bea".into();
    let updated = users.update(&e2).await.unwrap();
    assert_eq!(updated.version, 2);

    let mut stale = e1.clone();
    stale.data.name = "Cid".into();
    let err = users.update(&stale).await.unwrap_err();
    match err {
        MapperError::VersionConflict {
            attempted, stored, ..
        } => {
            assert_eq!(attempted, 2);
            assert_eq!(stored, 2);
        }
        other => panic!("expected version conflict, got {:?}", other),
    }

    let current = users.get("u1").await.unwrap().unwrap();
    assert_eq!(current.data.name, "Bea");
    assert_eq!(current.version, 2);
}

#[tokio::test]
async fn full_update_drops_cleared_fields() {
    let manager = mapper(InMemoryStore::new());
    let users = manager.entities::<User>().unwrap();
    users.create_table().await.unwrap();

    let mut user = User::new("u1", "a@b.c", "Ann");
    user.nickname = Some("annie".into());
    let written = users.put(&user).await.unwrap();

    let mut cleared = written.clone();
    cleared.data.nickname = None;
    users.update(&cleared).await.unwrap();

    let loaded = users.get("u1").await.unwrap().unwrap();
    assert_eq!(loaded.data.nickname, None);
    assert_eq!(loaded.version, 2);
}

#[tokio::test]
async fn duplicate_hash_key_is_a_uniqueness_conflict() {
    let manager = mapper(InMemoryStore::new());
    let users = manager.entities::<User>().unwrap();
    users.create_table().await.unwrap();
    users.put(&User::new("u1", "a@b.c", "Ann")).await.unwrap();

    let same_id = users.put(&User::new("u1", "x@y.z", "Other")).await.unwrap_err();
    assert!(same_id.is_uniqueness_conflict());
    assert!(same_id.to_string().contains("already exists in table `users`"));

    // Hash-key rows without range keys carry the ID, so emails may repeat.
    users.put(&User::new("u2", "a@b.c", "Twin")).await.unwrap();
    let page = users
        .find(&KeyCondition::new().eq("email", "a@b.c"), None, &FindOptions::default())
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
}

#[tokio::test]
async fn find_by_pair_and_range() {
    let manager = mapper(InMemoryStore::new());
    let posts = manager.entities::<Post>().unwrap();
    posts.create_table().await.unwrap();

    posts.put(&Post::new(1, "ann", "2024-01", "b1", &["todo", "doing"])).await.unwrap();
    posts.put(&Post::new(2, "ann", "2024-03", "b1", &["done"])).await.unwrap();
    posts.put(&Post::new(3, "bob", "2024-02", "b2", &["todo"])).await.unwrap();

    let todo = posts
        .find(
            &KeyCondition::new().eq("board", "b1").eq("lanes", "todo"),
            None,
            &FindOptions::default(),
        )
        .await
        .unwrap();
    let ids: Vec<u32> = todo.items.iter().map(|p| p.data.id).collect();
    assert_eq!(ids, vec![1]);

    let board = posts
        .find(&KeyCondition::new().eq("board", "b1"), None, &FindOptions::default())
        .await
        .unwrap();
    let ids: Vec<u32> = board.items.iter().map(|p| p.data.id).collect();
    assert_eq!(ids, vec![1, 2]);

    let by_ann = posts
        .find(
            &KeyCondition::new().eq("author", "ann").ge("created", "2024-02"),
            None,
            &FindOptions::default(),
        )
        .await
        .unwrap();
    let ids: Vec<u32> = by_ann.items.iter().map(|p| p.data.id).collect();
    assert_eq!(ids, vec![2]);

    let listing = posts
        .find(
            &KeyCondition::new().le("created", "2024-02"),
            None,
            &FindOptions::default(),
        )
        .await
        .unwrap();
    let ids: Vec<u32> = listing.items.iter().map(|p| p.data.id).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn apply_and_delete_unversioned() {
    let manager = mapper(InMemoryStore::new());
    let counters = manager.entities::<PageCounter>().unwrap();
    counters.create_table().await.unwrap();
    counters
        .put(&PageCounter {
            id: "home".into(),
            hits: 0,
        })
        .await
        .unwrap();

    let version = counters
        .apply("home", &UpdateExpr::new().add("hits", 5), &WriteOptions::new())
        .await
        .unwrap();
    assert_eq!(version, 1);

    let loaded = counters.get("home").await.unwrap().unwrap();
    assert_eq!(loaded.data.hits, 5);

    assert!(counters.delete("home").await.unwrap());
    assert!(!counters.delete("home").await.unwrap());
    assert!(counters.get("home").await.unwrap().is_none());
    assert!(manager.inner().store().items("page_counters").is_empty());
}

#[tokio::test]
async fn get_with_explicit_consistency() {
    let manager = mapper(InMemoryStore::new());
    let users = manager.entities::<User>().unwrap();
    users.create_table().await.unwrap();
    users.put(&User::new("u1", "a@b.c", "Ann")).await.unwrap();

    let loaded = users
        .get_with("u1", &GetOptions::consistent())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.data.name, "Ann");

    let raw = manager
        .get(users.schema(), &Value::from("u1"), &GetOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw.data["email"], Value::from("a@b.c"));
}
