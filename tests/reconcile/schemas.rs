//! Hand-built schemas and helpers shared by the reconcile tests.

use dynamap::{item_from_json, mapper, DataManager, InMemoryStore, Item, MapperConfig, Schema};
use dynamap::{ReconcilingDataManager, ValidatingDataManager};

pub type Manager = ValidatingDataManager<ReconcilingDataManager<InMemoryStore>>;

pub fn item(json: serde_json::Value) -> Item {
    item_from_json(json).expect("object literal")
}

/// `id` plus a unique `byHandle` pair (handle, site).
pub fn accounts() -> Schema {
    Schema::builder("accounts")
        .id("id")
        .hash("email")
        .pair_hash("byHandle", "handle")
        .pair_range("byHandle", "site")
        .column("name")
        .build()
        .unwrap()
}

/// One pair over a two-value hash array and a five-value range array.
pub fn grids() -> Schema {
    Schema::builder("grids")
        .id("id")
        .pair_hash("grid", "rows")
        .pair_range("grid", "cols")
        .column("label")
        .build()
        .unwrap()
}

/// Hash `k1` is the ID itself and range `k1` an array.
pub fn things() -> Schema {
    Schema::builder("things")
        .id("id")
        .pair_hash("k1", "id")
        .pair_range("k1", "slots")
        .build()
        .unwrap()
}

pub fn tagged() -> Schema {
    Schema::builder("tagged")
        .id("id")
        .range("tags")
        .column("name")
        .build()
        .unwrap()
}

pub async fn manager_for(schemas: &[Schema]) -> Manager {
    let manager = mapper(InMemoryStore::new());
    for schema in schemas {
        manager.create_table(schema).await.unwrap();
    }
    manager
}

pub async fn manager_with(config: MapperConfig, schemas: &[Schema]) -> Manager {
    let manager = dynamap::mapper_with_config(InMemoryStore::new(), config).unwrap();
    for schema in schemas {
        manager.create_table(schema).await.unwrap();
    }
    manager
}

pub fn store(manager: &Manager) -> &InMemoryStore {
    manager.inner().store()
}
