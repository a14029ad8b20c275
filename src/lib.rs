mod config;
mod cursor;
mod error;
mod expression;
mod key_codec;
mod manager;
mod repository;
mod representation;
mod schema;
mod store;
mod transaction;
mod validation;
mod value;

pub use config::{ConfigError, MapperConfig};
pub use cursor::CursorError;
pub use error::{MapperError, Result};
pub use expression::{
    CompareOp, Condition, ExpressionWriter, KeyClause, KeyCondition, QueryKey, RangeOp, Rendered,
    UpdateExpr,
};
pub use key_codec::{ColumnName, PrimaryKey, KEY_SEPARATOR};
pub use manager::{
    plan, translate_condition, translate_key, translate_update, DataManager, FindOptions,
    GetOptions, Page, PlannedWrite, ReconcilingDataManager, Versioned, WriteOptions, WritePlan,
};
pub use repository::{from_item, to_item, EntitiesExt, EntityRepository};
pub use representation::{
    generate, row_key, row_version, Representation, RepresentationError, ANCHOR_RANGE,
    DEFAULT_HASH, DEFAULT_RANGE,
};
pub use schema::{
    ColumnRef, HashRangePair, Mapped, Schema, SchemaBuilder, SchemaError, HASH_ATTRIBUTE,
    OBJID_ATTRIBUTE, OBJVER_ATTRIBUTE, RANGE_ATTRIBUTE, RESERVED_ATTRIBUTES,
};
pub use store::{
    CancellationReason, GetRequest, InMemoryStore, IndexSpec, QueryOutput, QueryRequest,
    RenderedOp, StoreClient, StoreError, TableSpec, WriteOp,
};
pub use transaction::{BatchExt, CommitSummary, TransactionBatcher};
pub use validation::ValidatingDataManager;
pub use value::{
    decode_empty_strings, encode_empty_strings, item_from_json, item_to_json, Item, Value,
    EMPTY_STRING_MARKER,
};

// Re-export the derive macro
pub use dynamap_macros::Mapped;

/// Cursor encoding for paged reads.
pub mod cursors {
    pub use crate::cursor::{decode, encode};
}

/// The usual stack: validation in front of the reconciling manager.
pub fn mapper<S: StoreClient>(store: S) -> ValidatingDataManager<ReconcilingDataManager<S>> {
    ValidatingDataManager::new(ReconcilingDataManager::new(store))
}

/// Same as [`mapper`] with explicit configuration.
pub fn mapper_with_config<S: StoreClient>(
    store: S,
    config: MapperConfig,
) -> Result<ValidatingDataManager<ReconcilingDataManager<S>>> {
    Ok(ValidatingDataManager::new(ReconcilingDataManager::with_config(
        store, config,
    )?))
}
