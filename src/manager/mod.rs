//! Data managers - the entity-level operations over the physical rows.
//!
//! [`DataManager`] is the seam every caller talks to. The reconciling
//! implementation does the real work against a [`StoreClient`]; the
//! validating decorator in [`crate::validation`] sits in front of it.
//!
//! [`StoreClient`]: crate::store::StoreClient

pub mod plan;
mod query;
mod reconciling;

use async_trait::async_trait;

use crate::error::Result;
use crate::expression::{Condition, KeyCondition, UpdateExpr};
use crate::schema::Schema;
use crate::value::{Item, Value};

pub use plan::{PlannedWrite, WritePlan};
pub use query::{translate_condition, translate_key, translate_update};
pub use reconciling::ReconcilingDataManager;

/// A value together with the entity version it was read or written at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(data: T, version: u64) -> Self {
        Self { data, version }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            data: f(self.data),
            version: self.version,
        }
    }
}

/// One page of a `find` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<Versioned<T>>,
    /// Resume point for the next call; `None` once the store is exhausted.
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOptions {
    /// Overrides the configured and schema consistency defaults.
    pub consistent: Option<bool>,
}

impl GetOptions {
    pub fn consistent() -> Self {
        Self {
            consistent: Some(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions {
    /// Maximum number of distinct entities to return.
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub scan_forward: bool,
    pub consistent: Option<bool>,
    /// Logical properties to project; reserved attributes are always read.
    pub columns: Option<Vec<String>>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            limit: None,
            cursor: None,
            scan_forward: true,
            consistent: None,
            columns: None,
        }
    }
}

impl FindOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.scan_forward = false;
        self
    }

    pub fn consistent(mut self, consistent: bool) -> Self {
        self.consistent = Some(consistent);
        self
    }

    pub fn columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    /// Caller condition over logical property names.
    pub condition: Option<Condition>,
    /// The version the caller last observed. Defaults to the freshly read one.
    pub expected_version: Option<u64>,
    /// `update` only: treat the values as the whole entity instead of a delta.
    pub replace: bool,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn expecting(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }
}

/// Entity-level operations over a hash/range store.
#[async_trait]
pub trait DataManager: Send + Sync {
    /// Writes a new entity. Returns the stored values at version 1.
    async fn put(&self, schema: &Schema, values: &Item, options: &WriteOptions)
        -> Result<Versioned<Item>>;

    /// Reads one entity by ID. Absence is `Ok(None)`.
    async fn get(&self, schema: &Schema, id: &Value, options: &GetOptions)
        -> Result<Option<Versioned<Item>>>;

    async fn find(
        &self,
        schema: &Schema,
        key: &KeyCondition,
        filter: Option<&Condition>,
        options: &FindOptions,
    ) -> Result<Page<Item>>;

    /// Changes the listed fields and reconciles every physical row.
    async fn update(
        &self,
        schema: &Schema,
        id: &Value,
        values: &Item,
        options: &WriteOptions,
    ) -> Result<Versioned<Item>>;

    /// Applies one native update clause to every current row. Returns the new version.
    async fn apply(
        &self,
        schema: &Schema,
        id: &Value,
        update: &UpdateExpr,
        options: &WriteOptions,
    ) -> Result<u64>;

    /// Deletes every row of the entity. Returns how many rows were removed.
    async fn delete(&self, schema: &Schema, id: &Value, options: &WriteOptions) -> Result<usize>;

    async fn create_table(&self, schema: &Schema) -> Result<()>;

    async fn delete_table(&self, schema: &Schema) -> Result<()>;
}

#[async_trait]
impl<M: DataManager + ?Sized> DataManager for std::sync::Arc<M> {
    async fn put(
        &self,
        schema: &Schema,
        values: &Item,
        options: &WriteOptions,
    ) -> Result<Versioned<Item>> {
        (**self).put(schema, values, options).await
    }

    async fn get(
        &self,
        schema: &Schema,
        id: &Value,
        options: &GetOptions,
    ) -> Result<Option<Versioned<Item>>> {
        (**self).get(schema, id, options).await
    }

    async fn find(
        &self,
        schema: &Schema,
        key: &KeyCondition,
        filter: Option<&Condition>,
        options: &FindOptions,
    ) -> Result<Page<Item>> {
        (**self).find(schema, key, filter, options).await
    }

    async fn update(
        &self,
        schema: &Schema,
        id: &Value,
        values: &Item,
        options: &WriteOptions,
    ) -> Result<Versioned<Item>> {
        (**self).update(schema, id, values, options).await
    }

    async fn apply(
        &self,
        schema: &Schema,
        id: &Value,
        update: &UpdateExpr,
        options: &WriteOptions,
    ) -> Result<u64> {
        (**self).apply(schema, id, update, options).await
    }

    async fn delete(&self, schema: &Schema, id: &Value, options: &WriteOptions) -> Result<usize> {
        (**self).delete(schema, id, options).await
    }

    async fn create_table(&self, schema: &Schema) -> Result<()> {
        (**self).create_table(schema).await
    }

    async fn delete_table(&self, schema: &Schema) -> Result<()> {
        (**self).delete_table(schema).await
    }
}
