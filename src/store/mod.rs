//! Store - the hash/range key-value store the mapper persists into.
//!
//! [`StoreClient`] is the collaborator boundary: point reads, key-condition
//! queries against the table or a secondary index, atomic transactional
//! writes, and table DDL. [`InMemoryStore`] implements it for tests and local
//! development; adapters for hosted stores render the structured expressions
//! with [`WriteOp::render`] and [`QueryKey::render`].

mod in_memory;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::expression::{Condition, ExpressionWriter, QueryKey, Rendered, UpdateExpr};
use crate::key_codec::PrimaryKey;
use crate::value::Item;

pub use in_memory::InMemoryStore;

/// Per-operation outcome reported when a transaction is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    None,
    ConditionalCheckFailed,
}

/// Errors raised by a store client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error(
        "transaction cancelled: {} of {} operations failed their condition",
        failed_conditions(.reasons),
        .reasons.len()
    )]
    TransactionCanceled { reasons: Vec<CancellationReason> },
    #[error("table `{0}` not found")]
    TableNotFound(String),
    #[error("table `{0}` already exists")]
    TableAlreadyExists(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("storage error: {0}")]
    Storage(String),
}

fn failed_conditions(reasons: &[CancellationReason]) -> usize {
    reasons
        .iter()
        .filter(|r| **r == CancellationReason::ConditionalCheckFailed)
        .count()
}

impl StoreError {
    /// True when the failure came from a conditional check.
    pub fn is_conditional_failure(&self) -> bool {
        match self {
            StoreError::TransactionCanceled { reasons } => failed_conditions(reasons) > 0,
            _ => false,
        }
    }
}

/// Table definition handed to the provisioning collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub hash_attribute: String,
    pub range_attribute: String,
    pub indexes: Vec<IndexSpec>,
}

/// A secondary index keyed by a single partition attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub partition_attribute: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetRequest {
    pub table: String,
    pub key: PrimaryKey,
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub table: String,
    pub index: Option<String>,
    pub key: QueryKey,
    pub filter: Option<Condition>,
    pub exclusive_start_key: Option<PrimaryKey>,
    pub limit: Option<usize>,
    pub scan_forward: bool,
    pub consistent: bool,
    pub projection: Option<Vec<String>>,
}

impl QueryRequest {
    pub fn new(table: impl Into<String>, key: QueryKey) -> Self {
        Self {
            table: table.into(),
            index: None,
            key,
            filter: None,
            exclusive_start_key: None,
            limit: None,
            scan_forward: true,
            consistent: false,
            projection: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<PrimaryKey>,
}

/// One operation inside a transactional write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put {
        table: String,
        item: Item,
        condition: Option<Condition>,
    },
    Update {
        table: String,
        key: PrimaryKey,
        update: UpdateExpr,
        condition: Option<Condition>,
    },
    Delete {
        table: String,
        key: PrimaryKey,
        condition: Option<Condition>,
    },
}

/// Native expression strings for one write operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedOp {
    pub condition_expression: Option<String>,
    pub update_expression: Option<String>,
    pub expression: Rendered,
}

impl WriteOp {
    pub fn table(&self) -> &str {
        match self {
            WriteOp::Put { table, .. } | WriteOp::Update { table, .. } | WriteOp::Delete { table, .. } => {
                table
            }
        }
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            WriteOp::Put { condition, .. }
            | WriteOp::Update { condition, .. }
            | WriteOp::Delete { condition, .. } => condition.as_ref(),
        }
    }

    /// Primary key addressed by the operation, read from the item for puts.
    pub fn key(&self, hash_attribute: &str, range_attribute: &str) -> Option<PrimaryKey> {
        match self {
            WriteOp::Put { item, .. } => {
                let hash = item.get(hash_attribute)?.as_str()?;
                let range = item.get(range_attribute)?.as_str()?;
                Some(PrimaryKey::new(hash, range))
            }
            WriteOp::Update { key, .. } | WriteOp::Delete { key, .. } => Some(key.clone()),
        }
    }

    /// Renders the condition and update clause with one shared placeholder set.
    pub fn render(&self) -> RenderedOp {
        let mut writer = ExpressionWriter::new();
        let update_expression = match self {
            WriteOp::Update { update, .. } => Some(writer.update(update)),
            _ => None,
        };
        let condition_expression = self.condition().map(|c| writer.condition(c));
        RenderedOp {
            condition_expression,
            update_expression,
            expression: writer.finish(String::new()),
        }
    }
}

/// The underlying store client.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn get(&self, request: GetRequest) -> Result<Option<Item>, StoreError>;

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput, StoreError>;

    /// Applies every operation atomically, or none of them.
    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    async fn create_table(&self, spec: TableSpec) -> Result<(), StoreError>;

    async fn delete_table(&self, name: &str) -> Result<(), StoreError>;

    /// Largest number of operations one `transact_write` accepts.
    fn max_transaction_items(&self) -> usize {
        100
    }
}

#[async_trait]
impl<S: StoreClient + ?Sized> StoreClient for Arc<S> {
    async fn get(&self, request: GetRequest) -> Result<Option<Item>, StoreError> {
        (**self).get(request).await
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput, StoreError> {
        (**self).query(request).await
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        (**self).transact_write(ops).await
    }

    async fn create_table(&self, spec: TableSpec) -> Result<(), StoreError> {
        (**self).create_table(spec).await
    }

    async fn delete_table(&self, name: &str) -> Result<(), StoreError> {
        (**self).delete_table(name).await
    }

    fn max_transaction_items(&self) -> usize {
        (**self).max_transaction_items()
    }
}
