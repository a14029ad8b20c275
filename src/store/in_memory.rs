//! InMemoryStore - HashMap-backed store client for testing and development.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::key_codec::PrimaryKey;
use crate::value::{Item, Value};

use super::{
    CancellationReason, GetRequest, QueryOutput, QueryRequest, StoreClient, StoreError, TableSpec,
    WriteOp,
};

#[derive(Debug)]
struct Table {
    spec: TableSpec,
    rows: BTreeMap<PrimaryKey, Item>,
}

impl Table {
    fn key_of(&self, item: &Item) -> Result<PrimaryKey, StoreError> {
        let part = |attribute: &str| {
            item.get(attribute)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    StoreError::InvalidRequest(format!("item is missing string key `{}`", attribute))
                })
        };
        Ok(PrimaryKey::new(
            part(&self.spec.hash_attribute)?,
            part(&self.spec.range_attribute)?,
        ))
    }

    fn op_key(&self, op: &WriteOp) -> Result<PrimaryKey, StoreError> {
        match op {
            WriteOp::Put { item, .. } => self.key_of(item),
            WriteOp::Update { key, .. } | WriteOp::Delete { key, .. } => Ok(key.clone()),
        }
    }
}

/// In-memory store with one table map per created table.
///
/// Transactions are all-or-nothing per call. Clone-friendly via Arc: clones
/// share the same tables.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
    max_transaction_items: usize,
    transact_calls: Arc<AtomicUsize>,
    injected_failure: Arc<Mutex<Option<StoreError>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_max_transaction_items(100)
    }

    pub fn with_max_transaction_items(max: usize) -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            max_transaction_items: max,
            transact_calls: Arc::new(AtomicUsize::new(0)),
            injected_failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Snapshot of every row in a table, ordered by primary key.
    pub fn items(&self, table: &str) -> Vec<Item> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(table).map(|t| t.rows.values().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, key: &PrimaryKey) -> Option<Item> {
        let tables = self.tables.read().ok()?;
        tables.get(table)?.rows.get(key).cloned()
    }

    /// Writes a row bypassing conditions, as a concurrent writer would.
    pub fn raw_put(&self, table: &str, item: Item) -> Result<(), StoreError> {
        let mut tables = self.write_tables()?;
        let table_ref = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let key = table_ref.key_of(&item)?;
        table_ref.rows.insert(key, item);
        Ok(())
    }

    /// Number of `transact_write` calls issued so far.
    pub fn transact_calls(&self) -> usize {
        self.transact_calls.load(Ordering::SeqCst)
    }

    /// Makes the next `transact_write` fail with `error` without applying anything.
    pub fn fail_next_transact(&self, error: StoreError) {
        if let Ok(mut slot) = self.injected_failure.lock() {
            *slot = Some(error);
        }
    }

    fn read_tables(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))
    }

    fn write_tables(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))
    }

    fn take_injected_failure(&self) -> Option<StoreError> {
        self.injected_failure.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn get(&self, request: GetRequest) -> Result<Option<Item>, StoreError> {
        let tables = self.read_tables()?;
        let table = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::TableNotFound(request.table.clone()))?;
        Ok(table.rows.get(&request.key).cloned())
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput, StoreError> {
        let tables = self.read_tables()?;
        let table = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::TableNotFound(request.table.clone()))?;

        let expected_partition = match &request.index {
            None => table.spec.hash_attribute.as_str(),
            Some(name) => table
                .spec
                .indexes
                .iter()
                .find(|i| &i.name == name)
                .map(|i| i.partition_attribute.as_str())
                .ok_or_else(|| StoreError::InvalidRequest(format!("unknown index `{}`", name)))?,
        };
        if request.key.partition_attribute != expected_partition {
            return Err(StoreError::InvalidRequest(format!(
                "key condition must target `{}`",
                expected_partition
            )));
        }

        let mut candidates: Vec<(&PrimaryKey, &Item)> = table
            .rows
            .iter()
            .filter(|(_, item)| item.get(expected_partition) == Some(&request.key.partition_value))
            .filter(|(_, item)| match &request.key.sort {
                Some((attribute, op)) => op.matches(item.get(attribute)),
                None => true,
            })
            .filter(|(key, _)| match &request.exclusive_start_key {
                Some(start) if request.scan_forward => *key > start,
                Some(start) => *key < start,
                None => true,
            })
            .collect();
        if !request.scan_forward {
            candidates.reverse();
        }

        let limit = request.limit.unwrap_or(usize::MAX);
        let more_remain = candidates.len() > limit;
        candidates.truncate(limit);
        let last_evaluated_key = if more_remain {
            candidates.last().map(|(key, _)| (*key).clone())
        } else {
            None
        };

        let items = candidates
            .into_iter()
            .map(|(_, item)| item)
            .filter(|item| request.filter.as_ref().map_or(true, |f| f.evaluate(item)))
            .map(|item| match &request.projection {
                Some(columns) => item
                    .iter()
                    .filter(|(k, _)| columns.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                None => item.clone(),
            })
            .collect();

        Ok(QueryOutput {
            items,
            last_evaluated_key,
        })
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.transact_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_injected_failure() {
            return Err(error);
        }
        if ops.len() > self.max_transaction_items {
            return Err(StoreError::InvalidRequest(format!(
                "transaction holds {} operations, limit is {}",
                ops.len(),
                self.max_transaction_items
            )));
        }

        let mut tables = self.write_tables()?;

        // Validate everything against current state before touching any row.
        let mut seen = HashSet::new();
        let mut reasons = Vec::with_capacity(ops.len());
        let mut staged: Vec<(String, PrimaryKey, Option<Item>)> = Vec::with_capacity(ops.len());
        for op in &ops {
            let table = tables
                .get(op.table())
                .ok_or_else(|| StoreError::TableNotFound(op.table().to_string()))?;
            let key = table.op_key(op)?;
            if !seen.insert((op.table().to_string(), key.clone())) {
                return Err(StoreError::InvalidRequest(
                    "transaction touches the same item more than once".into(),
                ));
            }

            let current = table.rows.get(&key);
            let empty = Item::new();
            let passes = op
                .condition()
                .map_or(true, |c| c.evaluate(current.unwrap_or(&empty)));
            reasons.push(if passes {
                CancellationReason::None
            } else {
                CancellationReason::ConditionalCheckFailed
            });

            let next = match op {
                WriteOp::Put { item, .. } => Some(item.clone()),
                WriteOp::Update { update, .. } => {
                    let mut item = current.cloned().unwrap_or_else(|| {
                        let mut fresh = Item::new();
                        fresh.insert(table.spec.hash_attribute.clone(), Value::from(key.hash.clone()));
                        fresh.insert(table.spec.range_attribute.clone(), Value::from(key.range.clone()));
                        fresh
                    });
                    update.apply_to(&mut item).map_err(StoreError::InvalidRequest)?;
                    Some(item)
                }
                WriteOp::Delete { .. } => None,
            };
            staged.push((op.table().to_string(), key, next));
        }

        if reasons.contains(&CancellationReason::ConditionalCheckFailed) {
            return Err(StoreError::TransactionCanceled { reasons });
        }

        for (table, key, next) in staged {
            if let Some(table) = tables.get_mut(&table) {
                match next {
                    Some(item) => {
                        table.rows.insert(key, item);
                    }
                    None => {
                        table.rows.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    async fn create_table(&self, spec: TableSpec) -> Result<(), StoreError> {
        let mut tables = self.write_tables()?;
        if tables.contains_key(&spec.name) {
            return Err(StoreError::TableAlreadyExists(spec.name));
        }
        tables.insert(
            spec.name.clone(),
            Table {
                spec,
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> Result<(), StoreError> {
        let mut tables = self.write_tables()?;
        tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn max_transaction_items(&self) -> usize {
        self.max_transaction_items
    }
}
