//! The reconciling data manager: keeps every physical row of an entity in step
//! with its logical values.
//!
//! Writes are planned by [`super::plan`] and committed through the
//! [`TransactionBatcher`]. When a commit fails on a condition, the entity is
//! re-read to tell a version conflict apart from a key collision.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::plan::{plan_apply, plan_delete, plan_put, plan_update, WritePlan};
use super::query::{projection, translate_condition, translate_query, translate_update};
use super::{DataManager, FindOptions, GetOptions, Page, Versioned, WriteOptions};
use crate::config::MapperConfig;
use crate::cursor;
use crate::error::{MapperError, Result};
use crate::expression::{Condition, KeyCondition, QueryKey, UpdateExpr};
use crate::key_codec::PrimaryKey;
use crate::representation::{generate, row_key, row_version, ANCHOR_RANGE};
use crate::schema::{Schema, OBJID_ATTRIBUTE};
use crate::store::{GetRequest, QueryRequest, StoreClient, StoreError};
use crate::transaction::{CommitSummary, TransactionBatcher};
use crate::value::{Item, Value};

/// How a re-read version proves the caller's view stale.
#[derive(Debug, Clone, Copy)]
enum Staleness {
    /// Stored version reached the version the write tried to create.
    AtLeast(u64),
    /// Stored version moved past the version read before the write.
    After(u64),
}

impl Staleness {
    fn is_stale(self, stored: u64) -> bool {
        match self {
            Staleness::AtLeast(attempted) => stored >= attempted,
            Staleness::After(observed) => stored > observed,
        }
    }

    fn attempted(self) -> u64 {
        match self {
            Staleness::AtLeast(attempted) => attempted,
            Staleness::After(observed) => observed + 1,
        }
    }
}

fn id_text(id: &Value) -> String {
    id.key_string().unwrap_or_else(|| format!("{:?}", id))
}

fn not_found(schema: &Schema, id: &Value) -> MapperError {
    MapperError::NotFound {
        table: schema.table_name().to_string(),
        id: id_text(id),
    }
}

/// A failed condition with no caller condition in play means a key is taken.
fn uniqueness_or_store(schema: &Schema, error: StoreError, caller_condition: bool) -> MapperError {
    if error.is_conditional_failure() && !caller_condition {
        MapperError::UniquenessConflict {
            table: schema.table_name().to_string(),
            source: error,
        }
    } else {
        MapperError::Store(error)
    }
}

/// [`DataManager`] over any [`StoreClient`].
#[derive(Debug, Clone)]
pub struct ReconcilingDataManager<S> {
    store: S,
    config: MapperConfig,
}

impl<S: StoreClient> ReconcilingDataManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: MapperConfig::default(),
        }
    }

    pub fn with_config(store: S, config: MapperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Call option, then global override, then the schema default.
    fn read_consistency(&self, schema: &Schema, requested: Option<bool>) -> bool {
        requested
            .or(self.config.consistent_reads)
            .unwrap_or(schema.strongly_consistent_default())
    }

    async fn read_anchor(&self, schema: &Schema, id: &Value, consistent: bool) -> Result<Option<Item>> {
        let key = schema
            .anchor_key(id)
            .ok_or_else(|| MapperError::validation("ID must be a scalar value"))?;
        let row = self
            .store
            .get(GetRequest {
                table: schema.table_name().to_string(),
                key,
                consistent,
            })
            .await?;
        Ok(row)
    }

    /// Every stored row of one entity, anchor first.
    ///
    /// The ID index may lag behind the table, so a freshly read anchor
    /// replaces whatever the index returned for it.
    async fn current_rows(&self, schema: &Schema, obj_id: &str, anchor: Option<Item>) -> Result<Vec<Item>> {
        let mut rows = vec![];
        let mut start = None;
        loop {
            let mut request = QueryRequest::new(
                schema.table_name(),
                QueryKey::partition(OBJID_ATTRIBUTE, obj_id),
            );
            request.index = Some(self.config.id_index_name.clone());
            request.exclusive_start_key = start.take();
            request.limit = Some(self.config.default_page_size);

            let output = self.store.query(request).await?;
            rows.extend(output.items);
            match output.last_evaluated_key {
                Some(key) => start = Some(key),
                None => break,
            }
        }

        if let Some(anchor) = anchor {
            let anchor_key = row_key(&anchor);
            rows.retain(|row| row_key(row) != anchor_key);
            rows.insert(0, anchor);
        } else {
            rows.sort_by_key(|row| row_key(row).map_or(true, |key| key.range != ANCHOR_RANGE));
        }
        Ok(rows)
    }

    async fn commit(&self, plan: WritePlan) -> std::result::Result<CommitSummary, StoreError> {
        let mut batch = TransactionBatcher::new(&self.store, self.config.transaction_chunk_size);
        batch.extend(plan.into_ops());
        batch.commit().await
    }

    /// Maps a failed commit to the error the caller should see.
    async fn explain_failure(
        &self,
        schema: &Schema,
        id: &Value,
        error: StoreError,
        staleness: Option<Staleness>,
        caller_condition: bool,
    ) -> MapperError {
        if let Some(staleness) = staleness {
            match self.read_anchor(schema, id, true).await {
                Ok(Some(row)) => {
                    let stored = row_version(&row);
                    if staleness.is_stale(stored) {
                        warn!(
                            table = schema.table_name(),
                            id = %id_text(id),
                            attempted = staleness.attempted(),
                            stored,
                            "version conflict"
                        );
                        return MapperError::VersionConflict {
                            table: schema.table_name().to_string(),
                            id: id_text(id),
                            attempted: staleness.attempted(),
                            stored,
                        };
                    }
                }
                Ok(None) if error.is_conditional_failure() => return not_found(schema, id),
                Ok(None) => {}
                Err(refetch) => {
                    debug!(error = %refetch, "could not re-read entity after failed commit");
                }
            }
        }
        uniqueness_or_store(schema, error, caller_condition)
    }
}

#[async_trait]
impl<S: StoreClient> DataManager for ReconcilingDataManager<S> {
    async fn put(
        &self,
        schema: &Schema,
        values: &Item,
        options: &WriteOptions,
    ) -> Result<Versioned<Item>> {
        let rows = generate(schema, values, 0)?;
        let caller = options
            .condition
            .as_ref()
            .map(|c| translate_condition(schema, c));
        let plan = plan_put(schema, rows, caller.as_ref());
        let rows = plan.len();

        match self.commit(plan).await {
            Ok(summary) => {
                debug!(
                    table = schema.table_name(),
                    rows,
                    chunks = summary.chunks,
                    "put committed"
                );
                Ok(Versioned::new(values.clone(), 1))
            }
            Err(error) => Err(uniqueness_or_store(schema, error, caller.is_some())),
        }
    }

    async fn get(
        &self,
        schema: &Schema,
        id: &Value,
        options: &GetOptions,
    ) -> Result<Option<Versioned<Item>>> {
        let consistent = self.read_consistency(schema, options.consistent);
        let row = self.read_anchor(schema, id, consistent).await?;
        Ok(row.map(|row| Versioned::new(schema.to_logical(&row), row_version(&row))))
    }

    async fn find(
        &self,
        schema: &Schema,
        key: &KeyCondition,
        filter: Option<&Condition>,
        options: &FindOptions,
    ) -> Result<Page<Item>> {
        if options.limit == Some(0) {
            return Ok(Page {
                items: vec![],
                cursor: options.cursor.clone(),
            });
        }

        let (query_key, listing) = translate_query(schema, key)?;
        let filter = filter.map(|f| translate_condition(schema, f));
        let mut projection = options.columns.as_deref().map(|c| projection(schema, c));
        // The listing check reads the range key's own column.
        let mut borrowed = None;
        if let (Some(listing), Some(attributes)) = (&listing, projection.as_mut()) {
            if !attributes.iter().any(|a| a == listing.attribute()) {
                attributes.push(listing.attribute().to_string());
                borrowed = Some(listing.attribute().to_string());
            }
        }
        let consistent = self.read_consistency(schema, options.consistent);
        let limit_reached = |count: usize| options.limit.is_some_and(|limit| count >= limit);

        let mut start = options.cursor.as_deref().map(cursor::decode).transpose()?;
        let mut seen = HashSet::new();
        let mut items = vec![];
        let mut last_consumed: Option<PrimaryKey> = None;
        let mut pages = 0usize;

        let resume = 'pages: loop {
            let page_size = match options.limit {
                Some(limit) => limit - items.len(),
                None => self.config.default_page_size,
            };
            let request = QueryRequest {
                table: schema.table_name().to_string(),
                index: None,
                key: query_key.clone(),
                filter: filter.clone(),
                exclusive_start_key: start.take(),
                limit: Some(page_size),
                scan_forward: options.scan_forward,
                consistent,
                projection: projection.clone(),
            };
            let output = self.store.query(request).await?;
            pages += 1;

            for row in output.items {
                if limit_reached(items.len()) {
                    break 'pages last_consumed;
                }
                if let Some(key) = row_key(&row) {
                    last_consumed = Some(key);
                }
                if listing.as_ref().is_some_and(|l| !l.matches(&row)) {
                    continue;
                }
                let mut row = row;
                if let Some(attribute) = &borrowed {
                    row.remove(attribute);
                }
                let first_seen = match row.get(OBJID_ATTRIBUTE).and_then(Value::as_str) {
                    Some(obj_id) => seen.insert(obj_id.to_string()),
                    None => true,
                };
                if first_seen {
                    items.push(Versioned::new(schema.to_logical(&row), row_version(&row)));
                }
            }

            match output.last_evaluated_key {
                None => break None,
                Some(key) if limit_reached(items.len()) => break last_consumed.or(Some(key)),
                Some(key) => start = Some(key),
            }
        };

        debug!(
            table = schema.table_name(),
            items = items.len(),
            pages,
            more = resume.is_some(),
            "find complete"
        );
        Ok(Page {
            items,
            cursor: resume.as_ref().map(cursor::encode),
        })
    }

    async fn update(
        &self,
        schema: &Schema,
        id: &Value,
        values: &Item,
        options: &WriteOptions,
    ) -> Result<Versioned<Item>> {
        let anchor = self
            .read_anchor(schema, id, true)
            .await?
            .ok_or_else(|| not_found(schema, id))?;
        let base = options.expected_version.unwrap_or(row_version(&anchor));

        let mut merged = if options.replace {
            Item::new()
        } else {
            schema.to_logical(&anchor)
        };
        merged.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.insert(schema.id_key().property.clone(), id.clone());

        let desired = generate(schema, &merged, base)?;
        let obj_id = desired[0].obj_id.clone();
        let current = self.current_rows(schema, &obj_id, Some(anchor)).await?;

        let versioned = schema.versioning_enabled();
        let caller = options
            .condition
            .as_ref()
            .map(|c| translate_condition(schema, c));
        let plan = plan_update(schema, desired, &current, versioned.then_some(base), caller.as_ref());
        debug!(
            table = schema.table_name(),
            id = %id_text(id),
            writes = plan.len(),
            new_keys = plan.new_keys().len(),
            deletes = plan.deletes().len(),
            "update planned"
        );

        match self.commit(plan).await {
            Ok(_) => Ok(Versioned::new(merged, base + 1)),
            Err(error) => Err(self
                .explain_failure(
                    schema,
                    id,
                    error,
                    versioned.then_some(Staleness::AtLeast(base + 1)),
                    caller.is_some(),
                )
                .await),
        }
    }

    async fn apply(
        &self,
        schema: &Schema,
        id: &Value,
        update: &UpdateExpr,
        options: &WriteOptions,
    ) -> Result<u64> {
        let anchor = self
            .read_anchor(schema, id, true)
            .await?
            .ok_or_else(|| not_found(schema, id))?;
        let stored = row_version(&anchor);
        let base = options.expected_version.unwrap_or(stored);
        let obj_id = schema
            .object_id(id)
            .ok_or_else(|| MapperError::validation("ID must be a scalar value"))?;
        let current = self.current_rows(schema, &obj_id, Some(anchor)).await?;

        let versioned = schema.versioning_enabled();
        let caller = options
            .condition
            .as_ref()
            .map(|c| translate_condition(schema, c));
        let plan = plan_apply(
            schema,
            &current,
            &translate_update(schema, update),
            versioned.then_some(base),
            caller.as_ref(),
        );
        debug!(
            table = schema.table_name(),
            id = %id_text(id),
            rows = plan.len(),
            "apply planned"
        );

        match self.commit(plan).await {
            Ok(_) if versioned => Ok(base + 1),
            Ok(_) => Ok(stored),
            Err(error) => Err(self
                .explain_failure(
                    schema,
                    id,
                    error,
                    versioned.then_some(Staleness::After(base)),
                    caller.is_some(),
                )
                .await),
        }
    }

    async fn delete(&self, schema: &Schema, id: &Value, options: &WriteOptions) -> Result<usize> {
        let obj_id = schema
            .object_id(id)
            .ok_or_else(|| MapperError::validation("ID must be a scalar value"))?;
        let anchor = self.read_anchor(schema, id, true).await?;
        let current = self.current_rows(schema, &obj_id, anchor).await?;
        if current.is_empty() {
            debug!(table = schema.table_name(), id = %id_text(id), "nothing to delete");
            return Ok(0);
        }

        let caller = options
            .condition
            .as_ref()
            .map(|c| translate_condition(schema, c));
        let plan = plan_delete(schema, &current, caller.as_ref());
        let rows = plan.len();
        self.commit(plan).await?;
        debug!(table = schema.table_name(), id = %id_text(id), rows, "delete committed");
        Ok(rows)
    }

    async fn create_table(&self, schema: &Schema) -> Result<()> {
        self.store
            .create_table(schema.table_spec(&self.config))
            .await?;
        info!(table = schema.table_name(), "table created");
        Ok(())
    }

    async fn delete_table(&self, schema: &Schema) -> Result<()> {
        self.store.delete_table(schema.table_name()).await?;
        info!(table = schema.table_name(), "table deleted");
        Ok(())
    }
}
