//! Validation Manager - rejects malformed calls before they reach the store.
//!
//! [`ValidatingDataManager`] wraps any [`DataManager`] and checks arguments
//! against the schema. A rejected call never touches the store and always
//! fails with [`MapperError::Validation`].

use async_trait::async_trait;
use tracing::debug;

use crate::cursor;
use crate::error::{MapperError, Result};
use crate::expression::{Condition, KeyCondition, UpdateExpr};
use crate::manager::{
    translate_key, DataManager, FindOptions, GetOptions, Page, Versioned, WriteOptions,
};
use crate::representation::{ANCHOR_RANGE, DEFAULT_HASH, DEFAULT_RANGE};
use crate::schema::{Schema, RESERVED_ATTRIBUTES};
use crate::value::{Item, Value, EMPTY_STRING_MARKER};

/// Literals the mapper writes itself and callers may not.
const RESERVED_LITERALS: [&str; 4] = [EMPTY_STRING_MARKER, DEFAULT_HASH, DEFAULT_RANGE, ANCHOR_RANGE];

fn reject(schema: &Schema, message: String) -> MapperError {
    debug!(table = schema.table_name(), reason = %message, "call rejected");
    MapperError::Validation(message)
}

fn check_value(schema: &Schema, property: &str, value: &Value) -> Result<()> {
    if value.contains_invalid() {
        return Err(reject(
            schema,
            format!("`{}` holds a null or NaN value", property),
        ));
    }
    if let Some(literal) = RESERVED_LITERALS.iter().find(|l| value.contains_string(l)) {
        return Err(reject(
            schema,
            format!("`{}` holds the reserved literal `{}`", property, literal),
        ));
    }
    Ok(())
}

fn check_id(schema: &Schema, id: &Value) -> Result<()> {
    let property = &schema.id_key().property;
    if id.key_string().is_none() {
        return Err(reject(
            schema,
            format!("ID `{}` must be a string, number or boolean", property),
        ));
    }
    check_value(schema, property, id)
}

fn check_values(schema: &Schema, values: &Item) -> Result<()> {
    for (property, value) in values {
        if RESERVED_ATTRIBUTES.contains(&property.as_str()) {
            return Err(reject(
                schema,
                format!("`{}` is a reserved attribute name", property),
            ));
        }
        check_value(schema, property, value)?;
    }
    Ok(())
}

fn check_declared(schema: &Schema, property: &str, context: &str) -> Result<()> {
    if schema.column(property).is_none() {
        return Err(reject(
            schema,
            format!("unknown property `{}` in {}", property, context),
        ));
    }
    Ok(())
}

fn check_condition(schema: &Schema, condition: &Condition, context: &str) -> Result<()> {
    for property in condition.attributes() {
        check_declared(schema, property, context)?;
    }
    for value in condition.values() {
        check_value(schema, context, value)?;
    }
    Ok(())
}

fn check_write_options(schema: &Schema, options: &WriteOptions) -> Result<()> {
    match &options.condition {
        Some(condition) => check_condition(schema, condition, "write condition"),
        None => Ok(()),
    }
}

fn check_key(schema: &Schema, key: &KeyCondition) -> Result<()> {
    for clause in &key.clauses {
        if !schema.is_key_property(&clause.property) {
            return Err(reject(
                schema,
                format!("`{}` is not a key property", clause.property),
            ));
        }
        for value in clause.op.values() {
            check_value(schema, &clause.property, value)?;
        }
    }
    translate_key(schema, key).map(|_| ())
}

fn check_update(schema: &Schema, update: &UpdateExpr) -> Result<()> {
    if update.is_empty() {
        return Err(reject(schema, "update clause is empty".to_string()));
    }
    for property in update.attributes() {
        if RESERVED_ATTRIBUTES.contains(&property) {
            return Err(reject(
                schema,
                format!("update may not touch reserved attribute `{}`", property),
            ));
        }
        if schema.is_key_property(property) {
            return Err(reject(
                schema,
                format!(
                    "update may not touch key property `{}`; use a full update instead",
                    property
                ),
            ));
        }
        check_declared(schema, property, "update clause")?;
    }
    for value in update.values() {
        check_value(schema, "update clause", value)?;
    }
    Ok(())
}

/// [`DataManager`] decorator that validates every call.
#[derive(Debug, Clone)]
pub struct ValidatingDataManager<M> {
    inner: M,
}

impl<M: DataManager> ValidatingDataManager<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn into_inner(self) -> M {
        self.inner
    }
}

#[async_trait]
impl<M: DataManager> DataManager for ValidatingDataManager<M> {
    async fn put(
        &self,
        schema: &Schema,
        values: &Item,
        options: &WriteOptions,
    ) -> Result<Versioned<Item>> {
        let id_property = &schema.id_key().property;
        let id = values
            .get(id_property)
            .ok_or_else(|| reject(schema, format!("missing ID property `{}`", id_property)))?;
        check_id(schema, id)?;
        check_values(schema, values)?;
        check_write_options(schema, options)?;
        self.inner.put(schema, values, options).await
    }

    async fn get(
        &self,
        schema: &Schema,
        id: &Value,
        options: &GetOptions,
    ) -> Result<Option<Versioned<Item>>> {
        check_id(schema, id)?;
        self.inner.get(schema, id, options).await
    }

    async fn find(
        &self,
        schema: &Schema,
        key: &KeyCondition,
        filter: Option<&Condition>,
        options: &FindOptions,
    ) -> Result<Page<Item>> {
        if options.limit == Some(0) {
            return Err(reject(schema, "limit must be at least 1".to_string()));
        }
        check_key(schema, key)?;
        if let Some(filter) = filter {
            check_condition(schema, filter, "filter")?;
        }
        for column in options.columns.iter().flatten() {
            if !RESERVED_ATTRIBUTES.contains(&column.as_str()) {
                check_declared(schema, column, "projection")?;
            }
        }
        if let Some(token) = &options.cursor {
            cursor::decode(token)?;
        }
        self.inner.find(schema, key, filter, options).await
    }

    async fn update(
        &self,
        schema: &Schema,
        id: &Value,
        values: &Item,
        options: &WriteOptions,
    ) -> Result<Versioned<Item>> {
        check_id(schema, id)?;
        check_values(schema, values)?;
        if let Some(given) = values.get(&schema.id_key().property) {
            if given != id {
                return Err(reject(schema, "update may not change the ID".to_string()));
            }
        }
        check_write_options(schema, options)?;
        self.inner.update(schema, id, values, options).await
    }

    async fn apply(
        &self,
        schema: &Schema,
        id: &Value,
        update: &UpdateExpr,
        options: &WriteOptions,
    ) -> Result<u64> {
        check_id(schema, id)?;
        check_update(schema, update)?;
        check_write_options(schema, options)?;
        self.inner.apply(schema, id, update, options).await
    }

    async fn delete(&self, schema: &Schema, id: &Value, options: &WriteOptions) -> Result<usize> {
        check_id(schema, id)?;
        check_write_options(schema, options)?;
        self.inner.delete(schema, id, options).await
    }

    async fn create_table(&self, schema: &Schema) -> Result<()> {
        self.inner.create_table(schema).await
    }

    async fn delete_table(&self, schema: &Schema) -> Result<()> {
        self.inner.delete_table(schema).await
    }
}
