//! EntityRepository - typed access to one [`Mapped`] entity type.
//!
//! ## Example
//!
//! ```ignore
//! use dynamap::{EntitiesExt, Mapped};
//!
//! #[derive(Serialize, Deserialize, Clone, Mapped)]
//! #[mapped(table = "users")]
//! struct User {
//!     #[mapped(id)]
//!     id: String,
//!     #[mapped(hash)]
//!     email: String,
//! }
//!
//! let users = manager.entities::<User>()?;
//! users.put(&user).await?;
//! let loaded = users.get("u-1").await?;
//! ```

use std::marker::PhantomData;

use serde_json::Value as Json;

use crate::error::{MapperError, Result};
use crate::expression::{Condition, KeyCondition, UpdateExpr};
use crate::manager::{DataManager, FindOptions, GetOptions, Page, Versioned, WriteOptions};
use crate::schema::{Mapped, Schema};
use crate::value::{item_from_json, item_to_json, Item, Value};

/// Serializes an entity into an item. `null` fields are left out.
pub fn to_item<T: Mapped>(entity: &T) -> Result<Item> {
    let json = serde_json::to_value(entity)?;
    let mut item = item_from_json(json)
        .ok_or_else(|| MapperError::Serde("entity must serialize to an object".into()))?;
    item.retain(|_, value| *value != Value::Null);
    Ok(item)
}

pub fn from_item<T: Mapped>(item: &Item) -> Result<T> {
    Ok(serde_json::from_value::<T>(item_to_json(item))?)
}

/// Typed wrapper over a [`DataManager`] for entities of type `T`.
pub struct EntityRepository<'a, D: ?Sized, T> {
    manager: &'a D,
    schema: Schema,
    _marker: PhantomData<T>,
}

impl<'a, D: DataManager + ?Sized, T: Mapped> EntityRepository<'a, D, T> {
    pub fn new(manager: &'a D) -> Result<Self> {
        Ok(Self {
            manager,
            schema: T::schema()?,
            _marker: PhantomData,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn typed(&self, versioned: Versioned<Item>) -> Result<Versioned<T>> {
        Ok(Versioned::new(from_item(&versioned.data)?, versioned.version))
    }

    /// Insert a new entity. Fails if its ID or any of its keys is taken.
    pub async fn put(&self, entity: &T) -> Result<Versioned<T>> {
        self.put_with(entity, &WriteOptions::new()).await
    }

    pub async fn put_with(&self, entity: &T, options: &WriteOptions) -> Result<Versioned<T>> {
        let written = self
            .manager
            .put(&self.schema, &to_item(entity)?, options)
            .await?;
        Ok(Versioned::new(entity.clone(), written.version))
    }

    pub async fn get(&self, id: impl Into<Value>) -> Result<Option<Versioned<T>>> {
        self.get_with(id, &GetOptions::default()).await
    }

    pub async fn get_with(
        &self,
        id: impl Into<Value>,
        options: &GetOptions,
    ) -> Result<Option<Versioned<T>>> {
        let found = self.manager.get(&self.schema, &id.into(), options).await?;
        found.map(|v| self.typed(v)).transpose()
    }

    pub async fn find(
        &self,
        key: &KeyCondition,
        filter: Option<&Condition>,
        options: &FindOptions,
    ) -> Result<Page<T>> {
        let page = self
            .manager
            .find(&self.schema, key, filter, options)
            .await?;
        let items = page
            .items
            .into_iter()
            .map(|v| self.typed(v))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            cursor: page.cursor,
        })
    }

    /// Replace the whole entity, expecting the version it was read at.
    pub async fn update(&self, current: &Versioned<T>) -> Result<Versioned<T>> {
        let values = to_item(&current.data)?;
        let id = self.id_of(&values)?;
        let options = WriteOptions::new().expecting(current.version).replacing();
        let written = self
            .manager
            .update(&self.schema, &id, &values, &options)
            .await?;
        self.typed(written)
    }

    /// Change only the listed fields.
    pub async fn update_fields(
        &self,
        id: impl Into<Value>,
        values: &Item,
        options: &WriteOptions,
    ) -> Result<Versioned<T>> {
        let written = self
            .manager
            .update(&self.schema, &id.into(), values, options)
            .await?;
        self.typed(written)
    }

    pub async fn apply(
        &self,
        id: impl Into<Value>,
        update: &UpdateExpr,
        options: &WriteOptions,
    ) -> Result<u64> {
        self.manager
            .apply(&self.schema, &id.into(), update, options)
            .await
    }

    /// Delete an entity by ID. Returns true if it existed.
    pub async fn delete(&self, id: impl Into<Value>) -> Result<bool> {
        let removed = self
            .manager
            .delete(&self.schema, &id.into(), &WriteOptions::new())
            .await?;
        Ok(removed > 0)
    }

    pub async fn create_table(&self) -> Result<()> {
        self.manager.create_table(&self.schema).await
    }

    fn id_of(&self, values: &Item) -> Result<Value> {
        let property = &self.schema.id_key().property;
        values
            .get(property)
            .cloned()
            .ok_or_else(|| MapperError::validation(format!("missing ID property `{}`", property)))
    }
}

/// Extension trait for typed entity access on any [`DataManager`].
pub trait EntitiesExt: DataManager + Sized {
    fn entities<T: Mapped>(&self) -> Result<EntityRepository<'_, Self, T>> {
        EntityRepository::new(self)
    }
}

impl<D: DataManager> EntitiesExt for D {}
