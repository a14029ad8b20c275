//! Schema View - the immutable per-entity-type description the mapper works from.
//!
//! A [`Schema`] is built once per entity type, either by hand through
//! [`SchemaBuilder`] or by `#[derive(Mapped)]`, and then passed by reference into
//! every manager call. It is read-only and freely shared between tasks.
//!
//! ## Example
//!
//! ```ignore
//! let schema = Schema::builder("users")
//!     .id("id")
//!     .hash("email")
//!     .range("createdAt")
//!     .pair_hash("byTeam", "team")
//!     .pair_range("byTeam", "role")
//!     .column("name")
//!     .build()?;
//! ```

mod builder;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::config::MapperConfig;
use crate::key_codec::{join_key_parts, PrimaryKey};
use crate::representation::ANCHOR_RANGE;
use crate::store::{IndexSpec, TableSpec};
use crate::value::{decode_empty_strings, encode_empty_strings, Item, Value};

pub use builder::SchemaBuilder;

/// Physical hash key attribute.
pub const HASH_ATTRIBUTE: &str = "hash";
/// Physical range key attribute.
pub const RANGE_ATTRIBUTE: &str = "range";
/// Physical object-id attribute; partition key of the ID index.
pub const OBJID_ATTRIBUTE: &str = "objid";
/// Physical entity version attribute.
pub const OBJVER_ATTRIBUTE: &str = "objver";

/// Attribute names present on every row and unavailable to custom columns.
pub const RESERVED_ATTRIBUTES: [&str; 4] = [
    HASH_ATTRIBUTE,
    RANGE_ATTRIBUTE,
    OBJID_ATTRIBUTE,
    OBJVER_ATTRIBUTE,
];

/// Errors raised while declaring a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema table name must not be empty")]
    EmptyTableName,
    #[error("invalid data prefix `{0}`")]
    InvalidPrefix(String),
    #[error("schema for table `{0}` declares no ID key")]
    MissingId(String),
    #[error("`{0}` is a reserved attribute name")]
    ReservedName(String),
    #[error("column `{0}` is declared more than once")]
    DuplicateColumn(String),
    #[error("invalid column name `{0}`")]
    InvalidColumnName(String),
    #[error("hash-range pair `{0}` declares no hash column")]
    EmptyPair(String),
}

/// A logical property and the physical attribute it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub property: String,
    pub attribute: String,
}

impl ColumnRef {
    pub fn new(property: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            attribute: attribute.into(),
        }
    }
}

/// A named composite access pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRangePair {
    pub name: String,
    pub hashes: Vec<ColumnRef>,
    pub ranges: Vec<ColumnRef>,
}

/// Immutable description of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    table_name: String,
    data_prefix: String,
    id_key: ColumnRef,
    hash_keys: Vec<ColumnRef>,
    range_keys: Vec<ColumnRef>,
    pairs: Vec<HashRangePair>,
    columns: Vec<ColumnRef>,
    versioning_enabled: bool,
    strongly_consistent_default: bool,
}

impl Schema {
    pub fn builder(table_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(table_name)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn data_prefix(&self) -> &str {
        &self.data_prefix
    }

    pub fn id_key(&self) -> &ColumnRef {
        &self.id_key
    }

    pub fn hash_keys(&self) -> &[ColumnRef] {
        &self.hash_keys
    }

    pub fn range_keys(&self) -> &[ColumnRef] {
        &self.range_keys
    }

    pub fn pairs(&self) -> &[HashRangePair] {
        &self.pairs
    }

    pub fn pair(&self, name: &str) -> Option<&HashRangePair> {
        self.pairs.iter().find(|p| p.name == name)
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn versioning_enabled(&self) -> bool {
        self.versioning_enabled
    }

    pub fn strongly_consistent_default(&self) -> bool {
        self.strongly_consistent_default
    }

    /// Looks up a declared column by logical property name.
    pub fn column(&self, property: &str) -> Option<&ColumnRef> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// Looks up a declared column by physical attribute name.
    pub fn column_by_attribute(&self, attribute: &str) -> Option<&ColumnRef> {
        self.columns.iter().find(|c| c.attribute == attribute)
    }

    /// Physical attribute for a logical property. Undeclared properties keep their name.
    pub fn attribute_for<'a>(&'a self, property: &'a str) -> &'a str {
        self.column(property)
            .map(|c| c.attribute.as_str())
            .unwrap_or(property)
    }

    /// True when the property determines the hash or range of some row.
    pub fn is_key_property(&self, property: &str) -> bool {
        self.id_key.property == property
            || self.hash_keys.iter().any(|c| c.property == property)
            || self.range_keys.iter().any(|c| c.property == property)
            || self.pairs.iter().any(|p| {
                p.hashes.iter().any(|c| c.property == property)
                    || p.ranges.iter().any(|c| c.property == property)
            })
    }

    /// `prefix#id` - the object id shared by every row of one entity.
    ///
    /// Encoded the way stored rows are, so an empty-string ID maps to the
    /// empty-string marker.
    pub fn object_id(&self, id: &Value) -> Option<String> {
        encode_empty_strings(id)
            .key_string()
            .map(|id| join_key_parts(&[self.data_prefix.as_str(), id.as_str()]))
    }

    /// Key of the uniqueness anchor row for an entity.
    pub fn anchor_key(&self, id: &Value) -> Option<PrimaryKey> {
        self.object_id(id)
            .map(|hash| PrimaryKey::new(hash, ANCHOR_RANGE))
    }

    /// Renames logical properties to their physical attributes.
    pub fn to_physical(&self, values: &Item) -> Item {
        values
            .iter()
            .map(|(k, v)| (self.attribute_for(k).to_string(), v.clone()))
            .collect()
    }

    /// Rebuilds the logical entity from a stored row.
    ///
    /// Reserved attributes are dropped and the empty-string marker is reversed.
    pub fn to_logical(&self, row: &Item) -> Item {
        row.iter()
            .filter(|(k, _)| !RESERVED_ATTRIBUTES.contains(&k.as_str()))
            .map(|(k, v)| {
                let property = self
                    .column_by_attribute(k)
                    .map(|c| c.property.clone())
                    .unwrap_or_else(|| k.clone());
                (property, decode_empty_strings(v))
            })
            .collect()
    }

    /// Table definition this schema needs from the provisioning collaborator.
    pub fn table_spec(&self, config: &MapperConfig) -> TableSpec {
        TableSpec {
            name: self.table_name.clone(),
            hash_attribute: HASH_ATTRIBUTE.to_string(),
            range_attribute: RANGE_ATTRIBUTE.to_string(),
            indexes: vec![IndexSpec {
                name: config.id_index_name.clone(),
                partition_attribute: OBJID_ATTRIBUTE.to_string(),
            }],
        }
    }
}

/// Types the mapper can persist.
///
/// Usually implemented with `#[derive(Mapped)]`.
pub trait Mapped: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn schema() -> Result<Schema, SchemaError>;
}
