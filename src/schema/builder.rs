//! SchemaBuilder - fluent declaration of an entity's columns and access patterns.

use std::collections::HashSet;

use crate::key_codec::{ColumnName, KEY_SEPARATOR};

use super::{ColumnRef, HashRangePair, Schema, SchemaError, RESERVED_ATTRIBUTES};

/// Accumulates declarations; [`SchemaBuilder::build`] validates them all at once.
///
/// Column names accept the `target#property` form to store a property under a
/// different physical attribute.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    table_name: String,
    prefix: Option<String>,
    id: Option<String>,
    hashes: Vec<String>,
    ranges: Vec<String>,
    pairs: Vec<(String, Vec<String>, Vec<String>)>,
    columns: Vec<String>,
    versioning: bool,
    strongly_consistent: bool,
}

impl SchemaBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            prefix: None,
            id: None,
            hashes: vec![],
            ranges: vec![],
            pairs: vec![],
            columns: vec![],
            versioning: true,
            strongly_consistent: false,
        }
    }

    /// Data prefix for hash and ID values. Defaults to the table name.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn id(mut self, column: &str) -> Self {
        self.columns.push(column.to_string());
        self.id = Some(column.to_string());
        self
    }

    pub fn hash(mut self, column: &str) -> Self {
        self.columns.push(column.to_string());
        self.hashes.push(column.to_string());
        self
    }

    pub fn range(mut self, column: &str) -> Self {
        self.columns.push(column.to_string());
        self.ranges.push(column.to_string());
        self
    }

    pub fn pair_hash(mut self, pair: &str, column: &str) -> Self {
        self.columns.push(column.to_string());
        self.pair_entry(pair).1.push(column.to_string());
        self
    }

    pub fn pair_range(mut self, pair: &str, column: &str) -> Self {
        self.columns.push(column.to_string());
        self.pair_entry(pair).2.push(column.to_string());
        self
    }

    pub fn column(mut self, column: &str) -> Self {
        self.columns.push(column.to_string());
        self
    }

    pub fn versioning(mut self, enabled: bool) -> Self {
        self.versioning = enabled;
        self
    }

    pub fn strongly_consistent(mut self, enabled: bool) -> Self {
        self.strongly_consistent = enabled;
        self
    }

    fn pair_entry(&mut self, pair: &str) -> &mut (String, Vec<String>, Vec<String>) {
        let index = match self.pairs.iter().position(|(name, _, _)| name == pair) {
            Some(index) => index,
            None => {
                self.pairs.push((pair.to_string(), vec![], vec![]));
                self.pairs.len() - 1
            }
        };
        &mut self.pairs[index]
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        if self.table_name.is_empty() {
            return Err(SchemaError::EmptyTableName);
        }
        let data_prefix = self.prefix.clone().unwrap_or_else(|| self.table_name.clone());
        if data_prefix.is_empty() || data_prefix.contains(KEY_SEPARATOR) {
            return Err(SchemaError::InvalidPrefix(data_prefix));
        }

        let columns = self.resolve_columns()?;
        let lookup = |encoded: &String| -> Result<ColumnRef, SchemaError> {
            let name = ColumnName::parse(encoded)
                .ok_or_else(|| SchemaError::InvalidColumnName(encoded.clone()))?;
            columns
                .iter()
                .find(|c| c.property == name.property)
                .cloned()
                .ok_or_else(|| SchemaError::InvalidColumnName(encoded.clone()))
        };

        let id_key = match &self.id {
            Some(id) => lookup(id)?,
            None => return Err(SchemaError::MissingId(self.table_name.clone())),
        };
        let hash_keys = self.hashes.iter().map(lookup).collect::<Result<Vec<_>, _>>()?;
        let range_keys = self.ranges.iter().map(lookup).collect::<Result<Vec<_>, _>>()?;

        let mut pairs = Vec::with_capacity(self.pairs.len());
        for (name, hashes, ranges) in &self.pairs {
            if hashes.is_empty() {
                return Err(SchemaError::EmptyPair(name.clone()));
            }
            if name.is_empty() || name.contains(KEY_SEPARATOR) {
                return Err(SchemaError::InvalidColumnName(name.clone()));
            }
            pairs.push(HashRangePair {
                name: name.clone(),
                hashes: hashes.iter().map(lookup).collect::<Result<Vec<_>, _>>()?,
                ranges: ranges.iter().map(lookup).collect::<Result<Vec<_>, _>>()?,
            });
        }

        Ok(Schema {
            table_name: self.table_name,
            data_prefix,
            id_key,
            hash_keys,
            range_keys,
            pairs,
            columns,
            versioning_enabled: self.versioning,
            strongly_consistent_default: self.strongly_consistent,
        })
    }

    /// Parses every mentioned column once, in first-mention order.
    fn resolve_columns(&self) -> Result<Vec<ColumnRef>, SchemaError> {
        let mut columns: Vec<ColumnRef> = vec![];
        let mut attributes = HashSet::new();

        for encoded in &self.columns {
            let name = ColumnName::parse(encoded)
                .ok_or_else(|| SchemaError::InvalidColumnName(encoded.clone()))?;
            if RESERVED_ATTRIBUTES.contains(&name.target.as_str()) {
                return Err(SchemaError::ReservedName(name.target));
            }

            match columns.iter().find(|c| c.property == name.property) {
                Some(existing) if existing.attribute == name.target => continue,
                Some(_) => return Err(SchemaError::DuplicateColumn(name.property)),
                None => {}
            }
            if !attributes.insert(name.target.clone()) {
                return Err(SchemaError::DuplicateColumn(name.target));
            }
            columns.push(ColumnRef::new(name.property, name.target));
        }

        Ok(columns)
    }
}
