//! Representation Generator - computes every physical row one logical entity needs.
//!
//! Pure and deterministic: no I/O, same input always yields the same rows in the
//! same order (anchor, hash-key groups, hash-range pairs, listing).

use std::collections::HashSet;

use thiserror::Error;

use crate::key_codec::{join_key_parts, PrimaryKey};
use crate::schema::{
    ColumnRef, Schema, HASH_ATTRIBUTE, OBJID_ATTRIBUTE, OBJVER_ATTRIBUTE, RANGE_ATTRIBUTE,
};
use crate::value::{encode_empty_strings, Item, Value};

/// Hash value used when a hash field is absent, and for listing rows.
pub const DEFAULT_HASH: &str = "$$hash$$";
/// Range value used when no range field applies.
pub const DEFAULT_RANGE: &str = "$$range$$";
/// Fixed range of the uniqueness anchor row.
pub const ANCHOR_RANGE: &str = "$$id$$";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepresentationError {
    #[error("entity for table `{table}` has no usable value for ID property `{property}`")]
    MissingId { table: String, property: String },
}

/// One physical row materializing an entity for one access pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    pub table_name: String,
    pub hash: String,
    pub range: String,
    pub obj_id: String,
    pub data: Item,
}

impl Representation {
    pub fn key(&self) -> PrimaryKey {
        PrimaryKey::new(self.hash.clone(), self.range.clone())
    }

    pub fn version(&self) -> Option<u64> {
        self.data.get(OBJVER_ATTRIBUTE).and_then(Value::as_version)
    }

    pub fn is_anchor(&self) -> bool {
        self.range == ANCHOR_RANGE
    }
}

/// Reads the primary key of a stored row.
pub fn row_key(row: &Item) -> Option<PrimaryKey> {
    let hash = row.get(HASH_ATTRIBUTE)?.as_str()?;
    let range = row.get(RANGE_ATTRIBUTE)?.as_str()?;
    Some(PrimaryKey::new(hash, range))
}

/// Reads the entity version of a stored row; rows without one count as 0.
pub fn row_version(row: &Item) -> u64 {
    row.get(OBJVER_ATTRIBUTE)
        .and_then(Value::as_version)
        .unwrap_or(0)
}

/// Collects rows in emission order, dropping repeated keys.
struct RowSet<'a> {
    schema: &'a Schema,
    obj_id: String,
    data: Item,
    seen: HashSet<PrimaryKey>,
    rows: Vec<Representation>,
}

impl RowSet<'_> {
    fn push(&mut self, hash: String, range: String) {
        let key = PrimaryKey::new(hash.clone(), range.clone());
        if !self.seen.insert(key) {
            return;
        }
        let mut data = self.data.clone();
        data.insert(HASH_ATTRIBUTE.to_string(), Value::String(hash.clone()));
        data.insert(RANGE_ATTRIBUTE.to_string(), Value::String(range.clone()));
        data.insert(OBJID_ATTRIBUTE.to_string(), Value::String(self.obj_id.clone()));
        self.rows.push(Representation {
            table_name: self.schema.table_name().to_string(),
            hash,
            range,
            obj_id: self.obj_id.clone(),
            data,
        });
    }
}

/// Computes the full representation set for `values` at `entity_version`.
///
/// Every row carries `objver = entity_version + 1`.
pub fn generate(
    schema: &Schema,
    values: &Item,
    entity_version: u64,
) -> Result<Vec<Representation>, RepresentationError> {
    let mut data: Item = schema
        .to_physical(values)
        .iter()
        .map(|(k, v)| (k.clone(), encode_empty_strings(v)))
        .collect();
    data.insert(
        OBJVER_ATTRIBUTE.to_string(),
        Value::from(entity_version + 1),
    );

    let id_key = schema.id_key();
    let id = data
        .get(&id_key.attribute)
        .and_then(Value::key_string)
        .ok_or_else(|| RepresentationError::MissingId {
            table: schema.table_name().to_string(),
            property: id_key.property.clone(),
        })?;
    let prefix = schema.data_prefix();
    let obj_id = join_key_parts(&[prefix, id.as_str()]);
    let candidates = |column: &ColumnRef| -> Vec<String> {
        data.get(&column.attribute)
            .map(Value::key_candidates)
            .unwrap_or_default()
    };
    let with_id = |part: &str| join_key_parts(&[part, id.as_str()]);

    let mut set = RowSet {
        schema,
        obj_id: obj_id.clone(),
        data: data.clone(),
        seen: HashSet::new(),
        rows: vec![],
    };

    set.push(obj_id.clone(), ANCHOR_RANGE.to_string());

    for hash_key in schema.hash_keys() {
        let hash_values = candidates(hash_key);
        let hash_present = !hash_values.is_empty();
        let hash_values = if hash_present {
            hash_values
        } else {
            vec![DEFAULT_HASH.to_string()]
        };

        for hash_value in &hash_values {
            let hash = join_key_parts(&[prefix, hash_key.attribute.as_str(), hash_value.as_str()]);
            if schema.range_keys().is_empty() {
                set.push(hash.clone(), with_id(DEFAULT_RANGE));
                continue;
            }
            for range_key in schema.range_keys() {
                let range_values = candidates(range_key);
                if range_values.is_empty() {
                    set.push(hash.clone(), with_id(DEFAULT_RANGE));
                }
                for range_value in range_values {
                    let range = if hash_present {
                        range_value
                    } else {
                        with_id(&range_value)
                    };
                    set.push(hash.clone(), range);
                }
            }
        }
    }

    for pair in schema.pairs() {
        let (hash_combos, hash_absent) = combinations(pair.hashes.iter().map(&candidates), DEFAULT_HASH);
        let (range_combos, range_absent) = if pair.ranges.is_empty() {
            (vec![vec![DEFAULT_RANGE.to_string()]], true)
        } else {
            combinations(pair.ranges.iter().map(&candidates), DEFAULT_RANGE)
        };

        for hash_parts in &hash_combos {
            let mut parts = vec![prefix, pair.name.as_str()];
            parts.extend(hash_parts.iter().map(String::as_str));
            let hash = join_key_parts(&parts);
            for range_parts in &range_combos {
                let range = join_key_parts(range_parts);
                let range = if hash_absent || range_absent {
                    with_id(&range)
                } else {
                    range
                };
                set.push(hash.clone(), range);
            }
        }
    }

    let listing_hash = join_key_parts(&[prefix, DEFAULT_HASH]);
    if schema.range_keys().is_empty() {
        set.push(listing_hash.clone(), with_id(DEFAULT_RANGE));
    }
    for range_key in schema.range_keys() {
        let range_values = candidates(range_key);
        if range_values.is_empty() {
            set.push(listing_hash.clone(), with_id(DEFAULT_RANGE));
        }
        for range_value in range_values {
            set.push(listing_hash.clone(), with_id(&range_value));
        }
    }

    Ok(set.rows)
}

/// Cartesian product of per-field candidates, outer fields varying slowest.
///
/// A field without candidates contributes `fallback` and marks the result absent.
fn combinations(
    fields: impl Iterator<Item = Vec<String>>,
    fallback: &str,
) -> (Vec<Vec<String>>, bool) {
    let mut absent = false;
    let mut combos: Vec<Vec<String>> = vec![vec![]];
    for values in fields {
        let values = if values.is_empty() {
            absent = true;
            vec![fallback.to_string()]
        } else {
            values
        };
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                values.iter().map(move |v| {
                    let mut next = prefix.clone();
                    next.push(v.clone());
                    next
                })
            })
            .collect();
    }
    (combos, absent)
}
