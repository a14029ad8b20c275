//! Logical to physical translation of key conditions, filters and update clauses.
//!
//! A logical key condition names entity properties. The store only knows
//! `hash` and `range`, so each condition is matched to the access pattern that
//! can answer it and rewritten into that pattern's encoded key values:
//!
//! * nothing, or a single range-key clause: the listing rows
//! * equality on the ID alone: the anchor row
//! * equality on every hash column of a pair: that pair's rows
//! * equality on a hash key: that hash key's rows
//!
//! Listing rows hold `value#id` ranges for every range key in one partition,
//! so a range clause there can only be widened into a key condition. The
//! [`ListingFilter`] returned alongside it narrows the rows back down.

use crate::error::{MapperError, Result};
use crate::expression::{Condition, KeyClause, KeyCondition, QueryKey, RangeOp, UpdateExpr};
use crate::key_codec::{join_key_parts, KEY_SEPARATOR};
use crate::representation::{ANCHOR_RANGE, DEFAULT_HASH};
use crate::schema::{
    ColumnRef, HashRangePair, Schema, HASH_ATTRIBUTE, OBJID_ATTRIBUTE, RANGE_ATTRIBUTE,
};
use crate::value::{encode_empty_strings, Item, Value};

/// Upper bound for every `value#id` listing range whose value sorts at or
/// below `value`.
///
/// A stored value may extend a prefix of `value` with `#` or a character
/// below it, so the bound is cut at the first such character.
fn listing_upper(value: &str) -> String {
    let cut = value
        .find(|c: char| c <= KEY_SEPARATOR)
        .unwrap_or(value.len());
    format!("{}{}", &value[..cut], char::MAX)
}

/// Exact check for rows read through a widened listing key condition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ListingFilter {
    attribute: String,
    id_prefix: String,
    op: RangeOp,
}

impl ListingFilter {
    /// Physical attribute the row must carry for [`matches`](Self::matches).
    pub(crate) fn attribute(&self) -> &str {
        &self.attribute
    }

    /// True when the row's listing range came from this filter's range key
    /// and its value satisfies the original operator.
    pub(crate) fn matches(&self, row: &Item) -> bool {
        let text = |attribute: &str| row.get(attribute).and_then(Value::as_str);
        let (Some(range), Some(obj_id)) = (text(RANGE_ATTRIBUTE), text(OBJID_ATTRIBUTE)) else {
            return false;
        };
        let Some(value) = obj_id
            .strip_prefix(self.id_prefix.as_str())
            .and_then(|id| range.strip_suffix(id))
            .and_then(|rest| rest.strip_suffix(KEY_SEPARATOR))
        else {
            return false;
        };
        let owned = row
            .get(&self.attribute)
            .map(Value::key_candidates)
            .unwrap_or_default();
        owned.iter().any(|candidate| candidate == value)
            && self.op.matches(Some(&Value::from(value)))
    }
}

fn key_text(property: &str, value: &Value) -> Result<String> {
    encode_empty_strings(value).key_string().ok_or_else(|| {
        MapperError::validation(format!(
            "key condition on `{}` needs a scalar value",
            property
        ))
    })
}

fn eq_text(clause: &KeyClause) -> Result<Option<String>> {
    match &clause.op {
        RangeOp::Eq(value) => key_text(&clause.property, value).map(Some),
        _ => Ok(None),
    }
}

/// Turns every value of a range operator into its key string.
fn stringify(property: &str, op: &RangeOp) -> Result<RangeOp> {
    let text = |v: &Value| key_text(property, v).map(Value::String);
    Ok(match op {
        RangeOp::Eq(v) => RangeOp::Eq(text(v)?),
        RangeOp::Lt(v) => RangeOp::Lt(text(v)?),
        RangeOp::Le(v) => RangeOp::Le(text(v)?),
        RangeOp::Gt(v) => RangeOp::Gt(text(v)?),
        RangeOp::Ge(v) => RangeOp::Ge(text(v)?),
        RangeOp::Between(low, high) => RangeOp::Between(text(low)?, text(high)?),
        RangeOp::BeginsWith(prefix) => RangeOp::BeginsWith(prefix.clone()),
    })
}

/// Widens an operator on a range value into one on `value#id` listing ranges.
///
/// The widened operator selects a superset of the matching rows.
fn listing_op(property: &str, op: &RangeOp) -> Result<RangeOp> {
    let upper = |v: &Value| -> Result<Value> {
        Ok(Value::String(listing_upper(&key_text(property, v)?)))
    };
    Ok(match stringify(property, op)? {
        RangeOp::Eq(v) => RangeOp::BeginsWith(format!("{}#", key_text(property, &v)?)),
        RangeOp::Lt(v) | RangeOp::Le(v) => RangeOp::Le(upper(&v)?),
        RangeOp::Between(low, high) => RangeOp::Between(low, upper(&high)?),
        other => other,
    })
}

fn unsupported(key: &KeyCondition) -> MapperError {
    let properties: Vec<&str> = key.clauses.iter().map(|c| c.property.as_str()).collect();
    MapperError::validation(format!(
        "no declared access pattern answers a key condition on {:?}",
        properties
    ))
}

fn find_column<'a>(columns: &'a [ColumnRef], property: &str) -> Option<&'a ColumnRef> {
    columns.iter().find(|c| c.property == property)
}

fn pair_query(schema: &Schema, pair: &HashRangePair, key: &KeyCondition) -> Result<QueryKey> {
    let mut hash_parts = vec![schema.data_prefix().to_string(), pair.name.clone()];
    for column in &pair.hashes {
        let clause = key.clause(&column.property).ok_or_else(|| unsupported(key))?;
        hash_parts.push(eq_text(clause)?.ok_or_else(|| unsupported(key))?);
    }
    let hash = join_key_parts(&hash_parts);
    let query = QueryKey::partition(HASH_ATTRIBUTE, hash);

    let range_clauses: Vec<&KeyClause> = key
        .clauses
        .iter()
        .filter(|c| find_column(&pair.hashes, &c.property).is_none())
        .collect();
    if range_clauses.iter().any(|c| find_column(&pair.ranges, &c.property).is_none()) {
        return Err(unsupported(key));
    }
    if range_clauses.is_empty() {
        return Ok(query);
    }

    if let [single] = pair.ranges.as_slice() {
        let clause = range_clauses[0];
        if range_clauses.len() > 1 || clause.property != single.property {
            return Err(unsupported(key));
        }
        return Ok(query.with_sort(RANGE_ATTRIBUTE, stringify(&clause.property, &clause.op)?));
    }

    // Composite ranges: equalities on a leading run of range columns, with an
    // optional prefix match on the column after it.
    let mut parts = vec![];
    let mut prefix = None;
    for column in &pair.ranges {
        let Some(clause) = key.clause(&column.property) else {
            break;
        };
        match &clause.op {
            RangeOp::Eq(value) => parts.push(key_text(&clause.property, value)?),
            RangeOp::BeginsWith(p) => {
                prefix = Some(p.clone());
                break;
            }
            _ => return Err(unsupported(key)),
        }
    }
    if parts.len() + usize::from(prefix.is_some()) != range_clauses.len() {
        return Err(unsupported(key));
    }

    let op = match prefix {
        Some(p) => {
            parts.push(p);
            RangeOp::BeginsWith(join_key_parts(&parts))
        }
        None if parts.len() == pair.ranges.len() => {
            RangeOp::Eq(Value::String(join_key_parts(&parts)))
        }
        None => RangeOp::BeginsWith(format!("{}#", join_key_parts(&parts))),
    };
    Ok(query.with_sort(RANGE_ATTRIBUTE, op))
}

/// Translates a logical key condition into the physical one that answers it.
pub fn translate_key(schema: &Schema, key: &KeyCondition) -> Result<QueryKey> {
    translate_query(schema, key).map(|(query, _)| query)
}

/// Like [`translate_key`], plus the row check a listing query still needs.
pub(crate) fn translate_query(
    schema: &Schema,
    key: &KeyCondition,
) -> Result<(QueryKey, Option<ListingFilter>)> {
    let prefix = schema.data_prefix();
    let listing = || QueryKey::partition(HASH_ATTRIBUTE, join_key_parts(&[prefix, DEFAULT_HASH]));

    if key.is_empty() {
        return Ok((listing(), None));
    }

    let id = schema.id_key();
    if let [clause] = key.clauses.as_slice() {
        if clause.property == id.property {
            if let Some(id_text) = eq_text(clause)? {
                let query = QueryKey::partition(
                    HASH_ATTRIBUTE,
                    join_key_parts(&[prefix, id_text.as_str()]),
                )
                .with_sort(RANGE_ATTRIBUTE, RangeOp::Eq(Value::from(ANCHOR_RANGE)));
                return Ok((query, None));
            }
        }
        if let Some(range_key) = find_column(schema.range_keys(), &clause.property) {
            let query =
                listing().with_sort(RANGE_ATTRIBUTE, listing_op(&clause.property, &clause.op)?);
            let filter = ListingFilter {
                attribute: range_key.attribute.clone(),
                id_prefix: format!("{}{}", prefix, KEY_SEPARATOR),
                op: stringify(&clause.property, &clause.op)?,
            };
            return Ok((query, Some(filter)));
        }
    }

    // Most specific pattern first: pairs covering the most equalities.
    let mut pairs: Vec<&HashRangePair> = schema
        .pairs()
        .iter()
        .filter(|pair| {
            pair.hashes.iter().all(|column| {
                key.clause(&column.property)
                    .is_some_and(|c| matches!(c.op, RangeOp::Eq(_)))
            })
        })
        .collect();
    pairs.sort_by_key(|pair| std::cmp::Reverse(pair.hashes.len()));
    for pair in pairs {
        if let Ok(query) = pair_query(schema, pair, key) {
            return Ok((query, None));
        }
    }

    for hash_key in schema.hash_keys() {
        let Some(clause) = key.clause(&hash_key.property) else {
            continue;
        };
        let Some(hash_text) = eq_text(clause)? else {
            continue;
        };
        let hash = join_key_parts(&[prefix, hash_key.attribute.as_str(), hash_text.as_str()]);
        let query = QueryKey::partition(HASH_ATTRIBUTE, hash);
        let rest: Vec<&KeyClause> = key
            .clauses
            .iter()
            .filter(|c| c.property != hash_key.property)
            .collect();
        match rest.as_slice() {
            [] => return Ok((query, None)),
            [range] if find_column(schema.range_keys(), &range.property).is_some() => {
                let op = stringify(&range.property, &range.op)?;
                return Ok((query.with_sort(RANGE_ATTRIBUTE, op), None));
            }
            _ => {}
        }
    }

    Err(unsupported(key))
}

/// Renames a caller condition to physical attributes and encodes empty strings.
pub fn translate_condition(schema: &Schema, condition: &Condition) -> Condition {
    condition.map(
        &|property| schema.attribute_for(property).to_string(),
        &encode_empty_strings,
    )
}

pub fn translate_update(schema: &Schema, update: &UpdateExpr) -> UpdateExpr {
    update.map(
        &|property| schema.attribute_for(property).to_string(),
        &encode_empty_strings,
    )
}

/// Physical projection for the requested logical columns.
pub(crate) fn projection(schema: &Schema, columns: &[String]) -> Vec<String> {
    let mut attributes: Vec<String> = crate::schema::RESERVED_ATTRIBUTES
        .iter()
        .map(|a| a.to_string())
        .collect();
    for column in columns {
        let attribute = schema.attribute_for(column).to_string();
        if !attributes.contains(&attribute) {
            attributes.push(attribute);
        }
    }
    attributes
}
