//! Key codec - the `target#property` naming used for renamed columns, and the
//! `#`-joined encoding of multi-part hash/range values.

use serde::{Deserialize, Serialize};

/// Separator between the parts of a composite name or key value.
pub const KEY_SEPARATOR: char = '#';

/// The two-part primary key every physical row carries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub hash: String,
    pub range: String,
}

impl PrimaryKey {
    pub fn new(hash: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            range: range.into(),
        }
    }
}

/// A column name split into its physical attribute and logical property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnName {
    pub target: String,
    pub property: String,
}

impl ColumnName {
    /// Parses `"target#property"`. A bare `"name"` maps to itself.
    ///
    /// Returns `None` when either half is empty or more than one separator is present.
    pub fn parse(encoded: &str) -> Option<ColumnName> {
        let mut parts = encoded.split(KEY_SEPARATOR);
        let target = parts.next()?;
        let property = parts.next().unwrap_or(target);
        if parts.next().is_some() || target.is_empty() || property.is_empty() {
            return None;
        }
        Some(ColumnName {
            target: target.to_string(),
            property: property.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        if self.target == self.property {
            self.target.clone()
        } else {
            format!("{}{}{}", self.target, KEY_SEPARATOR, self.property)
        }
    }

    pub fn is_renamed(&self) -> bool {
        self.target != self.property
    }
}

/// Joins key parts with `#`.
pub fn join_key_parts<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(KEY_SEPARATOR);
        }
        out.push_str(part.as_ref());
    }
    out
}
