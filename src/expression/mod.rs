//! Expressions - structured conditions, key conditions and update clauses.
//!
//! Callers build these against logical property names. The data manager
//! renames them to physical attributes before they reach the store, where they
//! are either evaluated directly ([`Condition::evaluate`]) or rendered to the
//! store's native expression syntax ([`Condition::render`]).

mod eval;
mod render;

use crate::value::Value;

pub use render::{ExpressionWriter, Rendered};

/// Comparison operators for conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A boolean condition over one row's attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists(String),
    NotExists(String),
    Compare {
        attribute: String,
        op: CompareOp,
        value: Value,
    },
    BeginsWith {
        attribute: String,
        prefix: String,
    },
    Between {
        attribute: String,
        low: Value,
        high: Value,
    },
    In {
        attribute: String,
        values: Vec<Value>,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn exists(attribute: impl Into<String>) -> Self {
        Condition::Exists(attribute.into())
    }

    pub fn not_exists(attribute: impl Into<String>) -> Self {
        Condition::NotExists(attribute.into())
    }

    pub fn compare(attribute: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::Compare {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Eq, value)
    }

    pub fn ne(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Ne, value)
    }

    pub fn lt(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Lt, value)
    }

    pub fn le(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Le, value)
    }

    pub fn gt(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Gt, value)
    }

    pub fn ge(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Ge, value)
    }

    pub fn begins_with(attribute: impl Into<String>, prefix: impl Into<String>) -> Self {
        Condition::BeginsWith {
            attribute: attribute.into(),
            prefix: prefix.into(),
        }
    }

    pub fn between(
        attribute: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Condition::Between {
            attribute: attribute.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn is_in(attribute: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::In {
            attribute: attribute.into(),
            values,
        }
    }

    /// Conjunction, flattening nested `And`s.
    pub fn and(self, other: Condition) -> Self {
        let mut parts = match self {
            Condition::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Condition::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Condition::And(parts)
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::Or(vec![self, other])
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// ANDs every present condition; `None` when there are none.
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Option<Condition> {
        conditions.into_iter().reduce(Condition::and)
    }

    /// Every attribute name the condition references.
    pub fn attributes(&self) -> Vec<&str> {
        let mut out = vec![];
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Exists(a) | Condition::NotExists(a) => out.push(a),
            Condition::Compare { attribute, .. }
            | Condition::BeginsWith { attribute, .. }
            | Condition::Between { attribute, .. }
            | Condition::In { attribute, .. } => out.push(attribute),
            Condition::And(parts) | Condition::Or(parts) => {
                parts.iter().for_each(|p| p.collect_attributes(out))
            }
            Condition::Not(inner) => inner.collect_attributes(out),
        }
    }

    /// Every literal value the condition references.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Condition::Exists(_) | Condition::NotExists(_) | Condition::BeginsWith { .. } => vec![],
            Condition::Compare { value, .. } => vec![value],
            Condition::Between { low, high, .. } => vec![low, high],
            Condition::In { values, .. } => values.iter().collect(),
            Condition::And(parts) | Condition::Or(parts) => {
                parts.iter().flat_map(Condition::values).collect()
            }
            Condition::Not(inner) => inner.values(),
        }
    }

    /// Rewrites attribute names and literal values.
    pub fn map(
        &self,
        attribute: &impl Fn(&str) -> String,
        value: &impl Fn(&Value) -> Value,
    ) -> Condition {
        match self {
            Condition::Exists(a) => Condition::Exists(attribute(a)),
            Condition::NotExists(a) => Condition::NotExists(attribute(a)),
            Condition::Compare {
                attribute: a,
                op,
                value: v,
            } => Condition::Compare {
                attribute: attribute(a),
                op: *op,
                value: value(v),
            },
            Condition::BeginsWith { attribute: a, prefix } => Condition::BeginsWith {
                attribute: attribute(a),
                prefix: prefix.clone(),
            },
            Condition::Between {
                attribute: a,
                low,
                high,
            } => Condition::Between {
                attribute: attribute(a),
                low: value(low),
                high: value(high),
            },
            Condition::In { attribute: a, values } => Condition::In {
                attribute: attribute(a),
                values: values.iter().map(value).collect(),
            },
            Condition::And(parts) => {
                Condition::And(parts.iter().map(|p| p.map(attribute, value)).collect())
            }
            Condition::Or(parts) => {
                Condition::Or(parts.iter().map(|p| p.map(attribute, value)).collect())
            }
            Condition::Not(inner) => Condition::Not(Box::new(inner.map(attribute, value))),
        }
    }
}

/// Operators allowed on a range/sort key.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeOp {
    Eq(Value),
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
    Between(Value, Value),
    BeginsWith(String),
}

impl RangeOp {
    pub fn values(&self) -> Vec<&Value> {
        match self {
            RangeOp::Eq(v) | RangeOp::Lt(v) | RangeOp::Le(v) | RangeOp::Gt(v) | RangeOp::Ge(v) => {
                vec![v]
            }
            RangeOp::Between(low, high) => vec![low, high],
            RangeOp::BeginsWith(_) => vec![],
        }
    }

    /// Equivalent row condition on `attribute`.
    pub fn to_condition(&self, attribute: &str) -> Condition {
        match self {
            RangeOp::Eq(v) => Condition::eq(attribute, v.clone()),
            RangeOp::Lt(v) => Condition::lt(attribute, v.clone()),
            RangeOp::Le(v) => Condition::le(attribute, v.clone()),
            RangeOp::Gt(v) => Condition::gt(attribute, v.clone()),
            RangeOp::Ge(v) => Condition::ge(attribute, v.clone()),
            RangeOp::Between(low, high) => Condition::between(attribute, low.clone(), high.clone()),
            RangeOp::BeginsWith(prefix) => Condition::begins_with(attribute, prefix.clone()),
        }
    }
}

/// One clause of a logical key condition.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyClause {
    pub property: String,
    pub op: RangeOp,
}

/// A logical key condition: equalities on hash properties plus at most one
/// non-equality clause on a range property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyCondition {
    pub clauses: Vec<KeyClause>,
}

impl KeyCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, property: impl Into<String>, op: RangeOp) -> Self {
        self.clauses.push(KeyClause {
            property: property.into(),
            op,
        });
        self
    }

    pub fn eq(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(property, RangeOp::Eq(value.into()))
    }

    pub fn begins_with(self, property: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.with(property, RangeOp::BeginsWith(prefix.into()))
    }

    pub fn between(
        self,
        property: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.with(property, RangeOp::Between(low.into(), high.into()))
    }

    pub fn lt(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(property, RangeOp::Lt(value.into()))
    }

    pub fn le(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(property, RangeOp::Le(value.into()))
    }

    pub fn gt(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(property, RangeOp::Gt(value.into()))
    }

    pub fn ge(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(property, RangeOp::Ge(value.into()))
    }

    pub fn clause(&self, property: &str) -> Option<&KeyClause> {
        self.clauses.iter().find(|c| c.property == property)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// A physical key condition as the store understands it: partition equality
/// and an optional sort-key operator.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryKey {
    pub partition_attribute: String,
    pub partition_value: Value,
    pub sort: Option<(String, RangeOp)>,
}

impl QueryKey {
    pub fn partition(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            partition_attribute: attribute.into(),
            partition_value: value.into(),
            sort: None,
        }
    }

    pub fn with_sort(mut self, attribute: impl Into<String>, op: RangeOp) -> Self {
        self.sort = Some((attribute.into(), op));
        self
    }
}

/// A native update clause: `SET`, `REMOVE`, `ADD` and `DELETE` actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpr {
    pub set: Vec<(String, Value)>,
    pub remove: Vec<String>,
    pub add: Vec<(String, Value)>,
    pub delete: Vec<(String, Value)>,
}

impl UpdateExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((attribute.into(), value.into()));
        self
    }

    pub fn remove(mut self, attribute: impl Into<String>) -> Self {
        self.remove.push(attribute.into());
        self
    }

    pub fn add(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add.push((attribute.into(), value.into()));
        self
    }

    pub fn delete(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.delete.push((attribute.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty() && self.add.is_empty() && self.delete.is_empty()
    }

    pub fn attributes(&self) -> Vec<&str> {
        self.set
            .iter()
            .map(|(a, _)| a.as_str())
            .chain(self.remove.iter().map(String::as_str))
            .chain(self.add.iter().map(|(a, _)| a.as_str()))
            .chain(self.delete.iter().map(|(a, _)| a.as_str()))
            .collect()
    }

    pub fn values(&self) -> Vec<&Value> {
        self.set
            .iter()
            .chain(self.add.iter())
            .chain(self.delete.iter())
            .map(|(_, v)| v)
            .collect()
    }

    pub fn map(
        &self,
        attribute: &impl Fn(&str) -> String,
        value: &impl Fn(&Value) -> Value,
    ) -> UpdateExpr {
        let pairs = |list: &[(String, Value)]| -> Vec<(String, Value)> {
            list.iter().map(|(a, v)| (attribute(a), value(v))).collect()
        };
        UpdateExpr {
            set: pairs(&self.set),
            remove: self.remove.iter().map(|a| attribute(a)).collect(),
            add: pairs(&self.add),
            delete: pairs(&self.delete),
        }
    }
}
