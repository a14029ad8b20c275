//! Direct evaluation of expressions against an item.

use std::cmp::Ordering;

use crate::value::{Item, Value};

use super::{CompareOp, Condition, RangeOp, UpdateExpr};

impl Condition {
    /// Evaluates against `item`. A missing row is an empty item.
    pub fn evaluate(&self, item: &Item) -> bool {
        match self {
            Condition::Exists(a) => item.contains_key(a),
            Condition::NotExists(a) => !item.contains_key(a),
            Condition::Compare {
                attribute,
                op,
                value,
            } => match item.get(attribute) {
                Some(actual) => compare(actual, *op, value),
                None => *op == CompareOp::Ne,
            },
            Condition::BeginsWith { attribute, prefix } => item
                .get(attribute)
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Condition::Between {
                attribute,
                low,
                high,
            } => item.get(attribute).is_some_and(|actual| {
                compare(actual, CompareOp::Ge, low) && compare(actual, CompareOp::Le, high)
            }),
            Condition::In { attribute, values } => item
                .get(attribute)
                .is_some_and(|actual| values.iter().any(|v| v == actual)),
            Condition::And(parts) => parts.iter().all(|p| p.evaluate(item)),
            Condition::Or(parts) => parts.iter().any(|p| p.evaluate(item)),
            Condition::Not(inner) => !inner.evaluate(item),
        }
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        CompareOp::Lt => actual.compare(expected) == Some(Ordering::Less),
        CompareOp::Le => matches!(
            actual.compare(expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Gt => actual.compare(expected) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            actual.compare(expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

impl RangeOp {
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self {
            RangeOp::Eq(v) => compare(actual, CompareOp::Eq, v),
            RangeOp::Lt(v) => compare(actual, CompareOp::Lt, v),
            RangeOp::Le(v) => compare(actual, CompareOp::Le, v),
            RangeOp::Gt(v) => compare(actual, CompareOp::Gt, v),
            RangeOp::Ge(v) => compare(actual, CompareOp::Ge, v),
            RangeOp::Between(low, high) => {
                compare(actual, CompareOp::Ge, low) && compare(actual, CompareOp::Le, high)
            }
            RangeOp::BeginsWith(prefix) => actual
                .as_str()
                .is_some_and(|s| s.starts_with(prefix.as_str())),
        }
    }
}

impl UpdateExpr {
    /// Applies every action to `item` in SET, REMOVE, ADD, DELETE order.
    pub fn apply_to(&self, item: &mut Item) -> Result<(), String> {
        for (attribute, value) in &self.set {
            item.insert(attribute.clone(), value.clone());
        }
        for attribute in &self.remove {
            item.remove(attribute);
        }
        for (attribute, value) in &self.add {
            let merged = match (item.get(attribute), value) {
                (None, v @ (Value::Number(_) | Value::StringSet(_))) => v.clone(),
                (Some(Value::Number(a)), Value::Number(b)) => Value::Number(a + b),
                (Some(Value::StringSet(a)), Value::StringSet(b)) => {
                    Value::StringSet(a.union(b).cloned().collect())
                }
                _ => return Err(format!("ADD type mismatch on `{}`", attribute)),
            };
            item.insert(attribute.clone(), merged);
        }
        for (attribute, value) in &self.delete {
            match (item.get(attribute), value) {
                (None, Value::StringSet(_)) => {}
                (Some(Value::StringSet(a)), Value::StringSet(b)) => {
                    let remaining: std::collections::BTreeSet<String> =
                        a.difference(b).cloned().collect();
                    if remaining.is_empty() {
                        item.remove(attribute);
                    } else {
                        item.insert(attribute.clone(), Value::StringSet(remaining));
                    }
                }
                _ => return Err(format!("DELETE type mismatch on `{}`", attribute)),
            }
        }
        Ok(())
    }
}
