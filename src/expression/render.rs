//! Rendering to native expression strings with `#name` / `:value` placeholders.

use std::collections::BTreeMap;

use crate::value::Value;

use super::{CompareOp, Condition, QueryKey, RangeOp, UpdateExpr};

/// A rendered expression plus its placeholder maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub expression: String,
    pub names: BTreeMap<String, String>,
    pub values: BTreeMap<String, Value>,
}

/// Allocates placeholders; shared when several expressions go into one request.
#[derive(Debug, Default)]
pub struct ExpressionWriter {
    names: BTreeMap<String, String>,
    values: BTreeMap<String, Value>,
}

impl ExpressionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder for an attribute name; the same name reuses its placeholder.
    pub fn name(&mut self, attribute: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, a)| a.as_str() == attribute) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.names.len());
        self.names.insert(placeholder.clone(), attribute.to_string());
        placeholder
    }

    pub fn value(&mut self, value: &Value) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value.clone());
        placeholder
    }

    pub fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Exists(a) => format!("attribute_exists({})", self.name(a)),
            Condition::NotExists(a) => format!("attribute_not_exists({})", self.name(a)),
            Condition::Compare {
                attribute,
                op,
                value,
            } => {
                let name = self.name(attribute);
                let value = self.value(value);
                format!("{} {} {}", name, operator(*op), value)
            }
            Condition::BeginsWith { attribute, prefix } => {
                let name = self.name(attribute);
                let value = self.value(&Value::String(prefix.clone()));
                format!("begins_with({}, {})", name, value)
            }
            Condition::Between {
                attribute,
                low,
                high,
            } => {
                let name = self.name(attribute);
                let low = self.value(low);
                let high = self.value(high);
                format!("{} BETWEEN {} AND {}", name, low, high)
            }
            Condition::In { attribute, values } => {
                let name = self.name(attribute);
                let values: Vec<String> = values.iter().map(|v| self.value(v)).collect();
                format!("{} IN ({})", name, values.join(", "))
            }
            Condition::And(parts) => self.join(parts, " AND "),
            Condition::Or(parts) => self.join(parts, " OR "),
            Condition::Not(inner) => format!("NOT ({})", self.condition(inner)),
        }
    }

    fn join(&mut self, parts: &[Condition], separator: &str) -> String {
        if parts.len() == 1 {
            return self.condition(&parts[0]);
        }
        let rendered: Vec<String> = parts
            .iter()
            .map(|p| format!("({})", self.condition(p)))
            .collect();
        rendered.join(separator)
    }

    pub fn key(&mut self, key: &QueryKey) -> String {
        let name = self.name(&key.partition_attribute);
        let value = self.value(&key.partition_value);
        let mut out = format!("{} = {}", name, value);
        if let Some((attribute, op)) = &key.sort {
            out.push_str(" AND ");
            out.push_str(&self.range(attribute, op));
        }
        out
    }

    fn range(&mut self, attribute: &str, op: &RangeOp) -> String {
        match op {
            RangeOp::BeginsWith(prefix) => {
                let name = self.name(attribute);
                let value = self.value(&Value::String(prefix.clone()));
                format!("begins_with({}, {})", name, value)
            }
            other => self.condition(&other.to_condition(attribute)),
        }
    }

    pub fn update(&mut self, update: &UpdateExpr) -> String {
        let mut sections = vec![];
        if !update.set.is_empty() {
            let parts: Vec<String> = update
                .set
                .iter()
                .map(|(a, v)| format!("{} = {}", self.name(a), self.value(v)))
                .collect();
            sections.push(format!("SET {}", parts.join(", ")));
        }
        if !update.remove.is_empty() {
            let parts: Vec<String> = update.remove.iter().map(|a| self.name(a)).collect();
            sections.push(format!("REMOVE {}", parts.join(", ")));
        }
        if !update.add.is_empty() {
            let parts: Vec<String> = update
                .add
                .iter()
                .map(|(a, v)| format!("{} {}", self.name(a), self.value(v)))
                .collect();
            sections.push(format!("ADD {}", parts.join(", ")));
        }
        if !update.delete.is_empty() {
            let parts: Vec<String> = update
                .delete
                .iter()
                .map(|(a, v)| format!("{} {}", self.name(a), self.value(v)))
                .collect();
            sections.push(format!("DELETE {}", parts.join(", ")));
        }
        sections.join(" ")
    }

    pub fn finish(self, expression: String) -> Rendered {
        Rendered {
            expression,
            names: self.names,
            values: self.values,
        }
    }
}

fn operator(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "<>",
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
    }
}

impl Condition {
    pub fn render(&self) -> Rendered {
        let mut writer = ExpressionWriter::new();
        let expression = writer.condition(self);
        writer.finish(expression)
    }
}

impl QueryKey {
    pub fn render(&self) -> Rendered {
        let mut writer = ExpressionWriter::new();
        let expression = writer.key(self);
        writer.finish(expression)
    }
}

impl UpdateExpr {
    pub fn render(&self) -> Rendered {
        let mut writer = ExpressionWriter::new();
        let expression = writer.update(self);
        writer.finish(expression)
    }
}
