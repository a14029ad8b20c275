//! Write planning.
//!
//! Every function here is pure: it takes generated representations and the
//! rows currently stored for an entity, and returns the tagged list of writes
//! that moves the store from one to the other. Conditions are already in
//! physical attribute names.

use std::collections::HashSet;

use crate::expression::{Condition, UpdateExpr};
use crate::key_codec::PrimaryKey;
use crate::representation::{row_key, Representation};
use crate::schema::{Schema, HASH_ATTRIBUTE, OBJVER_ATTRIBUTE, RANGE_ATTRIBUTE};
use crate::store::WriteOp;
use crate::value::{Item, Value};

/// One write in a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedWrite {
    /// Full-row put. `new_key` marks a key the entity did not hold before.
    Put {
        item: Item,
        new_key: bool,
        condition: Option<Condition>,
    },
    Update {
        key: PrimaryKey,
        update: UpdateExpr,
        condition: Option<Condition>,
    },
    Delete {
        key: PrimaryKey,
        condition: Option<Condition>,
    },
}

impl PlannedWrite {
    pub fn key(&self) -> Option<PrimaryKey> {
        match self {
            PlannedWrite::Put { item, .. } => row_key(item),
            PlannedWrite::Update { key, .. } | PlannedWrite::Delete { key, .. } => {
                Some(key.clone())
            }
        }
    }

    pub fn is_new_key(&self) -> bool {
        matches!(self, PlannedWrite::Put { new_key: true, .. })
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            PlannedWrite::Put { condition, .. }
            | PlannedWrite::Update { condition, .. }
            | PlannedWrite::Delete { condition, .. } => condition.as_ref(),
        }
    }

    pub fn into_op(self, table: &str) -> WriteOp {
        let table = table.to_string();
        match self {
            PlannedWrite::Put {
                item, condition, ..
            } => WriteOp::Put {
                table,
                item,
                condition,
            },
            PlannedWrite::Update {
                key,
                update,
                condition,
            } => WriteOp::Update {
                table,
                key,
                update,
                condition,
            },
            PlannedWrite::Delete { key, condition } => WriteOp::Delete {
                table,
                key,
                condition,
            },
        }
    }
}

/// Ordered writes for one logical operation on one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
    pub table: String,
    pub ops: Vec<PlannedWrite>,
}

impl WritePlan {
    fn new(schema: &Schema) -> Self {
        Self {
            table: schema.table_name().to_string(),
            ops: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Keys written by puts, existing and new.
    pub fn puts(&self) -> Vec<PrimaryKey> {
        self.ops
            .iter()
            .filter(|op| matches!(op, PlannedWrite::Put { .. }))
            .filter_map(PlannedWrite::key)
            .collect()
    }

    /// Keys the entity takes over in this plan.
    pub fn new_keys(&self) -> Vec<PrimaryKey> {
        self.ops
            .iter()
            .filter(|op| op.is_new_key())
            .filter_map(PlannedWrite::key)
            .collect()
    }

    pub fn deletes(&self) -> Vec<PrimaryKey> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                PlannedWrite::Delete { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        let table = self.table;
        self.ops.into_iter().map(|op| op.into_op(&table)).collect()
    }
}

/// `attribute_not_exists(hash) AND attribute_not_exists(range)`.
pub fn new_key_guard() -> Condition {
    Condition::not_exists(HASH_ATTRIBUTE).and(Condition::not_exists(RANGE_ATTRIBUTE))
}

/// `objver <= expected`, when a version is expected.
pub fn version_guard(expected: Option<u64>) -> Option<Condition> {
    expected.map(|version| Condition::le(OBJVER_ATTRIBUTE, version))
}

/// Puts for a brand new entity. Every row must claim a free key.
pub fn plan_put(schema: &Schema, rows: Vec<Representation>, caller: Option<&Condition>) -> WritePlan {
    let mut plan = WritePlan::new(schema);
    for row in rows {
        let condition = Condition::all(Some(new_key_guard()).into_iter().chain(caller.cloned()));
        plan.ops.push(PlannedWrite::Put {
            item: row.data,
            new_key: true,
            condition,
        });
    }
    plan
}

/// Diffs the desired rows against the current ones.
///
/// Rows in both are overwritten under the version guard and the caller
/// condition, rows only desired are put under the new-key guard, and rows only
/// current are deleted under the version guard.
pub fn plan_update(
    schema: &Schema,
    desired: Vec<Representation>,
    current: &[Item],
    expected_version: Option<u64>,
    caller: Option<&Condition>,
) -> WritePlan {
    let current_keys: HashSet<PrimaryKey> = current.iter().filter_map(row_key).collect();
    let desired_keys: HashSet<PrimaryKey> = desired.iter().map(Representation::key).collect();
    let existing_guard = || {
        Condition::all(
            version_guard(expected_version)
                .into_iter()
                .chain(caller.cloned()),
        )
    };

    let mut plan = WritePlan::new(schema);
    for row in desired {
        let new_key = !current_keys.contains(&row.key());
        let condition = if new_key {
            Some(new_key_guard())
        } else {
            existing_guard()
        };
        plan.ops.push(PlannedWrite::Put {
            item: row.data,
            new_key,
            condition,
        });
    }

    for key in current.iter().filter_map(row_key) {
        if !desired_keys.contains(&key) {
            plan.ops.push(PlannedWrite::Delete {
                key,
                condition: version_guard(expected_version),
            });
        }
    }
    plan
}

/// Fans one update clause out to every current row.
///
/// With a version expected, each row also gets `ADD objver 1` and the guard.
pub fn plan_apply(
    schema: &Schema,
    current: &[Item],
    update: &UpdateExpr,
    expected_version: Option<u64>,
    caller: Option<&Condition>,
) -> WritePlan {
    let update = match expected_version {
        Some(_) => update.clone().add(OBJVER_ATTRIBUTE, Value::from(1)),
        None => update.clone(),
    };

    let mut plan = WritePlan::new(schema);
    for key in current.iter().filter_map(row_key) {
        let condition = Condition::all(
            version_guard(expected_version)
                .into_iter()
                .chain(caller.cloned()),
        );
        plan.ops.push(PlannedWrite::Update {
            key,
            update: update.clone(),
            condition,
        });
    }
    plan
}

/// One delete per current row, each carrying the caller condition.
pub fn plan_delete(schema: &Schema, current: &[Item], caller: Option<&Condition>) -> WritePlan {
    let mut plan = WritePlan::new(schema);
    for key in current.iter().filter_map(row_key) {
        plan.ops.push(PlannedWrite::Delete {
            key,
            condition: caller.cloned(),
        });
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::representation::{generate, ANCHOR_RANGE};
    use crate::value::item_from_json;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::builder("users")
            .id("id")
            .hash("email")
            .column("name")
            .build()
            .unwrap()
    }

    fn rows(values: serde_json::Value, version: u64) -> Vec<Representation> {
        generate(&schema(), &item_from_json(values).unwrap(), version).unwrap()
    }

    fn stored(values: serde_json::Value, version: u64) -> Vec<Item> {
        rows(values, version).into_iter().map(|r| r.data).collect()
    }

    #[test]
    fn put_guards_every_row() {
        let caller = Condition::exists("name").negate();
        let plan = plan_put(&schema(), rows(json!({"id": 1, "email": "a"}), 0), Some(&caller));

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.new_keys().len(), 3);
        for op in &plan.ops {
            assert_eq!(
                op.condition(),
                Some(&new_key_guard().and(caller.clone()))
            );
        }
    }

    #[test]
    fn unchanged_keys_only_overwrite() {
        let current = stored(json!({"id": 1, "email": "a", "name": "A"}), 0);
        let desired = rows(json!({"id": 1, "email": "a", "name": "B"}), 1);
        let plan = plan_update(&schema(), desired, &current, Some(1), None);

        assert_eq!(plan.puts().len(), 3);
        assert!(plan.new_keys().is_empty());
        assert!(plan.deletes().is_empty());
        for op in &plan.ops {
            assert_eq!(op.condition(), Some(&Condition::le(OBJVER_ATTRIBUTE, 1u64)));
        }
    }

    #[test]
    fn changed_hash_moves_exactly_one_row() {
        let current = stored(json!({"id": 1, "email": "a"}), 0);
        let desired = rows(json!({"id": 1, "email": "b"}), 1);
        let plan = plan_update(&schema(), desired, &current, Some(1), None);

        assert_eq!(
            plan.new_keys(),
            vec![PrimaryKey::new("users#email#b", "$$range$$#1")]
        );
        assert_eq!(
            plan.deletes(),
            vec![PrimaryKey::new("users#email#a", "$$range$$#1")]
        );
        let new_row = plan.ops.iter().find(|op| op.is_new_key()).unwrap();
        assert_eq!(new_row.condition(), Some(&new_key_guard()));
    }

    #[test]
    fn caller_condition_only_on_existing_rows() {
        let current = stored(json!({"id": 1, "email": "a"}), 0);
        let desired = rows(json!({"id": 1, "email": "b"}), 1);
        let caller = Condition::eq("name", "A");
        let plan = plan_update(&schema(), desired, &current, None, Some(&caller));

        for op in &plan.ops {
            match op {
                PlannedWrite::Put { new_key: true, condition, .. } => {
                    assert_eq!(condition, &Some(new_key_guard()))
                }
                PlannedWrite::Put { condition, .. } => assert_eq!(condition, &Some(caller.clone())),
                PlannedWrite::Delete { condition, .. } => assert_eq!(condition, &None),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn apply_bumps_version_on_every_row() {
        let current = stored(json!({"id": 1, "email": "a"}), 2);
        let update = UpdateExpr::new().set("name", "Z");
        let plan = plan_apply(&schema(), &current, &update, Some(3), None);

        assert_eq!(plan.len(), 3);
        for op in &plan.ops {
            match op {
                PlannedWrite::Update { update, condition, .. } => {
                    assert_eq!(update.add, vec![(OBJVER_ATTRIBUTE.to_string(), Value::from(1))]);
                    assert_eq!(condition, &Some(Condition::le(OBJVER_ATTRIBUTE, 3u64)));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn apply_without_versioning_leaves_clause_alone() {
        let current = stored(json!({"id": 1}), 0);
        let update = UpdateExpr::new().set("name", "Z");
        let plan = plan_apply(&schema(), &current, &update, None, None);
        match &plan.ops[0] {
            PlannedWrite::Update { update: u, condition, .. } => {
                assert_eq!(u, &update);
                assert!(condition.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn delete_targets_each_row() {
        let current = stored(json!({"id": 1, "email": "a"}), 0);
        let plan = plan_delete(&schema(), &current, None);
        assert_eq!(plan.deletes().len(), 3);
        assert_eq!(plan.deletes()[0], PrimaryKey::new("users#1", ANCHOR_RANGE));
        assert!(plan_delete(&schema(), &[], None).is_empty());
    }

    #[test]
    fn into_ops_keeps_order_and_table() {
        let plan = plan_put(&schema(), rows(json!({"id": 1}), 0), None);
        let ops = plan.into_ops();
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.table() == "users"));
        assert_eq!(
            ops[0].key(HASH_ATTRIBUTE, RANGE_ATTRIBUTE),
            Some(PrimaryKey::new("users#1", ANCHOR_RANGE))
        );
    }
}
