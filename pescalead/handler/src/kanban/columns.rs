//! Synchronization of the columns of a funnel with the list sent by the
//! board editor.

use std::collections::{BTreeSet, HashMap};

use crate::api::models::kanban::requests::ColumnUpdate;
use crate::database::entries::kanban::ColumnEntry;

/// Final title and position of a kept column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedUpdate {
    /// Column id.
    pub id: String,
    /// Title.
    pub title: String,
    /// Free position at or after the wanted one.
    pub position: i64,
}

/// Title and position of a new column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedInsert {
    /// Title.
    pub title: String,
    /// Free position at or after the wanted one.
    pub position: i64,
}

/// Changes that bring the stored columns in line with the wanted list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnPlan {
    /// Stored columns missing from the list.
    pub delete: Vec<String>,
    /// Listed columns that exist, in list order.
    pub update: Vec<PlannedUpdate>,
    /// Listed columns that do not exist, in list order.
    pub insert: Vec<PlannedInsert>,
}

impl ColumnPlan {
    /// Positions never collide: deleted columns free their slot, each kept
    /// column frees its old slot before taking the first free one at or
    /// after the wanted position, then new columns do the same.
    pub fn new(existing: &[ColumnEntry], wanted: &[ColumnUpdate]) -> Self {
        let stored: HashMap<&str, i64> = existing
            .iter()
            .map(|column| (column.id.as_str(), column.position))
            .collect();
        let is_stored = |column: &ColumnUpdate| {
            column
                .id
                .as_deref()
                .is_some_and(|id| stored.contains_key(id))
        };

        let delete: Vec<String> = existing
            .iter()
            .filter(|column| {
                !wanted
                    .iter()
                    .any(|update| update.id.as_deref() == Some(column.id.as_str()))
            })
            .map(|column| column.id.clone())
            .collect();

        let mut taken: BTreeSet<i64> = existing
            .iter()
            .filter(|column| !delete.contains(&column.id))
            .map(|column| column.position)
            .collect();

        let mut update = Vec::new();
        for column in wanted.iter().filter(|column| is_stored(column)) {
            let id = column.id.clone().unwrap_or_default();
            if let Some(old) = stored.get(id.as_str()) {
                taken.remove(old);
            }
            let position = free_slot(&taken, column.position);
            taken.insert(position);
            update.push(PlannedUpdate {
                id,
                title: column.title.clone(),
                position,
            });
        }

        let mut insert = Vec::new();
        for column in wanted.iter().filter(|column| !is_stored(column)) {
            let position = free_slot(&taken, column.position);
            taken.insert(position);
            insert.push(PlannedInsert {
                title: column.title.clone(),
                position,
            });
        }

        Self { delete, update, insert }
    }
}

/// First free position at or after `wanted`, falling back to the nearest one
/// below it once the top of the range is taken.
fn free_slot(taken: &BTreeSet<i64>, wanted: i64) -> i64 {
    (wanted..=i64::MAX)
        .chain((i64::MIN..wanted).rev())
        .find(|position| !taken.contains(position))
        .unwrap_or(wanted)
}
