//! Funnel statistics: the full computation over the active leads and the
//! incremental upkeep of the denormalized `funnel_stats` row.

use crate::api::models::kanban::{ColumnStats, FunnelStats};
use crate::database::entries::kanban::{ColumnEntry, ColumnStatsEntry, FunnelStatsEntry, LeadEntry};

use super::HIGH_PRIORITY;

fn is_high(priority: Option<&str>) -> bool {
    priority == Some(HIGH_PRIORITY)
}

/// Statistics over the active leads of a funnel. `columns` must be sorted by
/// position; the last one counts as converted.
pub fn compute(columns: &[ColumnEntry], leads: &[LeadEntry]) -> (FunnelStats, FunnelStatsEntry) {
    let total_leads = leads.len() as i64;
    let total_value: f64 = leads.iter().filter_map(|lead| lead.deal_value).sum();
    let high_priority_count = leads
        .iter()
        .filter(|lead| is_high(lead.priority.as_deref()))
        .count() as i64;

    let per_column = |column: &ColumnEntry| {
        let in_column = leads
            .iter()
            .filter(|lead| lead.column_id.as_deref() == Some(column.id.as_str()));
        let (count, value) = in_column.fold((0i64, 0f64), |(count, value), lead| {
            (count + 1, value + lead.deal_value.unwrap_or_default())
        });
        ColumnStatsEntry { count, total_value: value }
    };

    let mut entry = FunnelStatsEntry {
        total_leads,
        total_value,
        high_priority_count,
        ..Default::default()
    };
    let mut leads_by_column = Vec::with_capacity(columns.len());
    for column in columns {
        let counters = per_column(column);
        entry.column_stats.insert(column.id.clone(), counters);
        leads_by_column.push(ColumnStats {
            column_id: column.id.clone(),
            column_title: column.title.clone(),
            count: counters.count,
            value: counters.total_value,
        });
    }

    let converted = columns
        .last()
        .and_then(|column| entry.column_stats.get(&column.id))
        .map(|counters| counters.count)
        .unwrap_or_default();
    let conversion_rate = if total_leads > 0 {
        let rate = converted as f64 / total_leads as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    } else {
        0.0
    };

    let stats = FunnelStats {
        total_leads,
        total_value,
        high_priority_count,
        active_leads: total_leads,
        conversion_rate,
        leads_by_column,
    };
    (stats, entry)
}

/// A lead was created in `column_id`.
pub fn on_create(stats: &mut FunnelStatsEntry, column_id: &str, value: f64, priority: Option<&str>) {
    let column = stats.column_stats.entry(column_id.to_string()).or_default();
    column.count += 1;
    column.total_value += value;
    stats.total_leads += 1;
    stats.total_value += value;
    if is_high(priority) {
        stats.high_priority_count += 1;
    }
}

/// The value or the priority of a lead in `column_id` changed.
pub fn on_update(
    stats: &mut FunnelStatsEntry,
    column_id: &str,
    (old_value, new_value): (f64, f64),
    (old_priority, new_priority): (Option<&str>, Option<&str>),
) {
    let delta = new_value - old_value;
    if let Some(column) = stats.column_stats.get_mut(column_id) {
        column.total_value += delta;
    }
    stats.total_value += delta;
    match (is_high(old_priority), is_high(new_priority)) {
        (true, false) => stats.high_priority_count -= 1,
        (false, true) => stats.high_priority_count += 1,
        _ => {}
    }
}

/// A lead worth `value` moved between columns. Funnel totals do not change.
pub fn on_move(stats: &mut FunnelStatsEntry, from: Option<&str>, to: &str, value: f64) {
    if let Some(column) = from.and_then(|from| stats.column_stats.get_mut(from)) {
        column.count -= 1;
        column.total_value -= value;
    }
    let column = stats.column_stats.entry(to.to_string()).or_default();
    column.count += 1;
    column.total_value += value;
}

/// A lead was deleted from `column_id`.
pub fn on_delete(stats: &mut FunnelStatsEntry, column_id: Option<&str>, value: f64, priority: Option<&str>) {
    if let Some(column) = column_id.and_then(|id| stats.column_stats.get_mut(id)) {
        column.count -= 1;
        column.total_value -= value;
    }
    stats.total_leads -= 1;
    stats.total_value -= value;
    if is_high(priority) {
        stats.high_priority_count -= 1;
    }
}
