//! Chart series across ordered snapshots.

use std::collections::BTreeMap;

use crate::policy::CompareRule;
use crate::types::{ChartKind, ChartSeries, ChartSpec, Record, SnapshotResult};

/// Series name used when the rule has no category field.
pub const TOTAL_SERIES: &str = "total";

/// Build chart series: per category, the sum of the primary value field in
/// each snapshot.
///
/// Returns `None` when the rule has no value field or no snapshot carries a
/// numeric primary value.
pub fn chart_series<F>(
    ordered: &[&SnapshotResult],
    rule: &CompareRule,
    records_of: F,
) -> Option<ChartSpec>
where
    F: Fn(&SnapshotResult) -> Vec<Record>,
{
    let value_field = rule.value_fields.first()?;
    let width = ordered.len();
    let mut sums: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();

    for (position, snapshot) in ordered.iter().enumerate() {
        for record in records_of(*snapshot) {
            let Some(value) = rule.primary_value(&record) else {
                continue;
            };
            let name = if rule.category_field.is_some() {
                rule.category_of(&record).unwrap_or_else(|| "-".to_string())
            } else {
                TOTAL_SERIES.to_string()
            };
            let slot = &mut sums.entry(name).or_insert_with(|| vec![None; width])[position];
            *slot = Some(slot.unwrap_or(0.0) + value);
        }
    }

    if sums.is_empty() {
        return None;
    }

    Some(ChartSpec {
        kind: if width > 2 { ChartKind::Line } else { ChartKind::Bar },
        value_field: value_field.clone(),
        x_axis: ordered.iter().map(|s| s.display_name.clone()).collect(),
        series: sums
            .into_iter()
            .map(|(name, values)| ChartSeries { name, values })
            .collect(),
    })
}
