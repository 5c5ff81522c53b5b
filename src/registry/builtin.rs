//! Built-in comparators.
//!
//! | Comparator               | Priority  | Matches                                  |
//! |--------------------------|-----------|------------------------------------------|
//! | [`ProfileComparator`]    | profile   | its extraction type, collection columns  |
//! | [`GenericTableComparator`] | 10      | any payload with a collection of objects |
//! | [`KeyValueComparator`]   | `i32::MIN`| everything (registry fallback)           |

use std::collections::{BTreeMap, BTreeSet};

use crate::policy::{CompareRule, ExtractionProfile};
use crate::types::{FieldValue, Record, ShapeDescriptor, SnapshotResult};

use super::comparator::{kv, Comparator, ComparatorCapability, ComparisonView, PayloadSource};

/// Priority of [`GenericTableComparator`].
pub const GENERIC_TABLE_PRIORITY: i32 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Profile-driven
// ─────────────────────────────────────────────────────────────────────────────

/// Tabular comparator configured by an [`ExtractionProfile`].
#[derive(Debug, Clone)]
pub struct ProfileComparator {
    name: String,
    profile: ExtractionProfile,
    capability: ComparatorCapability,
}

impl ProfileComparator {
    /// Build a comparator from a profile.
    pub fn new(profile: ExtractionProfile) -> Self {
        let capability = ComparatorCapability {
            priority: profile.priority,
            extraction_types: vec![profile.extraction_type.clone()],
            required_collection: Some(profile.collection.clone()),
            required_columns: profile.required_columns(),
        };
        Self {
            name: format!("profile:{}", profile.extraction_type),
            profile,
            capability,
        }
    }

    /// The underlying profile.
    pub fn profile(&self) -> &ExtractionProfile {
        &self.profile
    }
}

impl Comparator for ProfileComparator {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> &ComparatorCapability {
        &self.capability
    }

    fn visualization_type(&self) -> &str {
        &self.profile.visualization
    }

    fn view(&self, _ordered: &[&SnapshotResult]) -> ComparisonView {
        ComparisonView {
            rule: self.profile.rule(),
            source: PayloadSource::Collection(self.profile.collection.clone()),
        }
    }

    fn wants_chart(&self) -> bool {
        self.profile.visualization.contains("chart")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generic table
// ─────────────────────────────────────────────────────────────────────────────

/// Compares the first collection of objects of any extraction type.
///
/// Columns are inferred across all snapshots. The key is a single column,
/// chosen in this order:
///
/// 1. an id-like column (`id`, `code`, `key`, or a `_id`/`_code`/`_key` suffix)
/// 2. a text column unique within every snapshot
/// 3. any column unique within every snapshot
/// 4. the first column
///
/// Remaining numeric columns are value fields; remaining text columns are
/// watched, so editing a free-text column modifies a record instead of
/// splitting it in two.
#[derive(Debug, Clone)]
pub struct GenericTableComparator {
    capability: ComparatorCapability,
}

impl GenericTableComparator {
    /// Create the comparator.
    pub fn new() -> Self {
        Self {
            capability: ComparatorCapability::any(GENERIC_TABLE_PRIORITY),
        }
    }

    fn infer_rule(collection: &str, ordered: &[&SnapshotResult]) -> CompareRule {
        let tables: Vec<Vec<Record>> = ordered.iter().map(|s| s.records(collection)).collect();

        // column -> all non-null values numeric so far
        let mut numeric: BTreeMap<String, bool> = BTreeMap::new();
        for record in tables.iter().flatten() {
            for (column, value) in record.iter() {
                let entry = numeric.entry(column.to_string()).or_insert(true);
                if let FieldValue::Text(_) = value {
                    *entry = false;
                }
            }
        }

        let columns: Vec<String> = numeric.keys().cloned().collect();
        let is_text = |column: &str| numeric.get(column).map_or(false, |numeric| !numeric);

        let key = columns
            .iter()
            .find(|c| is_id_like(c))
            .or_else(|| {
                columns
                    .iter()
                    .find(|c| is_text(c.as_str()) && unique_in_every(&tables, c))
            })
            .or_else(|| columns.iter().find(|c| unique_in_every(&tables, c)))
            .or_else(|| columns.first())
            .cloned();

        let (watched, values): (Vec<String>, Vec<String>) = columns
            .iter()
            .filter(|c| Some(*c) != key.as_ref())
            .cloned()
            .partition(|c| is_text(c.as_str()));

        CompareRule {
            key_fields: key.into_iter().collect(),
            value_fields: values,
            watched_fields: watched,
            category_field: None,
        }
    }
}

fn is_id_like(column: &str) -> bool {
    let column = column.trim().to_ascii_lowercase();
    matches!(column.as_str(), "id" | "code" | "key")
        || ["_id", "_code", "_key"].iter().any(|suffix| column.ends_with(suffix))
}

fn unique_in_every(tables: &[Vec<Record>], column: &str) -> bool {
    tables.iter().all(|records| {
        let mut seen = BTreeSet::new();
        records
            .iter()
            .all(|r| r.get(column).comparable_text().map_or(false, |v| seen.insert(v)))
    })
}

impl Default for GenericTableComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl Comparator for GenericTableComparator {
    fn name(&self) -> &str {
        "generic_table"
    }

    fn capability(&self) -> &ComparatorCapability {
        &self.capability
    }

    fn visualization_type(&self) -> &str {
        "table"
    }

    fn matches(&self, _extraction_type: &str, shape: &ShapeDescriptor) -> bool {
        shape.primary_collection().is_some()
    }

    fn view(&self, ordered: &[&SnapshotResult]) -> ComparisonView {
        let mut shape = ShapeDescriptor::default();
        for snapshot in ordered {
            shape.merge(&snapshot.shape());
        }

        match shape.primary_collection() {
            Some(collection) => ComparisonView {
                rule: Self::infer_rule(collection, ordered),
                source: PayloadSource::Collection(collection.to_string()),
            },
            None => KeyValueComparator::key_value_view(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Key/value fallback
// ─────────────────────────────────────────────────────────────────────────────

/// Fallback comparator: compares top-level scalars field by field.
///
/// Always matches, at the lowest priority, so resolution never fails.
#[derive(Debug, Clone)]
pub struct KeyValueComparator {
    capability: ComparatorCapability,
}

impl KeyValueComparator {
    /// Create the comparator.
    pub fn new() -> Self {
        Self {
            capability: ComparatorCapability::any(i32::MIN),
        }
    }

    fn key_value_view() -> ComparisonView {
        ComparisonView {
            rule: CompareRule {
                key_fields: vec![kv::FIELD.to_string()],
                value_fields: vec![kv::VALUE.to_string()],
                watched_fields: vec![kv::TEXT.to_string()],
                category_field: None,
            },
            source: PayloadSource::Scalars,
        }
    }
}

impl Default for KeyValueComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl Comparator for KeyValueComparator {
    fn name(&self) -> &str {
        "key_value"
    }

    fn capability(&self) -> &ComparatorCapability {
        &self.capability
    }

    fn visualization_type(&self) -> &str {
        "key_value"
    }

    fn matches(&self, _extraction_type: &str, _shape: &ShapeDescriptor) -> bool {
        true
    }

    fn view(&self, _ordered: &[&SnapshotResult]) -> ComparisonView {
        Self::key_value_view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ComparisonPolicy;
    use crate::registry::CompareContext;
    use crate::types::ChangeStatus;
    use serde_json::json;

    fn snap(id: &str, fields: serde_json::Value) -> SnapshotResult {
        let mut snapshot = SnapshotResult::ok(id, id, BTreeMap::new());
        if let serde_json::Value::Object(map) = fields {
            for (k, v) in map {
                snapshot = snapshot.with_field(k, v);
            }
        }
        snapshot
    }

    fn ctx(policy: &ComparisonPolicy) -> CompareContext<'_> {
        CompareContext {
            extraction_type: "test",
            policy,
        }
    }

    #[test]
    fn test_generic_infers_key_and_values() {
        let a = snap("a", json!({"rows": [{"name": "P1", "mw": 10.0}, {"name": "P2", "mw": 3.0}]}));
        let b = snap("b", json!({"rows": [{"name": "P1", "mw": 12.0}]}));

        let view = GenericTableComparator::new().view(&[&a, &b]);
        assert_eq!(view.rule.key_fields, vec!["name".to_string()]);
        assert_eq!(view.rule.value_fields, vec!["mw".to_string()]);
        assert_eq!(view.source, PayloadSource::Collection("rows".into()));
    }

    #[test]
    fn test_generic_numeric_table_keys_by_code() {
        let a = snap("a", json!({"rows": [{"code": 1, "mw": 10}]}));
        let b = snap("b", json!({"rows": [{"code": 1, "mw": 12}]}));

        let comparator = GenericTableComparator::new();
        let view = comparator.view(&[&a, &b]);
        assert_eq!(view.rule.key_fields, vec!["code".to_string()]);
        assert_eq!(view.rule.value_fields, vec!["mw".to_string()]);

        let policy = ComparisonPolicy::default();
        let response = comparator.compare(&a, &b, ctx(&policy));
        assert_eq!(response.stats.total_changes, 1);
        assert_eq!(response.stats.count(ChangeStatus::Modified), 1);
        assert_eq!(response.comparison_table.unwrap()[0].delta_abs, Some(2.0));
    }

    #[test]
    fn test_generic_free_text_column_is_watched() {
        let a = snap("a", json!({"rows": [
            {"plant": "P1", "status": "active", "mw": 10.0},
            {"plant": "P2", "status": "active", "mw": 3.0}
        ]}));
        let b = snap("b", json!({"rows": [
            {"plant": "P1", "status": "retired", "mw": 10.0},
            {"plant": "P2", "status": "active", "mw": 3.0}
        ]}));

        let comparator = GenericTableComparator::new();
        let view = comparator.view(&[&a, &b]);
        assert_eq!(view.rule.key_fields, vec!["plant".to_string()]);
        assert_eq!(view.rule.watched_fields, vec!["status".to_string()]);

        let policy = ComparisonPolicy::default();
        let response = comparator.compare(&a, &b, ctx(&policy));
        assert_eq!(response.stats.total_changes, 1);
        let table = response.comparison_table.unwrap();
        assert_eq!(table[0].status, ChangeStatus::Modified);
        assert_eq!(table[0].changed_fields, vec!["status".to_string()]);
    }

    #[test]
    fn test_generic_unique_numeric_column_without_text() {
        let a = snap("a", json!({"rows": [{"slot": 1, "mw": 5}, {"slot": 2, "mw": 5}]}));
        let view = GenericTableComparator::new().view(&[&a, &a]);
        assert_eq!(view.rule.key_fields, vec!["slot".to_string()]);
        assert_eq!(view.rule.value_fields, vec!["mw".to_string()]);
    }

    #[test]
    fn test_key_value_compares_scalars() {
        let a = snap("a", json!({"horizon": 60, "solver": "dual", "plants": [{"code": 1}]}));
        let b = snap(
            "b",
            json!({"horizon": 72, "solver": "primal", "plants": [{"code": 1}, {"code": 2}]}),
        );

        let policy = ComparisonPolicy::default();
        let response = KeyValueComparator::new().compare(&a, &b, ctx(&policy));

        assert!(response.is_compared());
        assert_eq!(response.comparator, "key_value");
        assert_eq!(response.stats.total_changes, 3);
        assert_eq!(response.stats.count(ChangeStatus::Modified), 3);

        let table = response.comparison_table.unwrap();
        assert_eq!(table[0].key, "horizon");
        assert_eq!(table[0].delta_abs, Some(12.0));
    }

    #[test]
    fn test_key_value_keeps_successive_text_changes() {
        let a = snap("a", json!({"solver": "dual"}));
        let b = snap("b", json!({"solver": "primal"}));
        let c = snap("c", json!({"solver": "simplex"}));

        let policy = ComparisonPolicy::default();
        let response = KeyValueComparator::new().compare_many(&[&a, &b, &c], ctx(&policy));

        assert_eq!(response.stats.total_changes, 2);
        assert_eq!(response.stats.duplicates_removed, 0);
    }

    #[test]
    fn test_profile_comparator_groups_and_charts() {
        let profile =
            ExtractionProfile::new("load_levels", "records", &["submarket", "level"], &["value"])
                .grouped_by("level")
            .with_visualization("table_with_chart");
        let comparator = ProfileComparator::new(profile);

        let a = snap("a", json!({"records": [
            {"submarket": "SE", "level": "HEAVY", "value": 100.0},
            {"submarket": "S", "level": "LIGHT", "value": 40.0}
        ]}));
        let b = snap("b", json!({"records": [
            {"submarket": "SE", "level": "HEAVY", "value": 90.0},
            {"submarket": "S", "level": "LIGHT", "value": 40.0}
        ]}));

        let policy = ComparisonPolicy::default();
        let response = comparator.compare(&a, &b, ctx(&policy));

        assert_eq!(response.comparator, "profile:load_levels");
        assert_eq!(response.visualization_type, "table_with_chart");
        let groups = response.grouped_by.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["HEAVY"][0].delta_pct, Some(-10.0));
        let chart = response.chart_series.unwrap();
        assert_eq!(chart.series.len(), 2);
    }
}
