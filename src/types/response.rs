//! The comparison response contract handed to the presentation layer.
//!
//! Every request ends in a [`ComparisonResponse`], including total failure:
//! callers always get the same shape, with [`ComparisonOutcome`] and `error`
//! explaining what happened.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::change::{Change, ChangeSet, ChangeStatus, TransitionSummary};
use crate::canonical::canonical_hash_hex;
use crate::DECK_DIFF_SCHEMA_VERSION;

/// Minimum number of successful snapshots a comparison needs.
pub const MIN_SNAPSHOTS: usize = 2;

/// How the request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    /// At least two snapshots were compared.
    Compared,
    /// Fewer than two snapshots were available after fetching.
    InsufficientSnapshots {
        /// Snapshots that were fetched successfully.
        successful: usize,
        /// Snapshots required.
        required: usize,
    },
}

/// A snapshot that could not be used, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFailure {
    /// Snapshot id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Failure reason.
    pub reason: String,
}

/// Flattened, presentation-ready view of one [`Change`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRecord {
    /// Stable fingerprint of the change identity.
    pub change_id: String,
    /// Key rendered as a single string.
    pub key: String,
    /// Key rendered part by part.
    pub key_parts: Vec<String>,
    /// Kind of change.
    pub status: ChangeStatus,
    /// Category, when grouped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Earlier primary value.
    pub before: Option<f64>,
    /// Later primary value.
    pub after: Option<f64>,
    /// Absolute change.
    pub delta_abs: Option<f64>,
    /// Relative change in percent.
    pub delta_pct: Option<f64>,
    /// Ranking magnitude.
    pub magnitude: f64,
    /// Fields that differed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    /// Earlier snapshot of the originating transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_snapshot: Option<String>,
    /// Later snapshot of the originating transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_snapshot: Option<String>,
}

impl From<&Change> for RowRecord {
    fn from(change: &Change) -> Self {
        Self {
            change_id: canonical_hash_hex(&change.identity(&change.changed_fields)),
            key: change.key.to_string(),
            key_parts: change.key.display_parts(),
            status: change.status,
            category: change.category.clone(),
            before: change.before,
            after: change.after,
            delta_abs: change.delta_abs,
            delta_pct: change.delta_pct,
            magnitude: change.magnitude,
            changed_fields: change.changed_fields.clone(),
            from_snapshot: change.origin.as_ref().map(|o| o.from_snapshot.clone()),
            to_snapshot: change.origin.as_ref().map(|o| o.to_snapshot.clone()),
        }
    }
}

/// Chart kind suggested to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// Two snapshots: one bar per series and snapshot.
    Bar,
    /// Three or more snapshots: one line per series.
    Line,
}

/// One named series of a chart. `values` aligns with [`ChartSpec::x_axis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    /// Series label (category or field name).
    pub name: String,
    /// One value per snapshot; `None` where the snapshot had no data.
    pub values: Vec<Option<f64>>,
}

/// Chart-ready series across the ordered snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    /// Suggested chart kind.
    pub kind: ChartKind,
    /// Value field the series aggregate.
    pub value_field: String,
    /// Snapshot display names, in comparison order.
    pub x_axis: Vec<String>,
    /// Series in name order.
    pub series: Vec<ChartSeries>,
}

/// Summary statistics, always computed from the final (deduplicated) set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStats {
    /// Number of distinct changes.
    pub total_changes: usize,
    /// Changes per status; every status is present, possibly with zero.
    pub counts_by_status: BTreeMap<String, usize>,
    /// Changes per category, when the comparator groups.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub counts_by_category: BTreeMap<String, usize>,
    /// Smallest magnitude (0 when empty).
    pub magnitude_min: f64,
    /// Largest magnitude (0 when empty).
    pub magnitude_max: f64,
    /// Mean magnitude (0 when empty).
    pub magnitude_mean: f64,
    /// Duplicate keys found while indexing.
    pub key_collisions: usize,
    /// Changes dropped as cross-transition duplicates.
    pub duplicates_removed: usize,
}

impl ChangeStats {
    /// Statistics of an empty change set.
    pub fn empty() -> Self {
        Self::compute(&[], 0, 0)
    }

    /// Compute statistics over a change set.
    pub fn compute(changes: &[Change], key_collisions: usize, duplicates_removed: usize) -> Self {
        let mut counts_by_status: BTreeMap<String, usize> = ChangeStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut counts_by_category: BTreeMap<String, usize> = BTreeMap::new();

        for change in changes {
            *counts_by_status
                .entry(change.status.as_str().to_string())
                .or_insert(0) += 1;
            if let Some(category) = &change.category {
                *counts_by_category.entry(category.clone()).or_insert(0) += 1;
            }
        }

        let (min, max, sum) = changes.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), c| (min.min(c.magnitude), max.max(c.magnitude), sum + c.magnitude),
        );

        let (magnitude_min, magnitude_max, magnitude_mean) = if changes.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (min, max, sum / changes.len() as f64)
        };

        Self {
            total_changes: changes.len(),
            counts_by_status,
            counts_by_category,
            magnitude_min,
            magnitude_max,
            magnitude_mean,
            key_collisions,
            duplicates_removed,
        }
    }

    /// Count for one status.
    pub fn count(&self, status: ChangeStatus) -> usize {
        self.counts_by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

/// The stable response contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResponse {
    /// Fingerprint of the response content (excluding itself).
    pub comparison_id: String,
    /// Schema version of this contract.
    pub schema_version: String,
    /// Extraction type that was compared.
    pub extraction_type: String,
    /// Name of the comparator that produced the content.
    pub comparator: String,
    /// Renderer hint chosen by the comparator.
    pub visualization_type: String,
    /// How the request ended.
    pub outcome: ComparisonOutcome,
    /// Ranked, flattened changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_table: Option<Vec<RowRecord>>,
    /// Series across snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_series: Option<ChartSpec>,
    /// Changes grouped by category; each group keeps the global ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_by: Option<BTreeMap<String, ChangeSet>>,
    /// Summary statistics.
    pub stats: ChangeStats,
    /// Display names of the compared snapshots, in comparison order.
    pub snapshot_names: Vec<String>,
    /// More than two snapshots were compared.
    pub is_multi_snapshot: bool,
    /// Per-transition counters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionSummary>,
    /// Snapshots that could not be used.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_snapshots: Vec<SnapshotFailure>,
    /// A deadline cut some fetches short.
    pub incomplete: bool,
    /// Explanation when the outcome is not a full comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Hash of the comparison policy parameters in effect.
    pub policy_params_hash: String,
}

impl ComparisonResponse {
    /// A response with no content, for the given outcome.
    pub fn empty(
        extraction_type: impl Into<String>,
        comparator: impl Into<String>,
        visualization_type: impl Into<String>,
        outcome: ComparisonOutcome,
    ) -> Self {
        Self {
            comparison_id: String::new(),
            schema_version: DECK_DIFF_SCHEMA_VERSION.to_string(),
            extraction_type: extraction_type.into(),
            comparator: comparator.into(),
            visualization_type: visualization_type.into(),
            outcome,
            comparison_table: None,
            chart_series: None,
            grouped_by: None,
            stats: ChangeStats::empty(),
            snapshot_names: Vec::new(),
            is_multi_snapshot: false,
            transitions: Vec::new(),
            failed_snapshots: Vec::new(),
            incomplete: false,
            error: None,
            policy_params_hash: String::new(),
        }
    }

    /// Explicit "insufficient data" response.
    pub fn insufficient(extraction_type: impl Into<String>, successful: usize) -> Self {
        let mut response = Self::empty(
            extraction_type,
            "none",
            "message",
            ComparisonOutcome::InsufficientSnapshots {
                successful,
                required: MIN_SNAPSHOTS,
            },
        );
        response.error = Some(format!(
            "comparison needs at least {} successful snapshots, got {}",
            MIN_SNAPSHOTS, successful
        ));
        response
    }

    /// Whether the response holds an actual comparison.
    pub fn is_compared(&self) -> bool {
        self.outcome == ComparisonOutcome::Compared
    }

    /// Recompute `comparison_id` from the current content.
    pub fn seal(mut self) -> Self {
        self.comparison_id = String::new();
        self.comparison_id = canonical_hash_hex(&self);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComparisonKey, Record};

    #[test]
    fn test_stats_of_empty_set() {
        let stats = ChangeStats::empty();
        assert_eq!(stats.total_changes, 0);
        assert_eq!(stats.count(ChangeStatus::Added), 0);
        assert_eq!(stats.counts_by_status.len(), 3);
        assert_eq!(stats.magnitude_mean, 0.0);
    }

    #[test]
    fn test_stats_counts_and_magnitudes() {
        let changes = vec![
            Change::added(ComparisonKey::text("a"), Some(6.0), Record::new())
                .with_category(Some("HEAVY".into())),
            Change::removed(ComparisonKey::text("b"), Some(2.0), Record::new())
                .with_category(Some("LIGHT".into())),
            Change::added(ComparisonKey::text("c"), Some(1.0), Record::new())
                .with_category(Some("HEAVY".into())),
        ];
        let stats = ChangeStats::compute(&changes, 1, 0);

        assert_eq!(stats.total_changes, 3);
        assert_eq!(stats.count(ChangeStatus::Added), 2);
        assert_eq!(stats.count(ChangeStatus::Removed), 1);
        assert_eq!(stats.count(ChangeStatus::Modified), 0);
        assert_eq!(stats.counts_by_category["HEAVY"], 2);
        assert_eq!(stats.magnitude_min, 1.0);
        assert_eq!(stats.magnitude_max, 6.0);
        assert_eq!(stats.magnitude_mean, 3.0);
        assert_eq!(stats.key_collisions, 1);
    }

    #[test]
    fn test_insufficient_response_is_well_formed() {
        let response = ComparisonResponse::insufficient("plant_capacity", 1).seal();

        assert!(!response.is_compared());
        assert!(response.error.is_some());
        assert_eq!(response.comparison_id.len(), 16);
        assert!(serde_json::to_string(&response).is_ok());
    }

    #[test]
    fn test_seal_is_deterministic() {
        let a = ComparisonResponse::insufficient("x", 0).seal();
        let b = ComparisonResponse::insufficient("x", 0).seal();
        assert_eq!(a.comparison_id, b.comparison_id);
    }
}
