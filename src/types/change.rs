//! Changes between snapshots.
//!
//! Unchanged keys are never materialized: a [`ChangeSet`] only ever holds
//! added, removed, or modified records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::key::ComparisonKey;
use super::value::{FieldValue, Record};
use crate::canonical::quantize;

/// Kind of change observed for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// Key only present in the later snapshot.
    Added,
    /// Key present in both, with a relevant difference.
    Modified,
    /// Key only present in the earlier snapshot.
    Removed,
}

impl ChangeStatus {
    /// All statuses in default ranking order.
    pub const ALL: [ChangeStatus; 3] = [Self::Added, Self::Modified, Self::Removed];

    /// Parse a status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "added" => Some(Self::Added),
            "modified" => Some(Self::Modified),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The transition a change was first observed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOrigin {
    /// Position of the transition in the ordered sequence.
    pub transition: usize,
    /// Earlier snapshot id.
    pub from_snapshot: String,
    /// Later snapshot id.
    pub to_snapshot: String,
}

/// One keyed difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Record identity.
    pub key: ComparisonKey,
    /// Kind of change.
    pub status: ChangeStatus,
    /// Primary value in the earlier snapshot.
    pub before: Option<f64>,
    /// Primary value in the later snapshot.
    pub after: Option<f64>,
    /// Absolute size of the change; the ranking criterion.
    pub magnitude: f64,
    /// `after - before` when both sides are numeric.
    pub delta_abs: Option<f64>,
    /// `delta_abs / |before| * 100`, or `0` when `before` is zero.
    pub delta_pct: Option<f64>,
    /// Secondary grouping value (e.g. load level), when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Fields whose difference triggered a `Modified` status.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    /// Full earlier record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_record: Option<Record>,
    /// Full later record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_record: Option<Record>,
    /// Originating transition, set during aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ChangeOrigin>,
}

impl Change {
    /// A key that only exists in the later snapshot.
    pub fn added(key: ComparisonKey, after: Option<f64>, record: Record) -> Self {
        Self {
            key,
            status: ChangeStatus::Added,
            before: None,
            after,
            magnitude: after.map(f64::abs).unwrap_or(0.0),
            delta_abs: None,
            delta_pct: None,
            category: None,
            changed_fields: Vec::new(),
            before_record: None,
            after_record: Some(record),
            origin: None,
        }
    }

    /// A key that only exists in the earlier snapshot.
    pub fn removed(key: ComparisonKey, before: Option<f64>, record: Record) -> Self {
        Self {
            key,
            status: ChangeStatus::Removed,
            before,
            after: None,
            magnitude: before.map(f64::abs).unwrap_or(0.0),
            delta_abs: None,
            delta_pct: None,
            category: None,
            changed_fields: Vec::new(),
            before_record: Some(record),
            after_record: None,
            origin: None,
        }
    }

    /// A key present on both sides with a relevant difference.
    ///
    /// When only one side has a numeric primary value the magnitude is that
    /// value's absolute size, mirroring added/removed.
    pub fn modified(
        key: ComparisonKey,
        before: Option<f64>,
        after: Option<f64>,
        changed_fields: Vec<String>,
        before_record: Record,
        after_record: Record,
    ) -> Self {
        let (magnitude, delta_abs, delta_pct) = match (before, after) {
            (Some(a), Some(b)) => {
                let delta = b - a;
                let pct = if a != 0.0 { delta / a.abs() * 100.0 } else { 0.0 };
                (delta.abs(), Some(delta), Some(pct))
            }
            (Some(a), None) => (a.abs(), None, None),
            (None, Some(b)) => (b.abs(), None, None),
            (None, None) => (0.0, None, None),
        };

        Self {
            key,
            status: ChangeStatus::Modified,
            before,
            after,
            magnitude,
            delta_abs,
            delta_pct,
            category: None,
            changed_fields,
            before_record: Some(before_record),
            after_record: Some(after_record),
            origin: None,
        }
    }

    /// Attach a category.
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    /// Attach the originating transition.
    pub fn with_origin(mut self, origin: ChangeOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Normalized identity used to detect the same change re-observed in
    /// several transitions.
    ///
    /// `fields` are the compared fields (value and watched). Their values on
    /// both sides take part, so two modifications of one key that differ
    /// only in a watched field keep distinct identities.
    pub fn identity(&self, fields: &[String]) -> ChangeIdentity {
        let side = |record: &Option<Record>| -> Vec<Option<String>> {
            fields
                .iter()
                .map(|f| record.as_ref().and_then(|r| identity_text(r.get(f))))
                .collect()
        };

        ChangeIdentity {
            key: self.key.normalized(),
            status: self.status,
            before: self.before.map(quantize),
            after: self.after.map(quantize),
            before_fields: side(&self.before_record),
            after_fields: side(&self.after_record),
        }
    }
}

fn identity_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Null => None,
        FieldValue::Number(n) => Some(quantize(*n).to_string()),
        FieldValue::Text(s) => Some(s.trim().to_string()),
    }
}

/// Deduplication identity of a [`Change`]: normalized key parts, status,
/// quantized primary values, and the compared field values on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChangeIdentity {
    key: Vec<String>,
    status: ChangeStatus,
    before: Option<i64>,
    after: Option<i64>,
    before_fields: Vec<Option<String>>,
    after_fields: Vec<Option<String>>,
}

/// Ordered sequence of changes. Ranked sets are sorted by magnitude,
/// descending.
pub type ChangeSet = Vec<Change>;

/// One directed comparison between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    /// Earlier snapshot id.
    pub from_snapshot: String,
    /// Later snapshot id.
    pub to_snapshot: String,
    /// Ranked changes of this pair.
    pub change_set: ChangeSet,
}

impl Transition {
    /// Compact summary for the response.
    pub fn summary(&self) -> TransitionSummary {
        let mut counts_by_status = BTreeMap::new();
        for status in ChangeStatus::ALL {
            counts_by_status.insert(status.as_str().to_string(), 0);
        }
        for change in &self.change_set {
            *counts_by_status
                .entry(change.status.as_str().to_string())
                .or_insert(0) += 1;
        }

        TransitionSummary {
            from_snapshot: self.from_snapshot.clone(),
            to_snapshot: self.to_snapshot.clone(),
            total_changes: self.change_set.len(),
            counts_by_status,
        }
    }
}

/// Per-transition counters, reported alongside the aggregated result.
///
/// These are informational; aggregated statistics are never derived by
/// summing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionSummary {
    /// Earlier snapshot id.
    pub from_snapshot: String,
    /// Later snapshot id.
    pub to_snapshot: String,
    /// Changes in this transition before deduplication.
    pub total_changes: usize,
    /// Changes per status in this transition.
    pub counts_by_status: BTreeMap<String, usize>,
}

/// Union of all transitions after deduplication, ranked globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedChangeSet {
    /// Per-pair results in sequence order.
    pub transitions: Vec<Transition>,
    /// Deduplicated, globally ranked changes.
    pub changes: ChangeSet,
    /// Number of changes dropped as duplicates.
    pub duplicates_removed: usize,
    /// Duplicate keys found while indexing, summed over all snapshots.
    pub key_collisions: usize,
}

impl AggregatedChangeSet {
    /// Total number of distinct changes.
    pub fn total_changes(&self) -> usize {
        self.changes.len()
    }

    /// Whether no change survived.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_rules() {
        let key = ComparisonKey::text("X");

        let added = Change::added(key.clone(), Some(-5.0), Record::new());
        assert_eq!(added.magnitude, 5.0);

        let removed = Change::removed(key.clone(), Some(3.0), Record::new());
        assert_eq!(removed.magnitude, 3.0);

        let modified =
            Change::modified(key, Some(100.0), Some(90.0), vec![], Record::new(), Record::new());
        assert_eq!(modified.magnitude, 10.0);
        assert_eq!(modified.delta_abs, Some(-10.0));
        assert_eq!(modified.delta_pct, Some(-10.0));
    }

    #[test]
    fn test_zero_before_gives_zero_pct() {
        let key = ComparisonKey::text("X");
        let change =
            Change::modified(key, Some(0.0), Some(4.0), vec![], Record::new(), Record::new());
        assert_eq!(change.delta_abs, Some(4.0));
        assert_eq!(change.delta_pct, Some(0.0));
    }

    #[test]
    fn test_identity_ignores_key_case_and_origin() {
        let a = Change::added(ComparisonKey::text(" plant a"), Some(1.0), Record::new());
        let b = Change::added(ComparisonKey::text("PLANT A"), Some(1.0), Record::new())
            .with_origin(ChangeOrigin {
                transition: 1,
                from_snapshot: "d2".into(),
                to_snapshot: "d3".into(),
            });

        assert_eq!(a.identity(&[]), b.identity(&[]));

        let c = Change::removed(ComparisonKey::text("PLANT A"), Some(1.0), Record::new());
        assert_ne!(a.identity(&[]), c.identity(&[]));
    }

    #[test]
    fn test_identity_covers_watched_fields() {
        let fields = vec!["v".to_string(), "name".to_string()];
        let record = |name: &str| Record::new().with("v", 1.0).with("name", name);
        let renamed = |from: &str, to: &str| {
            Change::modified(
                ComparisonKey::text("X"),
                Some(1.0),
                Some(1.0),
                vec!["name".to_string()],
                record(from),
                record(to),
            )
        };

        assert_ne!(
            renamed("Old", "New").identity(&fields),
            renamed("New", "Newer").identity(&fields)
        );
        assert_eq!(
            renamed("Old", "New").identity(&fields),
            renamed(" Old", "New ").identity(&fields)
        );
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(ChangeStatus::parse(" Removed "), Some(ChangeStatus::Removed));
        assert_eq!(ChangeStatus::parse("unchanged"), None);
        assert_eq!(ChangeStatus::Modified.to_string(), "modified");
    }
}
