//! The comparator contract and the shared compose path.

use std::collections::BTreeMap;

use crate::engine::{chart_series, Aggregator};
use crate::policy::{CompareRule, ComparisonPolicy};
use crate::types::{
    Change, ChangeSet, ChangeStats, ComparisonOutcome, ComparisonResponse, Record, RowRecord,
    ShapeDescriptor, SnapshotPayload, SnapshotResult, MIN_SNAPSHOTS,
};

/// Group name for changes without a category.
pub const UNCATEGORIZED: &str = "-";

/// What a comparator declares it can handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparatorCapability {
    /// Dispatch priority; higher wins.
    pub priority: i32,
    /// Extraction types handled; empty means any.
    pub extraction_types: Vec<String>,
    /// Collection the comparator reads, if tabular.
    pub required_collection: Option<String>,
    /// Columns the collection rows must carry when the collection is present.
    pub required_columns: Vec<String>,
}

impl ComparatorCapability {
    /// Capability that matches anything at the given priority.
    pub fn any(priority: i32) -> Self {
        Self {
            priority,
            extraction_types: Vec::new(),
            required_collection: None,
            required_columns: Vec::new(),
        }
    }

    /// Whether the capability covers an extraction type and payload shape.
    ///
    /// A declared collection that is absent from the shape still matches:
    /// a missing collection reads as an empty table. A collection that is
    /// present but lacks the required columns does not.
    pub fn matches(&self, extraction_type: &str, shape: &ShapeDescriptor) -> bool {
        let type_ok = self.extraction_types.is_empty()
            || self
                .extraction_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(extraction_type.trim()));

        let shape_ok = match &self.required_collection {
            Some(collection) => {
                !shape.has_collection(collection)
                    || shape.has_columns(collection, &self.required_columns)
            }
            None => true,
        };

        type_ok && shape_ok
    }
}

/// Where a comparator reads records from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// Rows of a named collection.
    Collection(String),
    /// Top-level scalars flattened to `{field, value, text}` records, plus a
    /// `<collection>.count` record per collection.
    Scalars,
}

impl PayloadSource {
    /// Read a snapshot through this source.
    pub fn payload(&self, snapshot: &SnapshotResult) -> SnapshotPayload {
        match self {
            Self::Collection(collection) => SnapshotPayload::Tabular {
                collection: collection.clone(),
                records: snapshot.records(collection),
            },
            Self::Scalars => SnapshotPayload::KeyValue(scalar_records(snapshot)),
        }
    }
}

/// Field names of key/value records.
pub mod kv {
    /// Field name column.
    pub const FIELD: &str = "field";
    /// Numeric value column.
    pub const VALUE: &str = "value";
    /// Non-numeric value column.
    pub const TEXT: &str = "text";
}

fn scalar_records(snapshot: &SnapshotResult) -> Vec<Record> {
    let mut records: Vec<Record> = snapshot
        .scalars()
        .iter()
        .map(|(field, value)| {
            let record = Record::new().with(kv::FIELD, field);
            match value.as_number() {
                Some(n) => record.with(kv::VALUE, n),
                None => record.with(kv::TEXT, value.clone()),
            }
        })
        .collect();

    for (name, value) in &snapshot.fields {
        let count = match value {
            serde_json::Value::Array(rows) if rows.iter().any(serde_json::Value::is_object) => {
                rows.len()
            }
            serde_json::Value::Object(map) => map.len(),
            _ => continue,
        };
        records.push(
            Record::new()
                .with(kv::FIELD, format!("{}.count", name))
                .with(kv::VALUE, count as f64),
        );
    }

    records
}

/// The rule and payload source a comparator applies to a snapshot sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonView {
    /// Key and field configuration.
    pub rule: CompareRule,
    /// Record source.
    pub source: PayloadSource,
}

impl ComparisonView {
    /// Records of a snapshot under this view.
    pub fn records(&self, snapshot: &SnapshotResult) -> Vec<Record> {
        self.source.payload(snapshot).into_records()
    }
}

/// Request-level inputs a comparator needs besides the snapshots.
#[derive(Debug, Clone, Copy)]
pub struct CompareContext<'a> {
    /// Extraction type being compared.
    pub extraction_type: &'a str,
    /// Policy in effect.
    pub policy: &'a ComparisonPolicy,
}

/// A formatter/comparator strategy selected per extraction type and shape.
///
/// Implementors describe *what* to compare ([`Comparator::view`]); the
/// provided [`Comparator::compare`] and [`Comparator::compare_many`] run the
/// shared engine. Override them only for genuinely different semantics.
pub trait Comparator: Send + Sync {
    /// Stable comparator name, reported in responses.
    fn name(&self) -> &str;

    /// Declared capability.
    fn capability(&self) -> &ComparatorCapability;

    /// Renderer hint.
    fn visualization_type(&self) -> &str;

    /// Rule and source for an ordered snapshot sequence.
    fn view(&self, ordered: &[&SnapshotResult]) -> ComparisonView;

    /// Whether responses carry chart series.
    fn wants_chart(&self) -> bool {
        false
    }

    /// Whether this comparator handles the type and shape.
    fn matches(&self, extraction_type: &str, shape: &ShapeDescriptor) -> bool {
        self.capability().matches(extraction_type, shape)
    }

    /// Dispatch priority.
    fn priority(&self) -> i32 {
        self.capability().priority
    }

    /// Compare two snapshots.
    fn compare(
        &self,
        before: &SnapshotResult,
        after: &SnapshotResult,
        ctx: CompareContext<'_>,
    ) -> ComparisonResponse {
        self.compare_many(&[before, after], ctx)
    }

    /// Compare an ordered sequence by pairwise composition.
    fn compare_many(
        &self,
        ordered: &[&SnapshotResult],
        ctx: CompareContext<'_>,
    ) -> ComparisonResponse {
        compose(self, ordered, ctx)
    }
}

/// Run the engine for a comparator and assemble its response.
pub fn compose<C: Comparator + ?Sized>(
    comparator: &C,
    ordered: &[&SnapshotResult],
    ctx: CompareContext<'_>,
) -> ComparisonResponse {
    if ordered.len() < MIN_SNAPSHOTS {
        return ComparisonResponse::insufficient(ctx.extraction_type, ordered.len()).seal();
    }

    let view = comparator.view(ordered);
    let records_of = |s: &SnapshotResult| view.records(s);

    let aggregated = match Aggregator::new(&view.rule, ctx.policy).aggregate(ordered, &records_of) {
        Ok(aggregated) => aggregated,
        Err(e) => return ComparisonResponse::insufficient(ctx.extraction_type, e.available).seal(),
    };

    let mut response = ComparisonResponse::empty(
        ctx.extraction_type,
        comparator.name(),
        comparator.visualization_type(),
        ComparisonOutcome::Compared,
    );

    response.stats = ChangeStats::compute(
        &aggregated.changes,
        aggregated.key_collisions,
        aggregated.duplicates_removed,
    );

    let mut table: Vec<RowRecord> = aggregated.changes.iter().map(RowRecord::from).collect();
    if let Some(max) = ctx.policy.max_table_rows {
        table.truncate(max);
    }
    response.comparison_table = Some(table);

    if view.rule.category_field.is_some() {
        response.grouped_by = Some(group_by_category(&aggregated.changes));
    }
    if comparator.wants_chart() {
        response.chart_series = chart_series(ordered, &view.rule, &records_of);
    }

    response.snapshot_names = ordered.iter().map(|s| s.display_name.clone()).collect();
    response.is_multi_snapshot = ordered.len() > MIN_SNAPSHOTS;
    response.transitions = aggregated.transitions.iter().map(|t| t.summary()).collect();
    response.policy_params_hash = ctx.policy.params_hash();

    response.seal()
}

/// Partition a ranked change set by category, preserving rank order.
pub fn group_by_category(changes: &[Change]) -> BTreeMap<String, ChangeSet> {
    let mut groups: BTreeMap<String, ChangeSet> = BTreeMap::new();
    for change in changes {
        let name = change.category.clone().unwrap_or_else(|| UNCATEGORIZED.to_string());
        groups.entry(name).or_default().push(change.clone());
    }
    groups
}
