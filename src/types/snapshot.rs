//! Per-snapshot extraction results and their shape.
//!
//! A [`SnapshotResult`] is what the fetcher hands to the core: one dated
//! snapshot ("deck") and the open field map the extraction produced for it.
//! The core never mutates it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::value::{FieldValue, Record};

/// Result of running one extraction against one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResult {
    /// Snapshot identifier (e.g. a deck name).
    pub id: String,
    /// Human-facing name used in tables and chart axes.
    pub display_name: String,
    /// Whether the extraction succeeded.
    pub success: bool,
    /// Failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Reference date of the snapshot, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
    /// Extraction payload; shape depends on the extraction type.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl SnapshotResult {
    /// A successful result.
    pub fn ok(
        id: impl Into<String>,
        display_name: impl Into<String>,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            success: true,
            error: None,
            as_of: None,
            fields,
        }
    }

    /// A failed result carrying a reason.
    pub fn failed(
        id: impl Into<String>,
        display_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            success: false,
            error: Some(error.into()),
            as_of: None,
            fields: BTreeMap::new(),
        }
    }

    /// Attach a reference date.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Attach a payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Records of a tabular collection.
    ///
    /// A missing collection, a non-array value, or non-object rows all read
    /// as "no records": a shape mismatch degrades to an empty table.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.fields
            .get(collection)
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(Record::from_json).collect())
            .unwrap_or_default()
    }

    /// Top-level scalar fields (everything that is not an array or object).
    pub fn scalars(&self) -> Record {
        self.fields
            .iter()
            .filter(|(_, v)| !v.is_array() && !v.is_object())
            .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
            .collect()
    }

    /// Describe the payload shape for comparator dispatch.
    pub fn shape(&self) -> ShapeDescriptor {
        ShapeDescriptor::of(self)
    }
}

/// Coarse classification of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    /// No fields at all.
    Empty,
    /// Only scalar fields.
    Scalar,
    /// Only collections of records.
    Tabular,
    /// Both scalars and collections.
    Mixed,
}

/// Structural description of a snapshot payload.
///
/// Comparators declare what they can handle in terms of this descriptor;
/// the registry never looks at payload values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeDescriptor {
    /// Collection name → union of column names seen in its rows.
    pub collections: BTreeMap<String, BTreeSet<String>>,
    /// Names of scalar fields.
    pub scalar_fields: BTreeSet<String>,
}

impl ShapeDescriptor {
    /// Describe a snapshot's payload.
    ///
    /// Arrays whose elements are not objects count as scalar-like fields.
    pub fn of(snapshot: &SnapshotResult) -> Self {
        let mut shape = Self::default();

        for (name, value) in &snapshot.fields {
            match value {
                Value::Array(rows) if rows.iter().any(Value::is_object) => {
                    let columns = shape.collections.entry(name.clone()).or_default();
                    for row in rows.iter().filter_map(Value::as_object) {
                        columns.extend(row.keys().cloned());
                    }
                }
                Value::Object(_) => {
                    shape.collections.entry(name.clone()).or_default();
                }
                _ => {
                    shape.scalar_fields.insert(name.clone());
                }
            }
        }

        shape
    }

    /// Merge another descriptor into this one (union of everything).
    pub fn merge(&mut self, other: &ShapeDescriptor) {
        for (name, columns) in &other.collections {
            self.collections
                .entry(name.clone())
                .or_default()
                .extend(columns.iter().cloned());
        }
        self.scalar_fields.extend(other.scalar_fields.iter().cloned());
    }

    /// Coarse kind of the payload.
    pub fn kind(&self) -> ShapeKind {
        match (self.collections.is_empty(), self.scalar_fields.is_empty()) {
            (true, true) => ShapeKind::Empty,
            (true, false) => ShapeKind::Scalar,
            (false, true) => ShapeKind::Tabular,
            (false, false) => ShapeKind::Mixed,
        }
    }

    /// Whether a collection with the given name exists.
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Whether a collection exists and its rows carry every listed column.
    pub fn has_columns(&self, collection: &str, columns: &[String]) -> bool {
        self.collections
            .get(collection)
            .map(|seen| columns.iter().all(|c| seen.contains(c)))
            .unwrap_or(false)
    }

    /// The first collection in name order, if any.
    pub fn primary_collection(&self) -> Option<&str> {
        self.collections
            .iter()
            .find(|(_, columns)| !columns.is_empty())
            .map(|(name, _)| name.as_str())
    }
}

/// Validated view of a snapshot payload, as read by one comparator.
///
/// This is the tagged union the engine works on: a comparator turns the
/// open field map into one of these variants at the boundary and never
/// reads `fields` again.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotPayload {
    /// Rows of a named collection.
    Tabular {
        /// Collection name in `fields`.
        collection: String,
        /// Rows, in payload order.
        records: Vec<Record>,
    },
    /// Top-level scalar fields, one record per field.
    KeyValue(Vec<Record>),
}

impl SnapshotPayload {
    /// Records of the payload regardless of variant.
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Tabular { records, .. } => records,
            Self::KeyValue(records) => records,
        }
    }

    /// Consume into records.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Tabular { records, .. } => records,
            Self::KeyValue(records) => records,
        }
    }
}
