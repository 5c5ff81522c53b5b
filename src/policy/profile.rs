//! Extraction profiles: per-type comparison configuration.
//!
//! Behaviour that differs between extraction types lives here as data
//! (which collection to read, which fields form the key, which fields are
//! compared) so that a single engine serves every type.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{ComparisonKey, Record, ShapeDescriptor, SnapshotPayload, SnapshotResult};

/// Error type for profile loading.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// The profile file could not be read.
    #[error("failed to read profiles from {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The profile file is not valid JSON for a profile list.
    #[error("invalid profile document: {0}")]
    Parse(#[from] serde_json::Error),
    /// A profile is structurally unusable.
    #[error("invalid profile '{extraction_type}': {reason}")]
    Invalid {
        /// Offending profile.
        extraction_type: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Which fields of which collection one extraction type compares.
///
/// ## Fields
///
/// - `collection`: key in `SnapshotResult::fields` holding the rows
/// - `key_fields`: fields forming the [`ComparisonKey`], in order
/// - `value_fields`: numeric fields compared with tolerance; the first one
///   is the primary value that drives magnitude and deltas
/// - `watched_fields`: non-numeric fields compared by trimmed text equality
/// - `category_field`: optional secondary grouping (e.g. load level)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionProfile {
    /// Extraction type this profile applies to.
    pub extraction_type: String,
    /// Collection holding the records.
    pub collection: String,
    /// Fields forming the record key.
    pub key_fields: Vec<String>,
    /// Numeric fields compared with tolerance.
    #[serde(default)]
    pub value_fields: Vec<String>,
    /// Non-numeric fields compared for equality.
    #[serde(default)]
    pub watched_fields: Vec<String>,
    /// Field used for grouping and chart series.
    #[serde(default)]
    pub category_field: Option<String>,
    /// Dispatch priority of the comparator built from this profile.
    #[serde(default = "default_profile_priority")]
    pub priority: i32,
    /// Renderer hint.
    #[serde(default = "default_visualization")]
    pub visualization: String,
}

fn default_profile_priority() -> i32 {
    100
}

fn default_visualization() -> String {
    "table".to_string()
}

impl ExtractionProfile {
    /// Create a profile with the minimum required fields.
    pub fn new(
        extraction_type: impl Into<String>,
        collection: impl Into<String>,
        key_fields: &[&str],
        value_fields: &[&str],
    ) -> Self {
        Self {
            extraction_type: extraction_type.into(),
            collection: collection.into(),
            key_fields: key_fields.iter().map(|s| s.to_string()).collect(),
            value_fields: value_fields.iter().map(|s| s.to_string()).collect(),
            watched_fields: Vec::new(),
            category_field: None,
            priority: default_profile_priority(),
            visualization: default_visualization(),
        }
    }

    /// Builder: watched fields.
    pub fn watching(mut self, fields: &[&str]) -> Self {
        self.watched_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Builder: category field.
    pub fn grouped_by(mut self, field: impl Into<String>) -> Self {
        self.category_field = Some(field.into());
        self
    }

    /// Builder: priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: visualization hint.
    pub fn with_visualization(mut self, visualization: impl Into<String>) -> Self {
        self.visualization = visualization.into();
        self
    }

    /// Structural validation.
    pub fn validate(&self) -> Result<(), ProfileError> {
        let invalid = |reason: &str| ProfileError::Invalid {
            extraction_type: self.extraction_type.clone(),
            reason: reason.to_string(),
        };

        if self.extraction_type.trim().is_empty() {
            return Err(invalid("extraction_type is empty"));
        }
        if self.collection.trim().is_empty() {
            return Err(invalid("collection is empty"));
        }
        if self.key_fields.is_empty() {
            return Err(invalid("key_fields is empty"));
        }
        if let Some(overlap) = self.value_fields.iter().find(|f| self.key_fields.contains(f)) {
            return Err(invalid(&format!("field '{}' is both key and value", overlap)));
        }
        Ok(())
    }

    /// Fields every row is expected to carry.
    pub fn required_columns(&self) -> Vec<String> {
        self.key_fields.clone()
    }

    /// Whether a payload shape carries what this profile reads.
    pub fn fits(&self, shape: &ShapeDescriptor) -> bool {
        shape.has_columns(&self.collection, &self.required_columns())
    }

    /// The comparison rule this profile describes.
    pub fn rule(&self) -> CompareRule {
        CompareRule {
            key_fields: self.key_fields.clone(),
            value_fields: self.value_fields.clone(),
            watched_fields: self.watched_fields.clone(),
            category_field: self.category_field.clone(),
        }
    }

    /// Read a snapshot's payload through this profile.
    ///
    /// A snapshot lacking the collection yields an empty table.
    pub fn payload(&self, snapshot: &SnapshotResult) -> SnapshotPayload {
        SnapshotPayload::Tabular {
            collection: self.collection.clone(),
            records: snapshot.records(&self.collection),
        }
    }
}

/// Key extraction and field-comparison configuration used by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareRule {
    /// Fields forming the key.
    pub key_fields: Vec<String>,
    /// Numeric fields; the first is primary.
    pub value_fields: Vec<String>,
    /// Non-numeric fields compared for equality.
    pub watched_fields: Vec<String>,
    /// Grouping field.
    pub category_field: Option<String>,
}

impl CompareRule {
    /// Extract a record's key.
    pub fn key_of(&self, record: &Record) -> ComparisonKey {
        ComparisonKey::from_fields(record, &self.key_fields)
    }

    /// Primary numeric value of a record.
    pub fn primary_value(&self, record: &Record) -> Option<f64> {
        self.value_fields.first().and_then(|f| record.number(f))
    }

    /// Value fields followed by watched fields.
    pub fn compared_fields(&self) -> Vec<String> {
        self.value_fields
            .iter()
            .chain(&self.watched_fields)
            .cloned()
            .collect()
    }

    /// Category of a record, when configured and present.
    pub fn category_of(&self, record: &Record) -> Option<String> {
        let field = self.category_field.as_ref()?;
        record.get(field).comparable_text()
    }
}

/// Load a list of profiles from a JSON file.
///
/// Every profile is validated; the first invalid one aborts loading.
pub fn load_profiles(path: impl AsRef<Path>) -> Result<Vec<ExtractionProfile>, ProfileError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_profiles(&raw)
}

/// Parse and validate a JSON list of profiles.
pub fn parse_profiles(raw: &str) -> Result<Vec<ExtractionProfile>, ProfileError> {
    let profiles: Vec<ExtractionProfile> = serde_json::from_str(raw)?;
    for profile in &profiles {
        profile.validate()?;
    }
    Ok(profiles)
}

/// Profiles for the extraction types the kernel knows out of the box.
pub fn builtin_profiles() -> Vec<ExtractionProfile> {
    vec![
        // Installed capacity per plant.
        ExtractionProfile::new("plant_capacity", "plants", &["code"], &["capacity_mw"])
            .watching(&["name", "fuel", "status"])
            .with_visualization("table"),
        // Demand per submarket, load level, and period.
        ExtractionProfile::new(
            "load_levels",
            "records",
            &["submarket", "level", "period_start"],
            &["value"],
        )
        .grouped_by("level")
        .with_visualization("table_with_chart"),
        // Generation limits per plant and period.
        ExtractionProfile::new(
            "generation_limits",
            "limits",
            &["code", "period_start"],
            &["max_mw", "min_mw"],
        )
        .watching(&["name"])
        .with_visualization("table"),
        // Cost per plant and cost class.
        ExtractionProfile::new("unit_costs", "costs", &["code", "class"], &["cost"])
            .grouped_by("class")
            .with_visualization("table_with_chart"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_builtin_profiles_are_valid() {
        for profile in builtin_profiles() {
            profile.validate().unwrap();
        }
    }

    #[test]
    fn test_parse_profiles_with_defaults() {
        let raw = r#"[{"extraction_type": "hydro", "collection": "rows", "key_fields": ["code"]}]"#;
        let profiles = parse_profiles(raw).unwrap();

        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].priority, 100);
        assert_eq!(profiles[0].visualization, "table");
        assert!(profiles[0].value_fields.is_empty());
    }

    #[test]
    fn test_parse_rejects_invalid_profile() {
        let raw = r#"[{"extraction_type": "hydro", "collection": "rows", "key_fields": []}]"#;
        assert!(matches!(parse_profiles(raw), Err(ProfileError::Invalid { .. })));

        assert!(matches!(parse_profiles("{"), Err(ProfileError::Parse(_))));
    }

    #[test]
    fn test_key_and_value_overlap_rejected() {
        let profile = ExtractionProfile::new("x", "rows", &["code"], &["code"]);
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_fits_and_payload() {
        let profile =
            ExtractionProfile::new("plant_capacity", "plants", &["code"], &["capacity_mw"]);
        let snapshot = SnapshotResult::ok("d1", "D1", BTreeMap::new())
            .with_field("plants", json!([{"code": 1, "capacity_mw": 5.0}]));

        assert!(profile.fits(&snapshot.shape()));
        assert_eq!(profile.payload(&snapshot).records().len(), 1);

        let empty = SnapshotResult::ok("d2", "D2", BTreeMap::new());
        assert!(!profile.fits(&empty.shape()));
        assert!(profile.payload(&empty).records().is_empty());
    }

    #[test]
    fn test_rule_reads_primary_and_category() {
        let rule = ExtractionProfile::new("load_levels", "records", &["submarket"], &["value"])
            .grouped_by("level")
            .rule();
        let record = Record::new()
            .with("submarket", "SE")
            .with("level", " HEAVY ")
            .with("value", "12.5");

        assert_eq!(rule.primary_value(&record), Some(12.5));
        assert_eq!(rule.category_of(&record), Some("HEAVY".to_string()));
        assert_eq!(rule.key_of(&record).to_string(), "SE");
    }
}
