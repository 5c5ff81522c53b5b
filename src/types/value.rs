//! Scalar field values and flat records.
//!
//! Every value that enters the engine passes through [`FieldValue::from_json`],
//! which is the single sanitization point: non-finite numbers and textual
//! sentinels such as `"NaN"` or `"inf"` become [`FieldValue::Null`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Textual sentinels treated as "no value" (compared case-insensitively).
const NULL_SENTINELS: &[&str] = &[
    "", "nan", "+nan", "-nan", "inf", "+inf", "-inf", "infinity", "+infinity",
    "-infinity", "null", "none", "n/a",
];

/// A sanitized scalar value of one record field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent, null, or a sanitized sentinel.
    Null,
    /// A finite number.
    Number(f64),
    /// Free text.
    Text(String),
}

impl FieldValue {
    /// Sanitize a JSON value into a field value.
    ///
    /// Booleans become the text `"true"`/`"false"`; nested arrays and
    /// objects are kept as their compact JSON text so that a change inside
    /// them is still detected by equality.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(Self::Number)
                .unwrap_or(Self::Null),
            Value::String(s) => Self::from_text(s),
            Value::Bool(b) => Self::Text(b.to_string()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Sanitize a piece of text. Sentinels become `Null`.
    pub fn from_text(s: &str) -> Self {
        if is_null_sentinel(s) {
            Self::Null
        } else {
            Self::Text(s.to_string())
        }
    }

    /// Build a number, mapping non-finite input to `Null`.
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::Null
        }
    }

    /// Interpret the value as a number.
    ///
    /// Text that parses as a finite float is accepted; anything else is
    /// `None`, never an error.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            Self::Null => None,
        }
    }

    /// Whether the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text form used for equality of watched (non-numeric) fields.
    ///
    /// Returns `None` for null so that two absent values compare equal.
    pub fn comparable_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Number(n) => Some(format_number(*n)),
            Self::Text(s) => Some(s.trim().to_string()),
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::from_text(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::from_text(&value)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

/// Whether a piece of text is a "no value" sentinel.
pub fn is_null_sentinel(s: &str) -> bool {
    let trimmed = s.trim();
    NULL_SENTINELS
        .iter()
        .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
}

/// Render a number without a trailing `.0` for integral values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// One row of a snapshot's tabular payload.
///
/// No implicit schema: fields vary by extraction type. Field iteration order
/// is alphabetical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, FieldValue>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object. Non-object input yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self(
            object
                .iter()
                .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                .collect(),
        ))
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(field.into(), value.into());
    }

    /// Get a field. Missing fields read as `Null`.
    pub fn get(&self, field: &str) -> &FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        self.0.get(field).unwrap_or(&NULL)
    }

    /// Numeric view of a field.
    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).as_number()
    }

    /// Whether the record declares the field at all.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Field names in alphabetical order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate over `(field, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sentinels_sanitize_to_null() {
        assert_eq!(FieldValue::from_json(&json!("NaN")), FieldValue::Null);
        assert_eq!(FieldValue::from_json(&json!(" -Inf ")), FieldValue::Null);
        assert_eq!(FieldValue::from_json(&json!(null)), FieldValue::Null);
        assert_eq!(FieldValue::number(f64::NAN), FieldValue::Null);
        assert_eq!(FieldValue::number(f64::INFINITY), FieldValue::Null);
    }

    #[test]
    fn test_numeric_text_is_a_number() {
        let value = FieldValue::from_json(&json!(" 42.5 "));
        assert_eq!(value.as_number(), Some(42.5));

        let value = FieldValue::from_json(&json!("SE"));
        assert_eq!(value.as_number(), None);
    }

    #[test]
    fn test_record_from_json_object() {
        let record = Record::from_json(&json!({"code": 7, "name": "ANGRA", "mw": "NaN"})).unwrap();
        assert_eq!(record.number("code"), Some(7.0));
        assert_eq!(record.get("name"), &FieldValue::Text("ANGRA".to_string()));
        assert!(record.get("mw").is_null());
        assert!(record.get("missing").is_null());
        assert!(Record::from_json(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_serialization_shape() {
        let record = Record::new().with("a", 1.5).with("b", "x").with("c", FieldValue::Null);
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"a":1.5,"b":"x","c":null}"#);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(-2.5), "-2.5");
    }
}
