//! Comparison keys: the identity of a record across snapshots.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::value::{format_number, FieldValue, Record};

/// One component of a [`ComparisonKey`].
///
/// Ordering is total: `Null < Number < Text`, numbers by `f64::total_cmp`,
/// text lexicographically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    /// A number (always finite; sanitized upstream).
    Number(f64),
    /// Text.
    Text(String),
    /// Missing key field.
    Null,
}

impl KeyPart {
    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Number(_) => 1,
            Self::Text(_) => 2,
        }
    }

    /// Normalized form used for deduplication: text is trimmed and
    /// uppercased, numbers are rendered canonically.
    pub fn normalized(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.trim().to_uppercase(),
        }
    }
}

impl From<&FieldValue> for KeyPart {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => Self::Null,
            FieldValue::Number(n) => Self::Number(*n),
            FieldValue::Text(s) => Self::Text(s.clone()),
        }
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null => {}
            Self::Number(n) => n.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "-"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Ordered tuple of field values identifying a record across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComparisonKey(Vec<KeyPart>);

impl ComparisonKey {
    /// Create a key from parts.
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Single-text key, mostly for tests and key/value payloads.
    pub fn text(value: impl Into<String>) -> Self {
        Self(vec![KeyPart::Text(value.into())])
    }

    /// Extract a key from the named fields of a record.
    ///
    /// Missing fields contribute [`KeyPart::Null`]; the key always has one
    /// part per requested field.
    pub fn from_fields(record: &Record, fields: &[String]) -> Self {
        Self(fields.iter().map(|f| KeyPart::from(record.get(f))).collect())
    }

    /// Key parts in order.
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Normalized parts for deduplication identity.
    pub fn normalized(&self) -> Vec<String> {
        self.0.iter().map(KeyPart::normalized).collect()
    }

    /// Display form of each part.
    pub fn display_parts(&self) -> Vec<String> {
        self.0.iter().map(|p| p.to_string()).collect()
    }
}

impl fmt::Display for ComparisonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_parts().join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_fields() {
        let record = Record::new().with("code", 12.0).with("level", "HEAVY");
        let key = ComparisonKey::from_fields(
            &record,
            &["code".to_string(), "level".to_string(), "period".to_string()],
        );

        assert_eq!(key.parts().len(), 3);
        assert_eq!(key.to_string(), "12 | HEAVY | -");
    }

    #[test]
    fn test_key_ordering_is_total() {
        let mut keys = vec![
            ComparisonKey::new(vec![KeyPart::Text("b".into())]),
            ComparisonKey::new(vec![KeyPart::Number(2.0)]),
            ComparisonKey::new(vec![KeyPart::Null]),
            ComparisonKey::new(vec![KeyPart::Number(-1.0)]),
            ComparisonKey::new(vec![KeyPart::Text("a".into())]),
        ];
        keys.sort();

        let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(rendered, vec!["-", "-1", "2", "a", "b"]);
    }

    #[test]
    fn test_normalized_ignores_case_and_padding() {
        let a = ComparisonKey::new(vec![KeyPart::Text(" se ".into()), KeyPart::Number(1.0)]);
        let b = ComparisonKey::new(vec![KeyPart::Text("SE".into()), KeyPart::Number(1.0)]);

        assert_ne!(a, b);
        assert_eq!(a.normalized(), b.normalized());
    }
}
