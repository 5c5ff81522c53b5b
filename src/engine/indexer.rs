//! Record indexing: snapshot rows keyed by [`ComparisonKey`].

use std::collections::BTreeMap;

use crate::types::{ComparisonKey, Record};

/// Key → record map of one snapshot.
///
/// Backed by a `BTreeMap`, so iteration follows key order and two indexes
/// built from the same input are identical.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordIndex {
    entries: BTreeMap<ComparisonKey, Record>,
    collisions: usize,
}

impl RecordIndex {
    /// Look up a record.
    pub fn get(&self, key: &ComparisonKey) -> Option<&Record> {
        self.entries.get(key)
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &ComparisonKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ComparisonKey, &Record)> {
        self.entries.iter()
    }

    /// Keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &ComparisonKey> {
        self.entries.keys()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many records were overwritten by a later record with the same key.
    pub fn collisions(&self) -> usize {
        self.collisions
    }
}

/// Index records by key.
///
/// Collision policy is last-write-wins: when two records share a key the
/// later one is kept and the collision is counted, never silently lost.
pub fn index<I, F>(records: I, key_of: F) -> RecordIndex
where
    I: IntoIterator<Item = Record>,
    F: Fn(&Record) -> ComparisonKey,
{
    let mut entries = BTreeMap::new();
    let mut collisions = 0;

    for record in records {
        let key = key_of(&record);
        if entries.insert(key, record).is_some() {
            collisions += 1;
        }
    }

    RecordIndex { entries, collisions }
}
