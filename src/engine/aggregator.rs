//! N-way aggregation over an ordered snapshot sequence.
//!
//! ## Algorithm
//!
//! ```text
//! S0 ──t0──▶ S1 ──t1──▶ S2 ── … ──▶ Sn-1
//!      │          │
//!   classify   classify           (one Transition per consecutive pair)
//!      └────┬─────┘
//!        concat (tag origin) → dedup (first wins) → rank → stats
//! ```
//!
//! Two snapshots short-circuit to the single transition's ranked change
//! set; the result is identical to classifying and ranking the pair
//! directly.

use std::collections::HashSet;

use crate::policy::{CompareRule, ComparisonPolicy};
use crate::types::{
    AggregatedChangeSet, ChangeOrigin, ChangeSet, Record, SnapshotResult, Transition,
    MIN_SNAPSHOTS,
};

use super::classifier::classify;
use super::indexer::{index, RecordIndex};
use super::ranker::rank;

/// Fewer than two snapshots were handed to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("need at least {} snapshots to compare, got {available}", MIN_SNAPSHOTS)]
pub struct InsufficientSnapshots {
    /// Snapshots available.
    pub available: usize,
}

/// Composes indexing, classification and ranking over N snapshots.
pub struct Aggregator<'a> {
    rule: &'a CompareRule,
    policy: &'a ComparisonPolicy,
}

impl<'a> Aggregator<'a> {
    /// Create an aggregator for one rule and policy.
    pub fn new(rule: &'a CompareRule, policy: &'a ComparisonPolicy) -> Self {
        Self { rule, policy }
    }

    /// Aggregate an ordered snapshot sequence.
    ///
    /// `records_of` reads a snapshot's rows (a comparator's payload view).
    /// Snapshots are assumed already ordered and successful.
    pub fn aggregate<F>(
        &self,
        ordered: &[&SnapshotResult],
        records_of: F,
    ) -> Result<AggregatedChangeSet, InsufficientSnapshots>
    where
        F: Fn(&SnapshotResult) -> Vec<Record>,
    {
        if ordered.len() < MIN_SNAPSHOTS {
            return Err(InsufficientSnapshots {
                available: ordered.len(),
            });
        }

        let indexes: Vec<RecordIndex> = ordered
            .iter()
            .map(|s| index(records_of(*s), |r| self.rule.key_of(r)))
            .collect();
        let key_collisions: usize = indexes.iter().map(RecordIndex::collisions).sum();

        let transitions: Vec<Transition> = ordered
            .windows(2)
            .zip(indexes.windows(2))
            .map(|(pair, idx)| Transition {
                from_snapshot: pair[0].id.clone(),
                to_snapshot: pair[1].id.clone(),
                change_set: rank(
                    classify(&idx[0], &idx[1], self.rule, self.policy),
                    &self.policy.status_order,
                ),
            })
            .collect();

        if let [single] = transitions.as_slice() {
            let changes = single.change_set.clone();
            return Ok(AggregatedChangeSet {
                transitions,
                changes,
                duplicates_removed: 0,
                key_collisions,
            });
        }

        let (changes, duplicates_removed) = self.merge(&transitions);

        tracing::debug!(
            transitions = transitions.len(),
            changes = changes.len(),
            duplicates_removed,
            key_collisions,
            "aggregated snapshot sequence"
        );

        Ok(AggregatedChangeSet {
            transitions,
            changes,
            duplicates_removed,
            key_collisions,
        })
    }

    /// Concatenate transitions, tag origins, drop duplicates, re-rank.
    fn merge(&self, transitions: &[Transition]) -> (ChangeSet, usize) {
        let fields = self.rule.compared_fields();
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        let mut duplicates = 0;

        for (position, transition) in transitions.iter().enumerate() {
            let origin = ChangeOrigin {
                transition: position,
                from_snapshot: transition.from_snapshot.clone(),
                to_snapshot: transition.to_snapshot.clone(),
            };

            for change in &transition.change_set {
                if self.policy.deduplicate && !seen.insert(change.identity(&fields)) {
                    duplicates += 1;
                    continue;
                }
                merged.push(change.clone().with_origin(origin.clone()));
            }
        }

        (rank(merged, &self.policy.status_order), duplicates)
    }
}

/// Convenience wrapper: aggregate with a rule's tabular collection reader.
pub fn aggregate(
    ordered: &[&SnapshotResult],
    collection: &str,
    rule: &CompareRule,
    policy: &ComparisonPolicy,
) -> Result<AggregatedChangeSet, InsufficientSnapshots> {
    Aggregator::new(rule, policy).aggregate(ordered, |s| s.records(collection))
}
