//! Magnitude ranking with deterministic tie-breaks.

use std::cmp::Ordering;

use crate::policy::StatusOrder;
use crate::types::{Change, ChangeSet};

/// Order two changes for ranking.
///
/// 1. magnitude, descending
/// 2. status, by `order`
/// 3. key, natural order
///
/// Changes equal on all three keep their input order (the sort is stable).
pub fn ranking_order(a: &Change, b: &Change, order: &StatusOrder) -> Ordering {
    b.magnitude
        .total_cmp(&a.magnitude)
        .then_with(|| order.rank(a.status).cmp(&order.rank(b.status)))
        .then_with(|| a.key.cmp(&b.key))
}

/// Rank a change set. Ranking an already ranked set is a no-op.
pub fn rank(mut changes: ChangeSet, order: &StatusOrder) -> ChangeSet {
    rank_in_place(&mut changes, order);
    changes
}

/// Rank a slice of changes in place.
pub fn rank_in_place(changes: &mut [Change], order: &StatusOrder) {
    changes.sort_by(|a, b| ranking_order(a, b, order));
}
