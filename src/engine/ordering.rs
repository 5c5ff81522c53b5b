//! Deterministic snapshot ordering.
//!
//! Fetches complete in any order; transitions need a defined direction.
//! When every snapshot has a reference date (explicit `as_of`, or a
//! `YYYYMM` / `YYYY-MM` token in its id) snapshots are sorted by date, ties
//! broken by declared position. Otherwise the declared order is kept.

use chrono::NaiveDate;
use regex_lite::Regex;
use std::sync::OnceLock;

use crate::types::SnapshotResult;

fn period_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?:^|[^0-9])((?:19|20)[0-9]{2})[-_.]?(0[1-9]|1[0-2])(?:[^0-9]|$)").ok()
        })
        .as_ref()
}

/// Infer a reference date (first day of the month) from a snapshot id.
pub fn infer_period(id: &str) -> Option<NaiveDate> {
    let captures = period_pattern()?.captures(id)?;
    let year = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(2)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Reference date of a snapshot: explicit, else inferred from its id.
pub fn reference_date(snapshot: &SnapshotResult) -> Option<NaiveDate> {
    snapshot.as_of.or_else(|| infer_period(&snapshot.id))
}

/// Order snapshots for comparison. `snapshots` is in declared order.
pub fn order_snapshots<'a>(snapshots: &[&'a SnapshotResult]) -> Vec<&'a SnapshotResult> {
    let dated: Option<Vec<(NaiveDate, usize)>> = snapshots
        .iter()
        .enumerate()
        .map(|(position, s)| reference_date(s).map(|d| (d, position)))
        .collect();

    match dated {
        Some(mut keys) => {
            keys.sort();
            keys.into_iter().map(|(_, position)| snapshots[position]).collect()
        }
        None => snapshots.to_vec(),
    }
}
