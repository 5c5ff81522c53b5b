//! The comparison engine.
//!
//! Pure functions over immutable snapshots:
//!
//! ```text
//! records ─▶ index ─▶ classify (pairwise) ─▶ rank
//!                         │
//!                         └─▶ aggregate (N-way, dedup, global rank)
//! ```
//!
//! Nothing here performs I/O or holds locks; every function is
//! deterministic for a given input.

mod aggregator;
mod classifier;
mod indexer;
mod ordering;
mod ranker;
mod series;

pub use aggregator::{aggregate, Aggregator, InsufficientSnapshots};
pub use classifier::{changed_fields, classify};
pub use indexer::{index, RecordIndex};
pub use ordering::{infer_period, order_snapshots, reference_date};
pub use ranker::{rank, rank_in_place, ranking_order};
pub use series::{chart_series, TOTAL_SERIES};
