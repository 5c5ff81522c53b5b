//! # deck-diff-kernel
//!
//! Deterministic structured comparison across dated snapshots ("decks").
//!
//! The kernel answers one question:
//!
//! > Given the same extraction run over N snapshots, **what changed, and
//! > which changes matter most**?
//!
//! ## Core Contract
//!
//! 1. Index each snapshot's records by a per-type comparison key
//! 2. Classify every key of every consecutive pair as added, removed, or
//!    modified (numbers within tolerance are unchanged)
//! 3. Merge transitions, drop re-observed changes, rank by magnitude
//! 4. Hand the presentation layer one stable [`ComparisonResponse`] shape,
//!    even when every fetch failed
//!
//! ## Architecture
//!
//! ```text
//! ComparisonRequest → FetchPool → SnapshotResult × N
//!                                      ↓
//!                      order → resolve (ComparatorRegistry)
//!                                      ↓
//!              index → classify → aggregate/dedup → rank → ComparisonResponse
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same snapshots + same policy + same registry → identical `comparison_id`
//! - Change ordering: magnitude desc, then status order, then key
//! - Record indexes are `BTreeMap`s; no hash-order iteration reaches output

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod canonical;
pub mod engine;
pub mod policy;
pub mod registry;
pub mod types;

#[cfg(feature = "fetch")]
pub mod fetch;

// Re-exports
pub use types::{
    AggregatedChangeSet, Change, ChangeOrigin, ChangeSet, ChangeStats, ChangeStatus, ChartKind,
    ChartSeries, ChartSpec, ComparisonKey, ComparisonOutcome, ComparisonResponse, FieldValue,
    KeyPart, Record, RowRecord, ShapeDescriptor, ShapeKind, SnapshotFailure, SnapshotPayload,
    SnapshotResult, Transition, TransitionSummary, MIN_SNAPSHOTS,
};
pub use policy::{
    builtin_profiles, load_profiles, parse_profiles, CompareRule, ComparisonPolicy,
    ExtractionProfile, ProfileError, StatusOrder, DEFAULT_TOLERANCE,
};
pub use engine::{aggregate, classify, index, order_snapshots, rank, Aggregator, RecordIndex};
pub use registry::{
    CompareContext, Comparator, ComparatorCapability, ComparatorRegistry, GenericTableComparator,
    KeyValueComparator, ProfileComparator, RegistryBuilder,
};
pub use assembler::{ComparisonRequest, RequestError, ResponseAssembler, SnapshotRef};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};

// Fetch re-exports (when fetch feature is enabled)
#[cfg(feature = "fetch")]
pub use fetch::{
    ArtifactCache, CacheStats, ComparisonService, DeckArtifact, FetchConfig, FetchError,
    FetchPool, FetchReport, FetchStage, FileSnapshotFetcher, SnapshotFetcher,
};

/// Schema version of the response contract.
/// Increment on breaking changes to any serialized type.
pub const DECK_DIFF_SCHEMA_VERSION: &str = "1.0.0";

/// Default comparison policy version identifier.
pub const DEFAULT_POLICY_VERSION: &str = "comparison_policy_v1";
