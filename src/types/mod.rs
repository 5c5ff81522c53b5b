//! Core types for the comparison kernel.

pub mod value;
pub mod key;
pub mod snapshot;
pub mod change;
pub mod response;

pub use value::{FieldValue, Record, format_number, is_null_sentinel};
pub use key::{ComparisonKey, KeyPart};
pub use snapshot::{SnapshotResult, SnapshotPayload, ShapeDescriptor, ShapeKind};
pub use change::{
    Change, ChangeStatus, ChangeOrigin, ChangeIdentity, ChangeSet,
    Transition, TransitionSummary, AggregatedChangeSet,
};
pub use response::{
    ComparisonResponse, ComparisonOutcome, RowRecord, ChartSpec, ChartSeries, ChartKind,
    ChangeStats, SnapshotFailure, MIN_SNAPSHOTS,
};
