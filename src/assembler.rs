//! Request validation and response assembly.
//!
//! The assembler is the last pipeline stage:
//!
//! ```text
//! fetched results ─▶ partition ─▶ order ─▶ resolve ─▶ compare_many ─▶ response
//!                        │
//!                        └─▶ failed_snapshots
//! ```
//!
//! Every input yields a well-formed [`ComparisonResponse`]; only a
//! structurally invalid [`ComparisonRequest`] is rejected, and that happens
//! before any fetching starts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::engine::order_snapshots;
use crate::policy::ComparisonPolicy;
use crate::registry::{CompareContext, ComparatorRegistry};
use crate::types::{ComparisonResponse, ShapeDescriptor, SnapshotFailure, SnapshotResult};

/// A structurally invalid comparison request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// No snapshots were requested.
    #[error("comparison request lists no snapshots")]
    NoSnapshots,
    /// The extraction type is blank.
    #[error("extraction type must not be empty")]
    BlankExtractionType,
    /// A snapshot id is blank.
    #[error("snapshot id at position {0} is empty")]
    BlankSnapshotId(usize),
    /// The same snapshot was requested twice.
    #[error("snapshot '{0}' is listed more than once")]
    DuplicateSnapshot(String),
}

/// One requested snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRef {
    /// Snapshot id.
    pub id: String,
    /// Display name; defaults to the id.
    pub display_name: String,
}

impl SnapshotRef {
    /// Reference a snapshot by id, displayed as its id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
        }
    }

    /// Reference a snapshot with an explicit display name.
    pub fn named(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A validated comparison request: one extraction type over declared
/// snapshots, in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRequest {
    extraction_type: String,
    snapshots: Vec<SnapshotRef>,
}

impl ComparisonRequest {
    /// Build a request from snapshot ids.
    pub fn new<I, S>(
        extraction_type: impl Into<String>,
        snapshot_ids: I,
    ) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_refs(
            extraction_type,
            snapshot_ids.into_iter().map(SnapshotRef::new).collect(),
        )
    }

    /// Build a request from snapshot references.
    pub fn from_refs(
        extraction_type: impl Into<String>,
        snapshots: Vec<SnapshotRef>,
    ) -> Result<Self, RequestError> {
        let extraction_type = extraction_type.into().trim().to_string();
        if extraction_type.is_empty() {
            return Err(RequestError::BlankExtractionType);
        }
        if snapshots.is_empty() {
            return Err(RequestError::NoSnapshots);
        }

        let mut seen = HashSet::new();
        for (position, snapshot) in snapshots.iter().enumerate() {
            let id = snapshot.id.trim();
            if id.is_empty() {
                return Err(RequestError::BlankSnapshotId(position));
            }
            if !seen.insert(id) {
                return Err(RequestError::DuplicateSnapshot(id.to_string()));
            }
        }

        Ok(Self {
            extraction_type,
            snapshots,
        })
    }

    /// Extraction type to compare.
    pub fn extraction_type(&self) -> &str {
        &self.extraction_type
    }

    /// Requested snapshots in declared order.
    pub fn snapshots(&self) -> &[SnapshotRef] {
        &self.snapshots
    }
}

/// Turns fetched snapshot results into a response.
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    registry: Arc<ComparatorRegistry>,
    policy: ComparisonPolicy,
}

impl ResponseAssembler {
    /// Create an assembler.
    pub fn new(registry: Arc<ComparatorRegistry>, policy: ComparisonPolicy) -> Self {
        Self { registry, policy }
    }

    /// The comparator registry.
    pub fn registry(&self) -> &ComparatorRegistry {
        &self.registry
    }

    /// The comparison policy.
    pub fn policy(&self) -> &ComparisonPolicy {
        &self.policy
    }

    /// Assemble a response.
    ///
    /// `results` is in declared order. `incomplete` marks that a deadline cut
    /// fetching short.
    pub fn assemble(
        &self,
        extraction_type: &str,
        results: &[SnapshotResult],
        incomplete: bool,
    ) -> ComparisonResponse {
        let (successes, failures): (Vec<&SnapshotResult>, Vec<&SnapshotResult>) =
            results.iter().partition(|r| r.success);

        let failed_snapshots: Vec<SnapshotFailure> = failures
            .iter()
            .map(|r| SnapshotFailure {
                id: r.id.clone(),
                display_name: r.display_name.clone(),
                reason: r.error.clone().unwrap_or_else(|| "unknown failure".to_string()),
            })
            .collect();

        for failure in &failed_snapshots {
            tracing::warn!(
                snapshot = %failure.id,
                reason = %failure.reason,
                "snapshot unavailable"
            );
        }

        let ordered = order_snapshots(&successes);

        let mut response = if ordered.len() < crate::types::MIN_SNAPSHOTS {
            tracing::info!(
                extraction_type,
                successful = ordered.len(),
                requested = results.len(),
                "not enough snapshots to compare"
            );
            let mut response = ComparisonResponse::insufficient(extraction_type, ordered.len());
            response.snapshot_names = ordered.iter().map(|s| s.display_name.clone()).collect();
            response.policy_params_hash = self.policy.params_hash();
            response
        } else {
            let mut shape = ShapeDescriptor::default();
            for snapshot in &ordered {
                shape.merge(&snapshot.shape());
            }

            let comparator = self.registry.resolve(extraction_type, &shape);
            comparator.compare_many(
                &ordered,
                CompareContext {
                    extraction_type,
                    policy: &self.policy,
                },
            )
        };

        response.failed_snapshots = failed_snapshots;
        response.incomplete = incomplete;
        if incomplete && response.error.is_none() {
            response.error =
                Some("request deadline reached before every snapshot was fetched".to_string());
        }

        response.seal()
    }

    /// Assemble a response for a validated request.
    pub fn assemble_request(
        &self,
        request: &ComparisonRequest,
        results: &[SnapshotResult],
        incomplete: bool,
    ) -> ComparisonResponse {
        self.assemble(request.extraction_type(), results, incomplete)
    }
}
