//! Snapshot fetching: the I/O side of the pipeline.
//!
//! ```text
//! ComparisonRequest ─▶ FetchPool (bounded JoinSet) ─▶ SnapshotFetcher × N
//!                          │                               │
//!                          │                         ArtifactCache (LRU)
//!                          ▼
//!                     FetchReport (declared order, incomplete flag)
//! ```
//!
//! Failures never abort a request. A fetch that errors or times out becomes
//! a `success = false` [`SnapshotResult`] carrying the reason.

mod cache;
mod file;
mod pool;
mod service;

pub use cache::{ArtifactCache, CacheStats};
pub use file::{DeckArtifact, FileSnapshotFetcher};
pub use pool::{FetchPool, FetchReport};
pub use service::ComparisonService;

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::assembler::SnapshotRef;
use crate::types::SnapshotResult;

/// Default per-task extraction timeout.
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-task artifact load timeout.
pub const DEFAULT_ARTIFACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default artifact cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Stage of a fetch, for timeout reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    /// Loading and parsing the snapshot artifact.
    Artifact,
    /// Running the extraction over a loaded artifact.
    Extraction,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artifact => write!(f, "artifact load"),
            Self::Extraction => write!(f, "extraction"),
        }
    }
}

/// Why a snapshot could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// A stage exceeded its time budget.
    #[error("{stage} timed out after {}s", after.as_secs())]
    Timeout {
        /// Stage that timed out.
        stage: FetchStage,
        /// Budget that was exceeded.
        after: Duration,
    },
    /// No artifact exists for the snapshot id.
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),
    /// The artifact exists but could not be read.
    #[error("failed to read artifact {path}: {reason}")]
    Read {
        /// Artifact path.
        path: String,
        /// I/O error text.
        reason: String,
    },
    /// The artifact is not valid.
    #[error("failed to parse artifact {path}: {reason}")]
    Parse {
        /// Artifact path.
        path: String,
        /// Parser error text.
        reason: String,
    },
    /// The extraction itself reported a failure.
    #[error("extraction '{extraction_type}' failed: {reason}")]
    Extraction {
        /// Extraction type.
        extraction_type: String,
        /// Failure reason.
        reason: String,
    },
    /// The fetch task panicked or was cancelled.
    #[error("fetch task did not complete: {0}")]
    Join(String),
    /// The request deadline passed before the fetch finished.
    #[error("request deadline reached before the snapshot was fetched")]
    Deadline,
}

/// Source of snapshot extraction results.
///
/// A fetch runs in two stages, each under its own budget: [`load`] the
/// snapshot's artifact within `artifact_timeout`, then [`extract`] the
/// requested type from it within `extraction_timeout`.
///
/// Implementations must be cheap to share: the pool holds one behind an
/// `Arc` and calls it concurrently from worker tasks.
///
/// [`load`]: SnapshotFetcher::load
/// [`extract`]: SnapshotFetcher::extract
#[async_trait]
pub trait SnapshotFetcher: Send + Sync + 'static {
    /// A loaded snapshot artifact.
    type Artifact: Send + 'static;

    /// Load a snapshot's artifact.
    async fn load(
        &self,
        snapshot: &SnapshotRef,
        config: &FetchConfig,
    ) -> Result<Self::Artifact, FetchError>;

    /// Run an extraction over a loaded artifact.
    async fn extract(
        &self,
        artifact: Self::Artifact,
        snapshot: &SnapshotRef,
        extraction_type: &str,
    ) -> Result<SnapshotResult, FetchError>;

    /// Fetch one snapshot's extraction result, enforcing both stage budgets.
    async fn fetch(
        &self,
        snapshot: &SnapshotRef,
        extraction_type: &str,
        config: &FetchConfig,
    ) -> Result<SnapshotResult, FetchError> {
        let artifact = within(
            FetchStage::Artifact,
            config.artifact_timeout,
            self.load(snapshot, config),
        )
        .await?;

        within(
            FetchStage::Extraction,
            config.extraction_timeout,
            self.extract(artifact, snapshot, extraction_type),
        )
        .await
    }
}

async fn within<T>(
    stage: FetchStage,
    budget: Duration,
    work: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    match tokio::time::timeout(budget, work).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(%stage, budget_secs = budget.as_secs(), "fetch stage timed out");
            Err(FetchError::Timeout {
                stage,
                after: budget,
            })
        }
    }
}

/// Fetch-side configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Budget for running an extraction.
    pub extraction_timeout: Duration,
    /// Budget for loading an artifact.
    pub artifact_timeout: Duration,
    /// Deadline for the whole request; `None` waits for every fetch.
    pub request_timeout: Option<Duration>,
    /// Worker cap; `None` uses twice the available parallelism.
    pub max_workers: Option<usize>,
    /// Artifact cache capacity.
    pub cache_capacity: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
            artifact_timeout: DEFAULT_ARTIFACT_TIMEOUT,
            request_timeout: None,
            max_workers: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl FetchConfig {
    /// Read configuration from the environment.
    ///
    /// - `DECK_DIFF_EXTRACTION_TIMEOUT_SECS` (default 30)
    /// - `DECK_DIFF_ARTIFACT_TIMEOUT_SECS` (default 60)
    /// - `DECK_DIFF_REQUEST_TIMEOUT_SECS` (default: none)
    /// - `DECK_DIFF_MAX_WORKERS` (default: 2 × cores)
    /// - `DECK_DIFF_CACHE_CAPACITY` (default 64)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_positive("DECK_DIFF_EXTRACTION_TIMEOUT_SECS") {
            config.extraction_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = env_positive("DECK_DIFF_ARTIFACT_TIMEOUT_SECS") {
            config.artifact_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = env_positive("DECK_DIFF_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Some(Duration::from_secs(secs as u64));
        }
        if let Some(workers) = env_positive("DECK_DIFF_MAX_WORKERS") {
            config.max_workers = Some(workers);
        }
        if let Some(capacity) = env_positive("DECK_DIFF_CACHE_CAPACITY") {
            config.cache_capacity = capacity;
        }

        config
    }

    /// Worker count for a request of `snapshots` fetches:
    /// `min(snapshots, cap)`, at least one.
    pub fn workers_for(&self, snapshots: usize) -> usize {
        let cap = self.max_workers.unwrap_or_else(|| {
            2 * std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        snapshots.min(cap).max(1)
    }
}

fn env_positive(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!(variable = name, value = %raw, "ignoring invalid value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let config = FetchConfig::default();
        assert_eq!(config.extraction_timeout, Duration::from_secs(30));
        assert_eq!(config.artifact_timeout, Duration::from_secs(60));
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn test_workers_bounded_by_snapshots_and_cap() {
        let config = FetchConfig {
            max_workers: Some(4),
            ..FetchConfig::default()
        };
        assert_eq!(config.workers_for(2), 2);
        assert_eq!(config.workers_for(10), 4);
        assert_eq!(config.workers_for(0), 1);

        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert_eq!(FetchConfig::default().workers_for(1000), 2 * cores);
    }

    #[test]
    fn test_error_messages() {
        let timeout = FetchError::Timeout {
            stage: FetchStage::Artifact,
            after: Duration::from_secs(60),
        };
        assert_eq!(timeout.to_string(), "artifact load timed out after 60s");
        let timeout = FetchError::Timeout {
            stage: FetchStage::Extraction,
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.to_string(), "extraction timed out after 30s");
        assert!(FetchError::ArtifactNotFound("d.json".into()).to_string().contains("d.json"));
    }
}
