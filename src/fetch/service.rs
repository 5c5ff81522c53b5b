//! End-to-end comparison service: request → fetch → assemble.

use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::{FetchConfig, FetchPool, SnapshotFetcher};
use crate::assembler::{ComparisonRequest, RequestError, ResponseAssembler};
use crate::policy::ComparisonPolicy;
use crate::registry::ComparatorRegistry;
use crate::types::ComparisonResponse;

/// Runs comparison requests against a [`SnapshotFetcher`].
pub struct ComparisonService<F> {
    pool: FetchPool<F>,
    assembler: ResponseAssembler,
}

impl<F> Clone for ComparisonService<F> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            assembler: self.assembler.clone(),
        }
    }
}

impl<F: SnapshotFetcher> ComparisonService<F> {
    /// Create a service.
    pub fn new(
        fetcher: F,
        registry: Arc<ComparatorRegistry>,
        policy: ComparisonPolicy,
        config: FetchConfig,
    ) -> Self {
        Self {
            pool: FetchPool::new(fetcher, config),
            assembler: ResponseAssembler::new(registry, policy),
        }
    }

    /// Create a service with the default registry and environment config.
    pub fn from_env(fetcher: F) -> Self {
        Self::new(
            fetcher,
            Arc::new(ComparatorRegistry::with_defaults()),
            ComparisonPolicy::from_env(),
            FetchConfig::from_env(),
        )
    }

    /// The fetch pool.
    pub fn pool(&self) -> &FetchPool<F> {
        &self.pool
    }

    /// The response assembler.
    pub fn assembler(&self) -> &ResponseAssembler {
        &self.assembler
    }

    /// Run a validated request.
    pub async fn compare(&self, request: &ComparisonRequest) -> ComparisonResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "comparison",
            %request_id,
            extraction_type = request.extraction_type(),
            snapshots = request.snapshots().len()
        );

        async {
            let started = Instant::now();

            let report = self.pool.fetch_all(request).await;
            let response = self
                .assembler
                .assemble_request(request, &report.results, report.incomplete);

            tracing::info!(
                target: "deck_diff_kernel::metrics",
                metric_type = "comparison",
                comparator = %response.comparator,
                snapshots = request.snapshots().len(),
                fetched = report.successes(),
                total_changes = response.stats.total_changes,
                incomplete = response.incomplete,
                fetch_ms = report.elapsed.as_millis() as u64,
                latency_ms = started.elapsed().as_millis() as u64,
                "comparison_metric"
            );

            response
        }
        .instrument(span)
        .await
    }

    /// Validate and run a request given as raw ids.
    pub async fn compare_ids<I, S>(
        &self,
        extraction_type: &str,
        snapshot_ids: I,
    ) -> Result<ComparisonResponse, RequestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = ComparisonRequest::new(extraction_type, snapshot_ids)?;
        Ok(self.compare(&request).await)
    }
}
