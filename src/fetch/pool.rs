//! Bounded fan-out of snapshot fetches.
//!
//! At most `workers` fetches run at once. Each completion frees a worker
//! for the next queued snapshot. Results are collected per task and put
//! back in declared order; nothing is shared between tasks except the
//! fetcher itself.
//!
//! Stage budgets are enforced by [`SnapshotFetcher::fetch`]; the pool only
//! applies the request deadline.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;

use super::{FetchConfig, FetchError, SnapshotFetcher};
use crate::assembler::{ComparisonRequest, SnapshotRef};
use crate::types::SnapshotResult;

/// Outcome of fetching every snapshot of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    /// One result per requested snapshot, in declared order.
    pub results: Vec<SnapshotResult>,
    /// The request deadline cut fetching short.
    pub incomplete: bool,
    /// Wall time spent fetching.
    pub elapsed: Duration,
}

impl FetchReport {
    /// Number of successful fetches.
    pub fn successes(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

/// Worker pool running a [`SnapshotFetcher`] over a request's snapshots.
pub struct FetchPool<F> {
    fetcher: Arc<F>,
    config: FetchConfig,
}

impl<F> Clone for FetchPool<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            config: self.config.clone(),
        }
    }
}

impl<F: SnapshotFetcher> FetchPool<F> {
    /// Create a pool.
    pub fn new(fetcher: F, config: FetchConfig) -> Self {
        Self::with_shared(Arc::new(fetcher), config)
    }

    /// Create a pool around a shared fetcher.
    pub fn with_shared(fetcher: Arc<F>, config: FetchConfig) -> Self {
        Self { fetcher, config }
    }

    /// The fetch configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The underlying fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch every snapshot of a request.
    ///
    /// Never fails: errors, timeouts, panics and deadline cancellation all
    /// become failed [`SnapshotResult`]s.
    pub async fn fetch_all(&self, request: &ComparisonRequest) -> FetchReport {
        let started = Instant::now();
        let snapshots = request.snapshots();
        let workers = self.config.workers_for(snapshots.len());
        let deadline = self.config.request_timeout.map(|budget| started + budget);

        tracing::debug!(snapshots = snapshots.len(), workers, "fetching snapshots");

        let mut slots: Vec<Option<SnapshotResult>> = (0..snapshots.len()).map(|_| None).collect();
        let mut queue = snapshots.iter().cloned().enumerate();
        let mut tasks = JoinSet::new();
        let mut incomplete = false;

        for (position, snapshot) in queue.by_ref().take(workers) {
            self.spawn(&mut tasks, position, snapshot, request.extraction_type());
        }

        loop {
            let joined = match deadline {
                Some(deadline) => {
                    let waited = timeout_at(deadline, tasks.join_next()).await;
                    match waited {
                        Ok(joined) => joined,
                        Err(_) => {
                            tracing::warn!(
                                pending = tasks.len(),
                                "request deadline reached, cancelling remaining fetches"
                            );
                            tasks.abort_all();
                            incomplete = true;
                            break;
                        }
                    }
                }
                None => tasks.join_next().await,
            };

            match joined {
                None => break,
                Some(Ok((position, result))) => slots[position] = Some(result),
                Some(Err(e)) => tracing::error!(error = %e, "fetch task did not complete"),
            }

            if let Some((position, snapshot)) = queue.next() {
                self.spawn(&mut tasks, position, snapshot, request.extraction_type());
            }
        }

        let results = slots
            .into_iter()
            .zip(snapshots)
            .map(|(slot, snapshot)| {
                slot.unwrap_or_else(|| {
                    let reason = if incomplete {
                        FetchError::Deadline
                    } else {
                        FetchError::Join("task panicked or was cancelled".to_string())
                    };
                    SnapshotResult::failed(&snapshot.id, &snapshot.display_name, reason.to_string())
                })
            })
            .collect();

        FetchReport {
            results,
            incomplete,
            elapsed: started.elapsed(),
        }
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<(usize, SnapshotResult)>,
        position: usize,
        snapshot: SnapshotRef,
        extraction_type: &str,
    ) {
        let fetcher = Arc::clone(&self.fetcher);
        let config = self.config.clone();
        let extraction_type = extraction_type.to_string();
        let span = tracing::info_span!("fetch_snapshot", snapshot = %snapshot.id, position);

        tasks.spawn(
            async move {
                let started = Instant::now();
                let result = match fetcher.fetch(&snapshot, &extraction_type, &config).await {
                    Ok(result) => result,
                    Err(e) => {
                        SnapshotResult::failed(&snapshot.id, &snapshot.display_name, e.to_string())
                    }
                };

                tracing::debug!(
                    success = result.success,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "snapshot fetch finished"
                );
                (position, result)
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchStage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps `delay_ms` per snapshot and fails ids starting with "bad".
    /// "slow_load" stalls loading for two minutes, "slow_extract" stalls
    /// extraction for 45 seconds.
    struct ScriptedFetcher {
        delay_ms: u64,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(delay_ms: u64) -> Self {
            Self {
                delay_ms,
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SnapshotFetcher for ScriptedFetcher {
        type Artifact = String;

        async fn load(
            &self,
            snapshot: &SnapshotRef,
            _config: &FetchConfig,
        ) -> Result<String, FetchError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = if snapshot.id == "slow_load" { 120_000 } else { self.delay_ms };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if snapshot.id.starts_with("bad") {
                return Err(FetchError::ArtifactNotFound(snapshot.id.clone()));
            }
            Ok(snapshot.id.clone())
        }

        async fn extract(
            &self,
            artifact: String,
            snapshot: &SnapshotRef,
            _extraction_type: &str,
        ) -> Result<SnapshotResult, FetchError> {
            if artifact == "slow_extract" {
                tokio::time::sleep(Duration::from_secs(45)).await;
            }
            Ok(SnapshotResult::ok(&snapshot.id, &snapshot.display_name, BTreeMap::new())
                .with_field("rows", json!([{"code": artifact}])))
        }
    }

    fn request(ids: &[&str]) -> ComparisonRequest {
        ComparisonRequest::new("test", ids.iter().copied()).unwrap()
    }

    #[tokio::test]
    async fn test_results_in_declared_order() {
        let pool = FetchPool::new(ScriptedFetcher::new(5), FetchConfig::default());
        let report = pool.fetch_all(&request(&["c", "a", "bad1", "b"])).await;

        let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "bad1", "b"]);
        assert_eq!(report.successes(), 3);
        assert!(!report.incomplete);
        assert!(report.results[2].error.as_deref().unwrap_or("").contains("not found"));
    }

    #[tokio::test]
    async fn test_worker_bound_is_respected() {
        let config = FetchConfig {
            max_workers: Some(2),
            ..FetchConfig::default()
        };
        let pool = FetchPool::new(ScriptedFetcher::new(20), config);
        let report = pool.fetch_all(&request(&["a", "b", "c", "d", "e", "f"])).await;

        assert_eq!(report.successes(), 6);
        assert!(pool.fetcher().peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_timeout_marks_failure() {
        let config = FetchConfig {
            extraction_timeout: Duration::from_secs(1),
            artifact_timeout: Duration::from_secs(1),
            ..FetchConfig::default()
        };
        let pool = FetchPool::new(ScriptedFetcher::new(1), config);
        let report = pool.fetch_all(&request(&["a", "slow_load"])).await;

        assert!(report.results[0].success);
        assert!(!report.results[1].success);
        assert!(report.results[1].error.as_deref().unwrap_or("").contains("timed out"));
        assert!(!report.incomplete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_budgets_apply_per_stage() {
        let pool = FetchPool::new(ScriptedFetcher::new(10), FetchConfig::default());
        let report = pool
            .fetch_all(&request(&["a", "slow_extract", "slow_load"]))
            .await;

        assert!(report.results[0].success);
        let extraction = FetchError::Timeout {
            stage: FetchStage::Extraction,
            after: Duration::from_secs(30),
        };
        assert!(!report.results[1].success);
        assert_eq!(report.results[1].error.as_deref(), Some(extraction.to_string().as_str()));

        let artifact = FetchError::Timeout {
            stage: FetchStage::Artifact,
            after: Duration::from_secs(60),
        };
        assert!(!report.results[2].success);
        assert_eq!(report.results[2].error.as_deref(), Some(artifact.to_string().as_str()));
        assert!(!report.incomplete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_within_budget_succeeds() {
        let config = FetchConfig {
            extraction_timeout: Duration::from_secs(50),
            ..FetchConfig::default()
        };
        let pool = FetchPool::new(ScriptedFetcher::new(10), config);
        let report = pool.fetch_all(&request(&["slow_extract"])).await;

        assert!(report.results[0].success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_completed_results() {
        let config = FetchConfig {
            request_timeout: Some(Duration::from_secs(5)),
            ..FetchConfig::default()
        };
        let pool = FetchPool::new(ScriptedFetcher::new(10), config);
        let report = pool.fetch_all(&request(&["a", "slow_load", "b"])).await;

        assert!(report.incomplete);
        assert!(report.results[0].success);
        assert!(!report.results[1].success);
        assert!(report.results[2].success);
        assert_eq!(
            report.results[1].error.as_deref(),
            Some(FetchError::Deadline.to_string().as_str())
        );
    }
}
