//! File-backed snapshot fetcher.
//!
//! One JSON artifact per deck, `<root>/<id>.json`:
//!
//! ```json
//! {
//!   "displayName": "NW 2024-03",
//!   "asOf": "2024-03-01",
//!   "extractions": {
//!     "plant_capacity": { "plants": [ { "code": 1, "capacity_mw": 30.0 } ] }
//!   },
//!   "failures": { "unit_costs": "cost table missing from deck" }
//! }
//! ```
//!
//! An artifact is parsed once and shared through the [`ArtifactCache`]
//! across every extraction type requested from it.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ArtifactCache, CacheStats, FetchConfig, FetchError, SnapshotFetcher};
use crate::assembler::SnapshotRef;
use crate::types::SnapshotResult;

/// A parsed deck artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckArtifact {
    /// Display name; the request's name is used when absent.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Reference date of the deck.
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    /// Extraction type → payload fields.
    #[serde(default)]
    pub extractions: BTreeMap<String, BTreeMap<String, Value>>,
    /// Extraction type → recorded failure reason.
    #[serde(default)]
    pub failures: BTreeMap<String, String>,
}

impl DeckArtifact {
    /// Run an extraction over the artifact.
    ///
    /// A type the artifact has no payload for yields an empty payload: the
    /// comparison then sees an empty table rather than a failure.
    pub fn extract(
        &self,
        snapshot: &SnapshotRef,
        extraction_type: &str,
    ) -> Result<SnapshotResult, FetchError> {
        if let Some(reason) = self.failures.get(extraction_type) {
            return Err(FetchError::Extraction {
                extraction_type: extraction_type.to_string(),
                reason: reason.clone(),
            });
        }

        let fields = match self.extractions.get(extraction_type) {
            Some(fields) => fields.clone(),
            None => {
                tracing::warn!(
                    snapshot = %snapshot.id,
                    extraction_type,
                    "artifact has no payload for extraction type"
                );
                BTreeMap::new()
            }
        };

        let display_name = self
            .display_name
            .clone()
            .filter(|_| snapshot.display_name == snapshot.id)
            .unwrap_or_else(|| snapshot.display_name.clone());

        let mut result = SnapshotResult::ok(&snapshot.id, display_name, fields);
        result.as_of = self.as_of;
        Ok(result)
    }
}

/// Reads deck artifacts from a directory.
pub struct FileSnapshotFetcher {
    root: PathBuf,
    cache: ArtifactCache<DeckArtifact>,
}

impl FileSnapshotFetcher {
    /// Create a fetcher over `root` with a cache of `cache_capacity`.
    pub fn new(root: impl Into<PathBuf>, cache_capacity: usize) -> Self {
        Self {
            root: root.into(),
            cache: ArtifactCache::new(cache_capacity),
        }
    }

    /// Artifact directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Path of a snapshot's artifact.
    ///
    /// Ids that would escape the artifact directory are rejected.
    pub fn artifact_path(&self, id: &str) -> Result<PathBuf, FetchError> {
        let id = id.trim();
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(FetchError::ArtifactNotFound(id.to_string()));
        }
        Ok(self.root.join(format!("{}.json", id)))
    }

    async fn load_path(&self, path: PathBuf) -> Result<Arc<DeckArtifact>, FetchError> {
        let key = path.clone();
        self.cache
            .get_or_try_load(&key, || async move {
                tokio::task::spawn_blocking(move || read_artifact(&path))
                    .await
                    .map_err(|e| FetchError::Join(e.to_string()))?
            })
            .await
    }
}

fn read_artifact(path: &Path) -> Result<DeckArtifact, FetchError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => FetchError::ArtifactNotFound(display.clone()),
        _ => FetchError::Read {
            path: display.clone(),
            reason: e.to_string(),
        },
    })?;
    serde_json::from_str(&raw).map_err(|e| FetchError::Parse {
        path: display,
        reason: e.to_string(),
    })
}

#[async_trait]
impl SnapshotFetcher for FileSnapshotFetcher {
    type Artifact = Arc<DeckArtifact>;

    async fn load(
        &self,
        snapshot: &SnapshotRef,
        _config: &FetchConfig,
    ) -> Result<Arc<DeckArtifact>, FetchError> {
        let path = self.artifact_path(&snapshot.id)?;
        self.load_path(path).await
    }

    async fn extract(
        &self,
        artifact: Arc<DeckArtifact>,
        snapshot: &SnapshotRef,
        extraction_type: &str,
    ) -> Result<SnapshotResult, FetchError> {
        let snapshot = snapshot.clone();
        let extraction_type = extraction_type.to_string();
        tokio::task::spawn_blocking(move || artifact.extract(&snapshot, &extraction_type))
            .await
            .map_err(|e| FetchError::Join(e.to_string()))?
    }
}
