//! Shared artifact cache.
//!
//! Parsed artifacts are expensive and the same deck is typically compared
//! under several extraction types. The cache is a bounded LRU keyed by
//! artifact path; each entry is a `OnceCell`, so concurrent requests for
//! the same path load it at most once. The LRU lock is held only to look up
//! or insert the cell, never across the load.

use lru::LruCache;
use parking_lot::Mutex;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::DEFAULT_CACHE_CAPACITY;

type Slot<V> = Arc<OnceCell<Arc<V>>>;

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
    /// Lookups served without loading.
    pub hits: u64,
    /// Lookups that ran a load.
    pub misses: u64,
}

/// Bounded LRU of loaded artifacts with at-most-once population per key.
pub struct ArtifactCache<V> {
    entries: Mutex<LruCache<PathBuf, Slot<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Send + Sync> ArtifactCache<V> {
    /// Create a cache holding up to `capacity` artifacts.
    ///
    /// A zero capacity falls back to the default.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached artifact for `path`, loading it with `load` on a
    /// miss.
    ///
    /// A failed load leaves the entry empty; the next lookup retries.
    pub async fn get_or_try_load<F, Fut, E>(&self, path: &Path, load: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(path);

        let mut loaded = false;
        let value = slot
            .get_or_try_init(|| {
                loaded = true;
                async move { load().await.map(Arc::new) }
            })
            .await?;

        if loaded {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        Ok(Arc::clone(value))
    }

    fn slot(&self, path: &Path) -> Slot<V> {
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get(path) {
            return Arc::clone(slot);
        }
        let slot: Slot<V> = Arc::new(OnceCell::new());
        entries.put(path.to_path_buf(), Arc::clone(&slot));
        slot
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            len: entries.len(),
            cap: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_loads_once_then_hits() {
        let cache: ArtifactCache<String> = ArtifactCache::new(4);
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_load(Path::new("a.json"), || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("deck a".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value.as_str(), "deck a");
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.len, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let cache: ArtifactCache<u32> = ArtifactCache::new(4);

        let first = cache
            .get_or_try_load(Path::new("b.json"), || async { Err::<u32, _>("boom") })
            .await;
        assert_eq!(first.unwrap_err(), "boom");

        let second = cache
            .get_or_try_load(Path::new("b.json"), || async { Ok::<_, &str>(7) })
            .await
            .unwrap();
        assert_eq!(*second, 7);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let cache: ArtifactCache<usize> = ArtifactCache::new(2);
        for i in 0..5 {
            let path = PathBuf::from(format!("{}.json", i));
            cache
                .get_or_try_load(&path, || async move { Ok::<_, ()>(i) })
                .await
                .unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.len, 2);
        assert_eq!(stats.cap, 2);

        cache.clear();
        assert_eq!(cache.stats().len, 0);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_population() {
        let cache: Arc<ArtifactCache<u64>> = Arc::new(ArtifactCache::new(8));
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_load(Path::new("shared.json"), || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok::<_, ()>(42)
                    })
                    .await
                    .map(|v| *v)
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
