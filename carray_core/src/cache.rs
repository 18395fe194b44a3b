//! Bounded cache of decompressed chunks.
//!
//! Keyed by chunk index, most-recent-wins eviction. The default capacity of 1
//! keeps just the last decompressed chunk, which is enough to make sequential
//! item access decompress every chunk once. A capacity of 0 disables caching.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;
use tracing::trace;

use crate::error::Result;
use crate::store::ChunkStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub capacity: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct ChunkCache {
    capacity: usize,
    entries: Mutex<Option<LruCache<usize, Arc<Vec<u8>>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChunkCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(NonZeroUsize::new(capacity).map(LruCache::new)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Option<LruCache<usize, Arc<Vec<u8>>>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decompressed contents of chunk `index`, loading it from `store` on a miss.
    pub fn get(&self, index: usize, store: &ChunkStore) -> Result<Arc<Vec<u8>>> {
        if let Some(cache) = self.lock().as_mut() {
            if let Some(hit) = cache.get(&index) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(chunk = index, "chunk cache hit");
                return Ok(Arc::clone(hit));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(chunk = index, "chunk cache miss");
        let raw = Arc::new(store.decompress(index)?);
        if let Some(cache) = self.lock().as_mut() {
            cache.put(index, Arc::clone(&raw));
        }
        Ok(raw)
    }

    pub fn invalidate(&self, index: usize) {
        if let Some(cache) = self.lock().as_mut() {
            cache.pop(&index);
        }
    }

    /// Drop every entry for chunk `index` and above.
    pub fn invalidate_from(&self, index: usize) {
        if let Some(cache) = self.lock().as_mut() {
            let stale: Vec<usize> = cache.iter().map(|(k, _)| *k).filter(|k| *k >= index).collect();
            for k in stale {
                cache.pop(&k);
            }
        }
    }

    pub fn clear(&self) {
        if let Some(cache) = self.lock().as_mut() {
            cache.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.capacity,
            entries: self.lock().as_ref().map_or(0, |c| c.len()),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// A clone starts cold: same capacity, no entries, zeroed counters.
impl Clone for ChunkCache {
    fn clone(&self) -> Self {
        ChunkCache::new(self.capacity)
    }
}

impl std::fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCache").field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::Raw;
    use crate::config::CParams;
    use crate::dtype::{DType, ScalarKind};

    /// Three full chunks of two `i32` items each.
    fn store() -> ChunkStore {
        let mut store =
            ChunkStore::new(Arc::new(Raw), CParams::default(), DType::scalar(ScalarKind::Int32), 2).unwrap();
        let raw: Vec<u8> = (0..6i32).flat_map(|v| v.to_le_bytes()).collect();
        store.append(&raw).unwrap();
        store
    }

    fn warm(cache: &ChunkCache, store: &ChunkStore) {
        for i in 0..3 {
            cache.get(i, store).unwrap();
        }
    }

    #[test]
    fn hits_after_first_load() {
        let store = store();
        let cache = ChunkCache::new(3);
        warm(&cache, &store);
        let first = cache.get(1, &store).unwrap();
        assert_eq!(first.as_slice(), [2i32, 3].map(i32::to_le_bytes).concat());
        assert_eq!(
            cache.stats(),
            CacheStats { capacity: 3, entries: 3, hits: 1, misses: 3 }
        );
    }

    #[test]
    fn invalidation_forces_reload() {
        let store = store();
        let cache = ChunkCache::new(3);
        warm(&cache, &store);

        cache.invalidate(0);
        assert_eq!(cache.stats().entries, 2);
        cache.get(0, &store).unwrap();
        assert_eq!(cache.stats().misses, 4);

        cache.invalidate_from(1);
        assert_eq!(cache.stats().entries, 1);
        cache.get(0, &store).unwrap();
        assert_eq!(cache.stats().hits, 1);
        cache.get(2, &store).unwrap();
        assert_eq!(cache.stats().misses, 5);

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
        cache.get(0, &store).unwrap();
        assert_eq!(cache.stats().misses, 6);
    }

    #[test]
    fn zero_capacity_never_holds_entries() {
        let store = store();
        let cache = ChunkCache::new(0);
        warm(&cache, &store);
        warm(&cache, &store);
        let stats = cache.stats();
        assert_eq!((stats.entries, stats.hits, stats.misses), (0, 0, 6));
    }

    #[test]
    fn least_recent_entry_is_evicted() {
        let store = store();
        let cache = ChunkCache::new(2);
        warm(&cache, &store);
        cache.get(2, &store).unwrap();
        assert_eq!(cache.stats().hits, 1);
        cache.get(0, &store).unwrap();
        assert_eq!(cache.stats().misses, 4);
    }
}
