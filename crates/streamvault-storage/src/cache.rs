//! Block Cache with Pin Counting and LRU Eviction
//!
//! This module implements an in-memory cache for materialized data blocks,
//! shared by every stream reader in the process.
//!
//! ## The Problem
//!
//! Remote object storage has high latency (~50-200ms per GET). Sequential
//! consumers re-read the same blocks (a read seldom ends exactly on a block
//! boundary), and readahead loads blocks before any consumer touches them.
//! Both only pay off if a loaded block stays resident until it is consumed.
//!
//! ## The Solution
//!
//! Each cached block carries two pieces of consumer state:
//!
//! - **pins**: a reference count. Every [`BlockCache::get_block`] call pins
//!   the block exactly once; the caller releases it exactly once. A pinned
//!   block is never evicted.
//! - **read**: whether a consumer has finished with the block. The flag
//!   makes a block *reclaimable*; actual freeing happens lazily, under size
//!   pressure, so a block that is read again before pressure arrives is
//!   still a hit.
//!
//! Eviction walks blocks in LRU order and frees any unpinned one - including
//! **unread** blocks that no consumer has seen yet. Waiters on
//! [`DataBlock::free_future`] learn about it; stream readers use that signal
//! to shrink their readahead.
//!
//! ## Load Coalescing
//!
//! Concurrent `get_block` calls for the same `(object, block)` key share one
//! load through a shared future, so a block is fetched from the object store
//! once no matter how many readers race for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use streamvault_core::{DataBlockIndex, RecordBatch};
use streamvault_observability::metrics;

use crate::error::Result;
use crate::object::ObjectReader;

/// Cache key: (object id, block start offset)
pub type BlockKey = (u64, u64);

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<DataBlock>>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum total size of cached blocks in bytes (default: 128MB)
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
        }
    }
}

fn default_max_size_bytes() -> u64 {
    128 * 1024 * 1024 // 128MB
}

/// Shared cache of materialized data blocks
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct BlockCache {
    shared: Arc<CacheShared>,
}

struct CacheShared {
    max_size_bytes: u64,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    slots: HashMap<BlockKey, Arc<DataBlock>>,

    /// Recency tracker: maps key -> size, in access order
    lru: LruCache<BlockKey, u64>,

    current_size: u64,

    /// In-flight loads, for coalescing concurrent gets of the same block
    inflight: HashMap<BlockKey, SharedLoad>,
}

impl BlockCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                max_size_bytes: config.max_size_bytes,
                inner: Mutex::new(CacheInner {
                    slots: HashMap::new(),
                    lru: LruCache::unbounded(),
                    current_size: 0,
                    inflight: HashMap::new(),
                }),
            }),
        }
    }

    /// Get a block, loading it through `reader` on a miss.
    ///
    /// Every successful call increments the block's pin count by exactly one;
    /// the caller must balance it with one [`DataBlock::release`].
    pub async fn get_block(
        &self,
        reader: Arc<dyn ObjectReader>,
        index: DataBlockIndex,
    ) -> Result<Arc<DataBlock>> {
        let key = (reader.object_id(), index.start_offset);
        let load = {
            let mut inner = self.shared.inner.lock().unwrap();
            if let Some(block) = inner.slots.get(&key).cloned() {
                inner.lru.get(&key);
                metrics::BLOCK_CACHE_HITS_TOTAL.inc();
                tracing::debug!(object_id = key.0, start_offset = key.1, "block cache hit");
                block.pin();
                return Ok(block);
            }
            if let Some(load) = inner.inflight.get(&key) {
                load.clone()
            } else {
                metrics::BLOCK_CACHE_MISSES_TOTAL.inc();
                tracing::debug!(
                    object_id = key.0,
                    start_offset = key.1,
                    "block cache miss, loading from object store"
                );
                let shared = Arc::clone(&self.shared);
                let load: SharedLoad = async move {
                    let records = reader.read_block(&index).await?;
                    Ok(shared.insert(key, index, records))
                }
                .boxed()
                .shared();
                inner.inflight.insert(key, load.clone());
                load
            }
        };
        let loaded = load.clone().await;
        {
            let mut inner = self.shared.inner.lock().unwrap();
            // only the future we actually drove may be cleared; a newer load
            // for the same key (after a free) must stay
            let same = inner
                .inflight
                .get(&key)
                .map(|inflight| inflight.ptr_eq(&load))
                .unwrap_or(false);
            if same {
                inner.inflight.remove(&key);
            }
        }
        let block = loaded?;
        block.pin();
        Ok(block)
    }

    /// Cache statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.shared.inner.lock().unwrap();
        let pinned_count = inner.slots.values().filter(|b| b.is_pinned()).count();
        CacheStats {
            current_size: inner.current_size,
            max_size: self.shared.max_size_bytes,
            entry_count: inner.slots.len(),
            pinned_count,
            utilization_pct: inner.current_size as f64 / self.shared.max_size_bytes as f64
                * 100.0,
        }
    }
}

impl CacheShared {
    /// Insert a freshly loaded block, evicting LRU blocks if necessary
    fn insert(&self, key: BlockKey, index: DataBlockIndex, records: Vec<RecordBatch>) -> Arc<DataBlock> {
        let size: u64 = records.iter().map(|r| r.size() as u64).sum();
        let block = Arc::new(DataBlock {
            key,
            index,
            records,
            size,
            state: Mutex::new(BlockState {
                pins: 0,
                read: false,
                freed: false,
                free_waiters: Vec::new(),
            }),
        });
        let evicted = {
            let mut inner = self.inner.lock().unwrap();
            let evicted = inner.evict_for(size, self.max_size_bytes);
            inner.slots.insert(key, Arc::clone(&block));
            inner.lru.put(key, size);
            inner.current_size += size;
            metrics::BLOCK_CACHE_SIZE_BYTES.set(inner.current_size as i64);
            evicted
        };
        // fire free notifications outside the cache lock
        for freed in evicted {
            freed.complete_free();
        }
        block
    }
}

impl CacheInner {
    /// Evict unpinned LRU blocks until `needed` bytes fit. Pinned blocks are
    /// skipped and keep their slot; unread blocks are fair game, which is the
    /// signal readahead throttling relies on.
    fn evict_for(&mut self, needed: u64, max_size_bytes: u64) -> Vec<Arc<DataBlock>> {
        let mut skipped: Vec<(BlockKey, u64)> = Vec::new();
        let mut evicted = Vec::new();
        while self.current_size + needed > max_size_bytes {
            let Some((key, size)) = self.lru.pop_lru() else {
                if evicted.is_empty() && skipped.is_empty() {
                    tracing::warn!(
                        needed,
                        max_size = max_size_bytes,
                        "cannot cache: block larger than max cache size"
                    );
                }
                break;
            };
            let Some(block) = self.slots.get(&key).cloned() else {
                self.current_size = self.current_size.saturating_sub(size);
                continue;
            };
            if block.is_pinned() {
                skipped.push((key, size));
                continue;
            }
            self.slots.remove(&key);
            self.current_size = self.current_size.saturating_sub(size);
            metrics::BLOCK_CACHE_EVICTIONS_TOTAL.inc();
            tracing::debug!(
                object_id = key.0,
                start_offset = key.1,
                size,
                "evicted block under cache pressure"
            );
            evicted.push(block);
        }
        // pinned blocks stay resident; put them back as most-recent
        for (key, size) in skipped {
            self.lru.put(key, size);
        }
        metrics::BLOCK_CACHE_SIZE_BYTES.set(self.current_size as i64);
        evicted
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Current total size of cached blocks
    pub current_size: u64,

    /// Maximum allowed cache size
    pub max_size: u64,

    /// Number of cached blocks
    pub entry_count: usize,

    /// Number of cached blocks currently pinned by readers
    pub pinned_count: usize,

    /// Cache utilization percentage (0-100)
    pub utilization_pct: f64,
}

#[derive(Debug)]
struct BlockState {
    pins: u32,
    read: bool,
    freed: bool,
    free_waiters: Vec<oneshot::Sender<()>>,
}

/// A materialized data block owned by the cache
#[derive(Debug)]
pub struct DataBlock {
    key: BlockKey,
    index: DataBlockIndex,
    records: Vec<RecordBatch>,
    size: u64,
    state: Mutex<BlockState>,
}

impl DataBlock {
    pub fn object_id(&self) -> u64 {
        self.key.0
    }

    pub fn index(&self) -> DataBlockIndex {
        self.index
    }

    /// Total byte footprint of the block's batches
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Record batches intersecting `[start_offset, end_offset)`, in offset
    /// order, stopping after the batch that crosses the `max_bytes` budget.
    pub fn get_records(
        &self,
        start_offset: u64,
        end_offset: u64,
        max_bytes: usize,
    ) -> Vec<RecordBatch> {
        let mut remaining = max_bytes.min(i64::MAX as usize) as i64;
        let mut out = Vec::new();
        for batch in &self.records {
            if batch.end_offset() <= start_offset {
                continue;
            }
            if batch.first_offset() >= end_offset {
                break;
            }
            if remaining <= 0 {
                break;
            }
            remaining -= batch.size() as i64;
            out.push(batch.clone());
        }
        out
    }

    /// Increment the pin count
    pub(crate) fn pin(&self) {
        let mut state = self.state.lock().unwrap();
        state.pins += 1;
    }

    /// Decrement the pin count
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.pins > 0, "unbalanced block release");
        state.pins = state.pins.saturating_sub(1);
    }

    /// Consumer is not done with this block yet
    pub fn mark_unread(&self) {
        self.state.lock().unwrap().read = false;
    }

    /// Consumer is done: once the last pin drops the cache may evict this
    /// block without losing anything
    pub fn mark_read(&self) {
        self.state.lock().unwrap().read = true;
    }

    /// Resolves when the cache frees this block
    pub fn free_future(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().unwrap();
        if state.freed {
            drop(state);
            let _ = tx.send(());
        } else {
            state.free_waiters.push(tx);
        }
        rx
    }

    pub fn is_pinned(&self) -> bool {
        self.state.lock().unwrap().pins > 0
    }

    pub fn is_read(&self) -> bool {
        self.state.lock().unwrap().read
    }

    pub fn is_freed(&self) -> bool {
        self.state.lock().unwrap().freed
    }

    /// Mark freed and notify waiters. Idempotent.
    fn complete_free(&self) {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            if state.freed {
                return;
            }
            state.freed = true;
            std::mem::take(&mut state.free_waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::object::{InMemoryObjectManager, ObjectManager, ObjectReaderFactory};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn batch(base: u64, count: u32, size: usize) -> RecordBatch {
        RecordBatch::new(base, count, Bytes::from(vec![0u8; size]))
    }

    /// One object with `n` blocks of 50 offsets / 50 bytes each
    fn fixture(n: u64) -> (InMemoryObjectManager, Vec<DataBlockIndex>) {
        let manager = InMemoryObjectManager::new();
        let mut blocks = Vec::new();
        let mut indexes = Vec::new();
        for i in 0..n {
            let index = DataBlockIndex::new(i * 50, (i + 1) * 50, 50);
            indexes.push(index);
            blocks.push((index, vec![batch(i * 50, 50, 50)]));
        }
        manager.commit_object(1, 10, blocks);
        (manager, indexes)
    }

    async fn open_reader(manager: &InMemoryObjectManager) -> Arc<dyn ObjectReader> {
        let meta = manager.get_objects(1, 0, None, 1).await.unwrap().remove(0);
        manager.open(&meta)
    }

    #[tokio::test]
    async fn test_load_and_hit() {
        let (manager, indexes) = fixture(2);
        let cache = BlockCache::new(CacheConfig::default());
        let reader = open_reader(&manager).await;

        let first = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap();
        assert_eq!(cache.stats().entry_count, 1);

        // second get returns the same block
        let second = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().pinned_count, 1);

        first.release();
        second.release();
        assert_eq!(cache.stats().pinned_count, 0);
    }

    #[tokio::test]
    async fn test_read_blocks_stay_resident_until_pressure() {
        let (manager, indexes) = fixture(1);
        let cache = BlockCache::new(CacheConfig::default());
        let reader = open_reader(&manager).await;

        let block = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap();
        block.mark_read();
        block.release();

        // no pressure: the read block stays cached and serves later hits
        assert_eq!(cache.stats().entry_count, 1);
        let again = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&block, &again));
        again.release();
    }

    #[tokio::test]
    async fn test_eviction_frees_unread_lru_block() {
        let (manager, indexes) = fixture(4);
        // room for two 50-byte blocks
        let cache = BlockCache::new(CacheConfig {
            max_size_bytes: 100,
        });
        let reader = open_reader(&manager).await;

        let first = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap();
        let free = first.free_future();
        first.release();

        let second = cache
            .get_block(Arc::clone(&reader), indexes[1])
            .await
            .unwrap();
        second.release();
        let third = cache
            .get_block(Arc::clone(&reader), indexes[2])
            .await
            .unwrap();
        third.release();

        // first (LRU, unread, unpinned) was evicted to make room for third
        free.await.expect("free notification");
        assert!(first.is_freed());
        assert!(!second.is_freed());
        assert_eq!(cache.stats().entry_count, 2);
    }

    #[tokio::test]
    async fn test_eviction_skips_pinned_blocks() {
        let (manager, indexes) = fixture(3);
        let cache = BlockCache::new(CacheConfig {
            max_size_bytes: 100,
        });
        let reader = open_reader(&manager).await;

        // keep the first block pinned
        let pinned = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap();

        let second = cache
            .get_block(Arc::clone(&reader), indexes[1])
            .await
            .unwrap();
        second.release();
        let third = cache
            .get_block(Arc::clone(&reader), indexes[2])
            .await
            .unwrap();
        third.release();

        // the pinned block survived; the unpinned LRU block was evicted
        assert!(!pinned.is_freed());
        assert!(second.is_freed());

        pinned.release();
    }

    #[tokio::test]
    async fn test_free_future_resolves_if_already_freed() {
        let (manager, indexes) = fixture(3);
        let cache = BlockCache::new(CacheConfig {
            max_size_bytes: 100,
        });
        let reader = open_reader(&manager).await;

        let first = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap();
        first.release();
        // push two more blocks to evict the first
        for i in [1usize, 2] {
            let block = cache
                .get_block(Arc::clone(&reader), indexes[i])
                .await
                .unwrap();
            block.release();
        }
        assert!(first.is_freed());

        // registering after the free still resolves
        first.free_future().await.expect("free notification");
    }

    #[tokio::test]
    async fn test_evicted_then_reloaded_is_new_handle() {
        let (manager, indexes) = fixture(3);
        let cache = BlockCache::new(CacheConfig {
            max_size_bytes: 100,
        });
        let reader = open_reader(&manager).await;

        let first = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap();
        first.release();
        // push two more blocks to evict the first
        for i in [1usize, 2] {
            let block = cache
                .get_block(Arc::clone(&reader), indexes[i])
                .await
                .unwrap();
            block.release();
        }
        assert!(first.is_freed());

        let reloaded = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        reloaded.release();
    }

    #[tokio::test]
    async fn test_concurrent_gets_coalesce_into_one_load() {
        struct CountingReader {
            inner: Arc<dyn ObjectReader>,
            loads: Arc<AtomicU32>,
        }
        #[async_trait::async_trait]
        impl ObjectReader for CountingReader {
            fn object_id(&self) -> u64 {
                self.inner.object_id()
            }
            async fn find(
                &self,
                stream_id: u64,
                start_offset: u64,
                end_offset: Option<u64>,
                max_bytes: usize,
            ) -> Result<crate::object::FindResult> {
                self.inner
                    .find(stream_id, start_offset, end_offset, max_bytes)
                    .await
            }
            async fn read_block(&self, index: &DataBlockIndex) -> Result<Vec<RecordBatch>> {
                self.loads.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                self.inner.read_block(index).await
            }
        }

        let (manager, indexes) = fixture(1);
        let cache = BlockCache::new(CacheConfig::default());
        let loads = Arc::new(AtomicU32::new(0));
        let reader: Arc<dyn ObjectReader> = Arc::new(CountingReader {
            inner: open_reader(&manager).await,
            loads: Arc::clone(&loads),
        });

        let (a, b) = tokio::join!(
            cache.get_block(Arc::clone(&reader), indexes[0]),
            cache.get_block(Arc::clone(&reader), indexes[0]),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().pinned_count, 1);

        a.release();
        b.release();
        assert_eq!(cache.stats().pinned_count, 0);
    }

    #[tokio::test]
    async fn test_load_failure_propagates_and_leaves_no_slot() {
        let (manager, indexes) = fixture(1);
        let cache = BlockCache::new(CacheConfig::default());
        let reader = open_reader(&manager).await;
        manager.delete_object(10);

        let err = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(_)));
        assert_eq!(cache.stats().entry_count, 0);

        // a later attempt retries the load instead of caching the failure
        let err = cache
            .get_block(Arc::clone(&reader), indexes[0])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_records_budget_allows_one_crossing_batch() {
        let manager = InMemoryObjectManager::new();
        let cache = BlockCache::new(CacheConfig::default());
        // block with 5 batches of 10 offsets / 10 bytes each
        let index = DataBlockIndex::new(0, 50, 50);
        manager.commit_object(
            1,
            20,
            vec![(index, (0..5).map(|i| batch(i * 10, 10, 10)).collect())],
        );
        let meta = manager.get_objects(1, 0, None, 1).await.unwrap().remove(0);
        let reader = manager.open(&meta);

        let block = cache.get_block(reader, index).await.unwrap();
        // budget of 25 bytes: two full batches plus the crossing third
        let records = block.get_records(0, 50, 25);
        assert_eq!(records.len(), 3);
        assert_eq!(records.last().unwrap().last_offset(), 29);

        // range bound stops before the budget does
        let records = block.get_records(10, 20, 1000);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].first_offset(), 10);
        block.release();
    }
}
