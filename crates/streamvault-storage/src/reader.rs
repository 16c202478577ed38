//! Stream Reader with Block Window and Adaptive Readahead
//!
//! This module implements the per-stream read path: translating a byte-range
//! read into pinned block-cache fetches while prefetching ahead of the
//! consumer.
//!
//! ## The Problem
//!
//! A stream's content is spread over immutable remote objects, each holding
//! many data blocks. Serving `read(start, end, max_bytes)` means discovering
//! which blocks cover the range, materializing them through the shared block
//! cache, and assembling record batches under a byte budget - all while a
//! background compactor may delete the very objects the reader has indexed.
//!
//! ## Read Flow
//!
//! ```text
//! read(start, end, max_bytes)
//!     ↓
//! Block window covers start? ──NO──→ extend window (object manager,
//!     ↓ YES                           coalesced across callers)
//! Acquire fresh pinned entries via the block cache
//!     ↓
//! Await loads, assemble batches under the budget
//!     ↓
//! Under budget because index sizes are approximate? → acquire more
//!     ↓
//! Advance cursor, prune consumed window entries, mark blocks read
//!     ↓
//! Trigger readahead for the next read
//! ```
//!
//! ## Compaction Tolerance
//!
//! Object deletion surfaces as `ObjectNotExist` / `KeyNotFound` during
//! acquisition, or as `BlockNotContinuous` when freshly listed objects no
//! longer abut the window tail. All three reset the window and retry the read
//! exactly once against fresh metadata.
//!
//! ## Concurrency
//!
//! All window and readahead state lives in one mutex that is never held
//! across a suspension point; asynchronous completions re-enter through it
//! from spawned tasks. Window extension is coalesced: concurrent reads that
//! both need more block indexes share a single in-flight extension future.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use streamvault_core::{DataBlockIndex, ObjectMetadata, RecordBatch};
use streamvault_observability::metrics;

use crate::cache::{BlockCache, DataBlock};
use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::object::{ObjectManager, ObjectReaderFactory};
use crate::readahead::Readahead;
use crate::throttle::LogThrottle;

/// Interval for the unread-block-evicted warning
const EVICTED_WARN_INTERVAL: Duration = Duration::from_secs(30);

type SharedDataLoad = Shared<BoxFuture<'static, Result<Arc<DataBlock>>>>;
type SharedExtension = Shared<BoxFuture<'static, Result<Vec<Arc<Block>>>>>;

/// How a read was served. Propagating the real access type is future work;
/// for now every served read reports a block-cache hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAccessType {
    BlockCacheHit,
    BlockCacheMiss,
}

/// Result of a read: ordered record batches plus the access-type tag
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub records: Vec<RecordBatch>,
    pub access_type: CacheAccessType,
}

/// Snapshot of a reader's window and readahead state
#[derive(Debug, Clone)]
pub struct ReaderStats {
    pub next_read_offset: u64,
    pub window_start: Option<u64>,
    pub window_end: u64,
    pub window_blocks: usize,
    pub readahead_offset: u64,
    pub readahead_size: usize,
    pub readahead_inflight: bool,
}

/// Serves sequential range reads against one stream
pub struct StreamReader {
    core: ReaderCore,
}

impl StreamReader {
    pub fn new(
        stream_id: u64,
        next_read_offset: u64,
        object_manager: Arc<dyn ObjectManager>,
        reader_factory: Arc<dyn ObjectReaderFactory>,
        cache: BlockCache,
        config: ReaderConfig,
    ) -> Self {
        let readahead = Readahead::new(&config);
        Self {
            core: ReaderCore {
                stream_id,
                config,
                object_manager,
                reader_factory,
                cache,
                state: Arc::new(Mutex::new(ReaderState {
                    blocks: BTreeMap::new(),
                    last_block: None,
                    loaded_end_offset: 0,
                    next_read_offset,
                    readahead,
                    inflight_extension: None,
                })),
                last_access: Arc::new(Mutex::new(Instant::now())),
                evicted_warn: Arc::new(LogThrottle::new(EVICTED_WARN_INTERVAL)),
            },
        }
    }

    /// Read records covering `[start_offset, end_offset)`, bounded by
    /// `max_bytes` (plus at most one batch of slack).
    ///
    /// Retries once after resetting the block window when the failure
    /// indicates compaction invalidated cached metadata.
    pub async fn read(
        &self,
        start_offset: u64,
        end_offset: u64,
        max_bytes: usize,
    ) -> Result<ReadResult> {
        self.core.read(start_offset, end_offset, max_bytes).await
    }

    /// The offset the next sequential read should start from
    pub fn next_read_offset(&self) -> u64 {
        self.core.state.lock().unwrap().next_read_offset
    }

    /// Monotonic clock reading taken at the last `read` entry
    pub fn last_access_timestamp(&self) -> Instant {
        *self.core.last_access.lock().unwrap()
    }

    /// Mark every still-held block as read so the cache may reclaim it.
    /// Idempotent.
    pub fn close(&self) {
        let datas: Vec<Arc<DataBlock>> = {
            let state = self.core.state.lock().unwrap();
            state
                .blocks
                .values()
                .filter_map(|block| block.data.lock().unwrap().clone())
                .collect()
        };
        for data in datas {
            data.mark_read();
        }
    }

    /// Snapshot of the window and readahead state
    pub fn stats(&self) -> ReaderStats {
        let state = self.core.state.lock().unwrap();
        ReaderStats {
            next_read_offset: state.next_read_offset,
            window_start: state.blocks.keys().next().copied(),
            window_end: state.loaded_end_offset,
            window_blocks: state.blocks.len(),
            readahead_offset: state.readahead.next_offset(),
            readahead_size: state.readahead.size(),
            readahead_inflight: state.readahead.is_inflight(),
        }
    }
}

/// Shared internals; clones are handles onto the same reader
#[derive(Clone)]
struct ReaderCore {
    stream_id: u64,
    config: ReaderConfig,
    object_manager: Arc<dyn ObjectManager>,
    reader_factory: Arc<dyn ObjectReaderFactory>,
    cache: BlockCache,
    state: Arc<Mutex<ReaderState>>,
    last_access: Arc<Mutex<Instant>>,
    evicted_warn: Arc<LogThrottle>,
}

struct ReaderState {
    /// Contiguous block-index window, keyed by block start offset
    blocks: BTreeMap<u64, Arc<Block>>,

    /// Entry with the highest key ever put. Survives pruning so continuity
    /// is still checked when the map has been emptied by consumption.
    last_block: Option<Arc<Block>>,

    /// `last_block`'s end offset, 0 when nothing was loaded yet
    loaded_end_offset: u64,

    next_read_offset: u64,

    readahead: Readahead,

    /// Coalesced window-extension future; `Some` only while one is in flight
    inflight_extension: Option<SharedExtension>,
}

impl ReaderState {
    /// Append a block to the window. Fails if it does not abut the last
    /// known block.
    fn put_block(&mut self, block: &Arc<Block>) -> bool {
        if let Some(last) = &self.last_block {
            if last.index.end_offset != block.index.start_offset {
                return false;
            }
        }
        self.last_block = Some(Arc::clone(block));
        self.blocks.insert(block.index.start_offset, Arc::clone(block));
        self.loaded_end_offset = block.index.end_offset;
        true
    }
}

/// One block in the window: immutable index metadata plus the lazily-loaded,
/// cache-managed data handle.
///
/// Window entries and acquisition entries are distinct `Block` instances
/// sharing metadata: each acquisition re-pins the data through the cache
/// because the previously loaded handle may have been evicted. The window
/// entry's `data` field only aliases the latest handle, for identity
/// comparison and read-marking; it holds no pin.
pub(crate) struct Block {
    metadata: ObjectMetadata,
    pub(crate) index: DataBlockIndex,
    data: Mutex<Option<Arc<DataBlock>>>,
    load: OnceLock<SharedDataLoad>,
    released: AtomicBool,
}

impl Block {
    fn new(metadata: ObjectMetadata, index: DataBlockIndex) -> Self {
        Self {
            metadata,
            index,
            data: Mutex::new(None),
            load: OnceLock::new(),
            released: AtomicBool::new(false),
        }
    }

    fn load_shared(&self) -> SharedDataLoad {
        self.load
            .get()
            .expect("block data load was never started")
            .clone()
    }

    /// Release this acquisition's pin, deferred until the load settles so a
    /// pending load is never leaked. At most once per entry.
    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(load) = self.load.get().cloned() {
            tokio::spawn(async move {
                if let Ok(data) = load.await {
                    data.release();
                }
            });
        }
    }
}

impl Drop for Block {
    /// Safety net for abandoned reads: an acquisition entry dropped without
    /// an explicit release still unpins once its load settles.
    fn drop(&mut self) {
        if self.released.load(Ordering::SeqCst) {
            return;
        }
        if let Some(load) = self.load.get().cloned() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Ok(data) = load.await {
                        data.release();
                    }
                });
            }
        }
    }
}

impl ReaderCore {
    async fn read(
        &self,
        start_offset: u64,
        end_offset: u64,
        max_bytes: usize,
    ) -> Result<ReadResult> {
        debug_assert!(end_offset > start_offset, "empty read range");
        debug_assert!(max_bytes > 0, "read budget must be positive");
        metrics::READER_READS_TOTAL.inc();
        let started = Instant::now();
        let mut left_retries = 1;
        loop {
            *self.last_access.lock().unwrap() = Instant::now();
            match self.read_attempt(start_offset, end_offset, max_bytes).await {
                Ok((records, used)) => {
                    self.after_read(&records, &used);
                    metrics::READER_LATENCY
                        .with_label_values(&["ok"])
                        .observe(started.elapsed().as_secs_f64());
                    return Ok(ReadResult {
                        records,
                        // TODO: propagate the real cache access type
                        access_type: CacheAccessType::BlockCacheHit,
                    });
                }
                Err(err) if left_retries > 0 && err.is_retryable() => {
                    // cached blocks may be invalid after object compaction:
                    // drop the window and rebuild it from fresh metadata
                    warn!(
                        stream_id = self.stream_id,
                        error = %err,
                        "read failed, resetting block window and retrying"
                    );
                    metrics::READER_RETRIES_TOTAL.inc();
                    self.reset_blocks();
                    left_retries -= 1;
                }
                Err(err) => {
                    metrics::READER_LATENCY
                        .with_label_values(&["error"])
                        .observe(started.elapsed().as_secs_f64());
                    return Err(err);
                }
            }
        }
    }

    /// One read attempt: acquire, await loads, assemble, and keep going while
    /// the range and the budget both have room (index sizes are approximate,
    /// so one acquisition round may come up short).
    async fn read_attempt(
        &self,
        start_offset: u64,
        end_offset: u64,
        max_bytes: usize,
    ) -> Result<(Vec<RecordBatch>, Vec<Arc<Block>>)> {
        let mut records: Vec<RecordBatch> = Vec::new();
        let mut used: Vec<Arc<Block>> = Vec::new();
        let mut cursor = start_offset;
        let mut remaining = max_bytes.min(i64::MAX as usize) as i64;
        loop {
            let blocks = self
                .get_blocks(cursor, Some(end_offset), remaining as usize)
                .await?;
            if blocks.is_empty() {
                // end of the stream as known so far
                return Ok((records, used));
            }

            // wait for every block's data before assembling
            let mut datas = Vec::with_capacity(blocks.len());
            for block in &blocks {
                match block.load_shared().await {
                    Ok(data) => datas.push(data),
                    Err(err) => {
                        for block in &blocks {
                            block.release();
                        }
                        return Err(err);
                    }
                }
            }

            used.extend(blocks.iter().cloned());
            let mut fulfilled = false;
            for (block, data) in blocks.iter().zip(&datas) {
                let index = block.index;
                if !index.contains(cursor) {
                    let msg = format!(
                        "read cursor {} outside assembled block range {}-{}",
                        cursor, index.start_offset, index.end_offset
                    );
                    error!(stream_id = self.stream_id, "{}", msg);
                    for block in &blocks {
                        block.release();
                    }
                    return Err(Error::InternalConsistency(msg));
                }
                let next_end = end_offset.min(index.end_offset);
                let new_records = data.get_records(cursor, next_end, remaining as usize);
                cursor = next_end;
                remaining -= new_records.iter().map(|r| r.size() as i64).sum::<i64>();
                records.extend(new_records);
                if cursor >= end_offset || remaining <= 0 {
                    fulfilled = true;
                    break;
                }
            }
            for block in &blocks {
                block.release();
            }
            if fulfilled {
                return Ok((records, used));
            }
        }
    }

    /// Post-read bookkeeping: advance the cursor, prune consumed window
    /// entries, mark the attempt's blocks read, and consider readahead.
    fn after_read(&self, records: &[RecordBatch], used: &[Arc<Block>]) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(last) = records.last() {
                state.next_read_offset = last.last_offset() + 1;
            }
            let next_read_offset = state.next_read_offset;
            while state
                .blocks
                .first_key_value()
                .map(|(_, block)| block.index.end_offset <= next_read_offset)
                .unwrap_or(false)
            {
                state.blocks.pop_first();
            }
        }
        // acquisition marked these unread; the consumer is done with them now
        for block in used {
            let data = block.data.lock().unwrap().clone();
            if let Some(data) = data {
                data.mark_read();
            }
        }
        self.try_readahead();
    }

    /// Acquire an ordered list of pinned block entries covering
    /// `[start_offset, end_offset)` or saturating `max_bytes`. On failure
    /// every entry acquired so far is released once its load settles.
    async fn get_blocks(
        &self,
        start_offset: u64,
        end_offset: Option<u64>,
        max_bytes: usize,
    ) -> Result<Vec<Arc<Block>>> {
        let mut acquired: Vec<Arc<Block>> = Vec::new();
        match self
            .get_blocks0(&mut acquired, start_offset, end_offset, max_bytes)
            .await
        {
            Ok(()) => Ok(acquired),
            Err(err) => {
                for block in &acquired {
                    block.release();
                }
                Err(err)
            }
        }
    }

    async fn get_blocks0(
        &self,
        acquired: &mut Vec<Arc<Block>>,
        start_offset: u64,
        end_offset: Option<u64>,
        max_bytes: usize,
    ) -> Result<()> {
        enum Step {
            Fulfilled,
            Extend(SharedExtension),
        }

        let mut cursor = start_offset;
        let mut remaining = max_bytes.min(i64::MAX as usize) as i64;
        loop {
            let step = {
                let mut state = self.state.lock().unwrap();
                let floor = state
                    .blocks
                    .range(..=cursor)
                    .next_back()
                    .map(|(key, _)| *key);
                match floor {
                    Some(floor_key) if cursor < state.loaded_end_offset => {
                        let mut first = true;
                        let mut fulfilled = false;
                        for (_, block) in state.blocks.range(floor_key..) {
                            let object_id = block.metadata.object_id;
                            if !self.object_manager.is_object_exist(object_id) {
                                // the object may have been deleted by
                                // compaction since it was indexed
                                return Err(Error::ObjectNotExist(object_id));
                            }
                            let index = block.index;
                            // the first entry only consumes budget when the
                            // read starts exactly at it; otherwise only a
                            // suffix of it will be consumed
                            if !first || index.start_offset == cursor {
                                remaining -= i64::from(index.size_bytes);
                            }
                            first = false;
                            // re-pin through the cache: the previously loaded
                            // data may have been evicted
                            acquired.push(self.block_with_data(block));
                            if end_offset.map_or(false, |end| index.end_offset >= end)
                                || remaining <= 0
                            {
                                fulfilled = true;
                                break;
                            }
                        }
                        if fulfilled {
                            Step::Fulfilled
                        } else {
                            Step::Extend(self.extend_window_locked(&mut state))
                        }
                    }
                    _ => Step::Extend(self.extend_window_locked(&mut state)),
                }
            };
            match step {
                Step::Fulfilled => return Ok(()),
                Step::Extend(extension) => {
                    let added = extension.await?;
                    if added.is_empty() {
                        // the stream has no further objects
                        return Ok(());
                    }
                    cursor = acquired
                        .last()
                        .map(|block| block.index.end_offset)
                        .unwrap_or(start_offset);
                }
            }
        }
    }

    /// Start (or join) the in-flight window extension. The producer task
    /// clears the token before completing it, so a caller arriving during
    /// completion starts a fresh extension.
    fn extend_window_locked(&self, state: &mut ReaderState) -> SharedExtension {
        if let Some(extension) = &state.inflight_extension {
            return extension.clone();
        }
        let next_loading_offset = state
            .last_block
            .as_ref()
            .map(|block| block.index.end_offset.max(state.next_read_offset))
            .unwrap_or(state.next_read_offset);
        let (tx, rx) = tokio::sync::oneshot::channel::<Result<Vec<Arc<Block>>>>();
        let extension: SharedExtension = rx
            .map(|received| match received {
                Ok(result) => result,
                Err(_) => Err(Error::LoadFailure(
                    "window extension task dropped".to_string(),
                )),
            })
            .boxed()
            .shared();
        state.inflight_extension = Some(extension.clone());
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.find_more_blocks(next_loading_offset).await;
            this.state.lock().unwrap().inflight_extension = None;
            let _ = tx.send(result);
        });
        extension
    }

    /// Walk object metadata forward from `cursor`, appending every discovered
    /// block index to the window. Objects are visited strictly one at a time
    /// to preserve discovery order.
    async fn find_more_blocks(&self, mut cursor: u64) -> Result<Vec<Arc<Block>>> {
        metrics::OBJECT_LISTINGS_TOTAL.inc();
        let objects = self
            .object_manager
            .get_objects(self.stream_id, cursor, None, self.config.get_object_step)
            .await?;
        let mut added = Vec::new();
        for metadata in &objects {
            let object_reader = self.reader_factory.open(metadata);
            let found = object_reader
                .find(self.stream_id, cursor, None, usize::MAX)
                .await?;
            for index in found.blocks {
                let block = Arc::new(Block::new(metadata.clone(), index));
                {
                    let mut state = self.state.lock().unwrap();
                    if !state.put_block(&block) {
                        // objects listed across a compaction boundary may not
                        // abut the window tail
                        return Err(Error::BlockNotContinuous(index.start_offset));
                    }
                }
                cursor = index.end_offset;
                added.push(block);
            }
            // dropping the object reader releases it
        }
        if !added.is_empty() {
            debug!(
                stream_id = self.stream_id,
                blocks = added.len(),
                window_end = cursor,
                "extended block index window"
            );
        }
        Ok(added)
    }

    /// Build a fresh acquisition entry for a window entry and start loading
    /// its data through the cache.
    fn block_with_data(&self, source: &Arc<Block>) -> Arc<Block> {
        let fresh = Arc::new(Block::new(source.metadata.clone(), source.index));
        let load: SharedDataLoad = {
            let source = Arc::clone(source);
            let fresh = Arc::clone(&fresh);
            let cache = self.cache.clone();
            let factory = Arc::clone(&self.reader_factory);
            let state = Arc::downgrade(&self.state);
            let evicted_warn = Arc::clone(&self.evicted_warn);
            let stream_id = self.stream_id;
            async move {
                let object_reader = factory.open(&source.metadata);
                let result = cache.get_block(object_reader, source.index).await;
                match result {
                    Ok(data) => {
                        *fresh.data.lock().unwrap() = Some(Arc::clone(&data));
                        let changed = {
                            let mut held = source.data.lock().unwrap();
                            match held.as_ref() {
                                Some(prev) if Arc::ptr_eq(prev, &data) => false,
                                _ => {
                                    *held = Some(Arc::clone(&data));
                                    true
                                }
                            }
                        };
                        if changed {
                            // first load, or the previous handle was evicted
                            // and reloaded: watch for this handle being freed
                            // before consumption
                            data.mark_unread();
                            let free = data.free_future();
                            let source = Arc::clone(&source);
                            tokio::spawn(async move {
                                let _ = free.await;
                                handle_block_free(&state, &evicted_warn, stream_id, &source);
                            });
                        }
                        Ok(data)
                    }
                    Err(err) => Err(err),
                }
            }
            .boxed()
            .shared()
        };
        let _ = fresh.load.set(load.clone());
        // drive the load eagerly even if no one awaits this entry
        tokio::spawn(load.map(|_| ()));
        fresh
    }

    fn try_readahead(&self) {
        let plan = {
            let mut state = self.state.lock().unwrap();
            let next_read_offset = state.next_read_offset;
            state.readahead.plan(next_read_offset)
        };
        let Some((start_offset, size)) = plan else {
            return;
        };
        metrics::READAHEAD_LAUNCHES_TOTAL.inc();
        debug!(
            stream_id = self.stream_id,
            start_offset, size, "launching readahead"
        );
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.get_blocks(start_offset, None, size).await;
            match result {
                Ok(blocks) => {
                    {
                        let mut state = this.state.lock().unwrap();
                        if let Some(last) = blocks.last() {
                            state.readahead.advance_frontier(last.index.end_offset);
                        }
                        state.readahead.finish();
                    }
                    // prefetch pins are transient: the blocks stay cached for
                    // later consumption
                    for block in &blocks {
                        block.release();
                    }
                }
                Err(err) => {
                    this.state.lock().unwrap().readahead.finish();
                    debug!(
                        stream_id = this.stream_id,
                        error = %err,
                        "readahead acquisition failed"
                    );
                }
            }
        });
    }

    fn reset_blocks(&self) {
        let mut state = self.state.lock().unwrap();
        state.blocks.clear();
        state.last_block = None;
        state.loaded_end_offset = 0;
    }
}

/// The cache freed a block. If the freed handle still belongs to the window
/// entry installed at its key, an unread block was evicted under cache
/// pressure: shrink the readahead and warn (rate-limited).
fn handle_block_free(
    state: &Weak<Mutex<ReaderState>>,
    evicted_warn: &LogThrottle,
    stream_id: u64,
    block: &Arc<Block>,
) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let evicted_unread = {
        let mut state = state.lock().unwrap();
        let installed = state
            .blocks
            .get(&block.index.start_offset)
            .map(|installed| Arc::ptr_eq(installed, block))
            .unwrap_or(false);
        if installed {
            state.readahead.reset();
        }
        installed
    };
    if evicted_unread {
        metrics::READAHEAD_RESETS_TOTAL.inc();
        evicted_warn.run(|| {
            warn!(
                stream_id,
                start_offset = block.index.start_offset,
                "unread block evicted before consumption, consider increasing the block cache size"
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::object::InMemoryObjectManager;
    use bytes::Bytes;

    fn batch(base: u64, count: u32, size: usize) -> RecordBatch {
        RecordBatch::new(base, count, Bytes::from(vec![0u8; size]))
    }

    fn block_entry(start: u64, end: u64) -> Arc<Block> {
        Arc::new(Block::new(
            ObjectMetadata {
                object_id: 1,
                size_bytes: 0,
                created_at: 0,
            },
            DataBlockIndex::new(start, end, (end - start) as u32),
        ))
    }

    fn empty_state() -> ReaderState {
        ReaderState {
            blocks: BTreeMap::new(),
            last_block: None,
            loaded_end_offset: 0,
            next_read_offset: 0,
            readahead: Readahead::new(&ReaderConfig::default()),
            inflight_extension: None,
        }
    }

    fn reader_over(
        manager: &InMemoryObjectManager,
        cache: &BlockCache,
        config: ReaderConfig,
    ) -> StreamReader {
        StreamReader::new(
            1,
            0,
            Arc::new(manager.clone()),
            Arc::new(manager.clone()),
            cache.clone(),
            config,
        )
    }

    /// Objects of 50-offset / 50-byte blocks: O1=[0,100), O2=[100,250),
    /// O3=[250,400)
    fn symbolic_layout(manager: &InMemoryObjectManager) {
        let object = |start: u64, end: u64| {
            (start..end)
                .step_by(50)
                .map(|s| {
                    (
                        DataBlockIndex::new(s, s + 50, 50),
                        vec![batch(s, 50, 50)],
                    )
                })
                .collect::<Vec<_>>()
        };
        manager.commit_object(1, 1, object(0, 100));
        manager.commit_object(1, 2, object(100, 250));
        manager.commit_object(1, 3, object(250, 400));
    }

    // ---------------------------------------------------------------
    // Window bookkeeping
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_put_block_requires_continuity() {
        let mut state = empty_state();
        assert!(state.put_block(&block_entry(0, 50)));
        assert!(state.put_block(&block_entry(50, 100)));
        assert_eq!(state.loaded_end_offset, 100);

        // gap
        assert!(!state.put_block(&block_entry(150, 200)));
        // overlap
        assert!(!state.put_block(&block_entry(50, 150)));
        assert_eq!(state.loaded_end_offset, 100);
        assert_eq!(state.blocks.len(), 2);
    }

    #[tokio::test]
    async fn test_put_block_checks_against_last_even_after_prune() {
        let mut state = empty_state();
        assert!(state.put_block(&block_entry(0, 50)));
        // consumed and pruned
        state.blocks.clear();
        // continuity is still enforced against the last known block
        assert!(!state.put_block(&block_entry(100, 150)));
        assert!(state.put_block(&block_entry(50, 100)));
    }

    // ---------------------------------------------------------------
    // Read pipeline
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_cold_sequential_read() {
        let manager = InMemoryObjectManager::new();
        symbolic_layout(&manager);
        let cache = BlockCache::new(CacheConfig::default());
        let reader = reader_over(&manager, &cache, ReaderConfig::default());

        let result = reader.read(0, 100, 1024).await.unwrap();
        assert_eq!(result.access_type, CacheAccessType::BlockCacheHit);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].first_offset(), 0);
        assert_eq!(result.records[1].last_offset(), 99);
        assert_eq!(reader.next_read_offset(), 100);
    }

    #[tokio::test]
    async fn test_read_prunes_consumed_window_entries() {
        let manager = InMemoryObjectManager::new();
        symbolic_layout(&manager);
        let cache = BlockCache::new(CacheConfig::default());
        let reader = reader_over(&manager, &cache, ReaderConfig::default());

        reader.read(0, 100, 1024).await.unwrap();
        let stats = reader.stats();
        // entries ending at or before offset 100 are gone
        assert!(stats.window_start.map_or(true, |start| start >= 100));
    }

    #[tokio::test]
    async fn test_reset_blocks_clears_window() {
        let manager = InMemoryObjectManager::new();
        symbolic_layout(&manager);
        let cache = BlockCache::new(CacheConfig::default());
        let reader = reader_over(&manager, &cache, ReaderConfig::default());

        reader.read(0, 100, 1024).await.unwrap();
        reader.core.reset_blocks();
        let stats = reader.stats();
        assert_eq!(stats.window_blocks, 0);
        assert_eq!(stats.window_end, 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let manager = InMemoryObjectManager::new();
        symbolic_layout(&manager);
        let cache = BlockCache::new(CacheConfig::default());
        let reader = reader_over(&manager, &cache, ReaderConfig::default());

        reader.read(0, 100, 1024).await.unwrap();
        reader.close();
        reader.close();
    }

    #[tokio::test]
    async fn test_internal_consistency_is_not_retried() {
        // a window entry installed under a key outside its own range trips
        // the assembly assertion: the cursor lands between the key and the
        // block's real start
        let manager = InMemoryObjectManager::new();
        symbolic_layout(&manager);
        let cache = BlockCache::new(CacheConfig::default());
        let reader = reader_over(&manager, &cache, ReaderConfig::default());

        reader.read(0, 100, 1024).await.unwrap();
        {
            let mut state = reader.core.state.lock().unwrap();
            // a real block of O2, but keyed at 120 instead of 150
            let block = Arc::new(Block::new(
                ObjectMetadata {
                    object_id: 2,
                    size_bytes: 150,
                    created_at: 0,
                },
                DataBlockIndex::new(150, 200, 50),
            ));
            state.blocks.insert(120, block);
        }
        let err = reader.read(120, 150, 1024).await.unwrap_err();
        assert!(matches!(err, Error::InternalConsistency(_)));
    }
}
