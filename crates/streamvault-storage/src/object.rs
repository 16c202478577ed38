//! Object Metadata and Object Reader Interfaces
//!
//! A stream's content lives in immutable remote objects. Two services sit
//! between a reader and those objects:
//!
//! - [`ObjectManager`]: resolves `stream_id -> ordered object metadata` and
//!   answers object-existence queries. Existence can change underneath a
//!   reader: a background compactor deletes objects and commits replacements
//!   covering the same offsets.
//! - [`ObjectReader`]: opened per object via an [`ObjectReaderFactory`],
//!   discovers the data-block indexes covering an offset range and
//!   materializes block payloads. Dropping the reader releases it.
//!
//! ## InMemoryObjectManager
//!
//! A process-local implementation of both traits, used by the test suites and
//! by embedded deployments that keep their object registry in memory. It
//! supports object deletion, so compaction-induced failure modes can be
//! reproduced without a remote store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use streamvault_core::{DataBlockIndex, ObjectMetadata, RecordBatch};

use crate::error::{Error, Result};

/// Resolves stream offsets to the objects that store them
#[async_trait]
pub trait ObjectManager: Send + Sync {
    /// Objects covering the stream forward from `start_offset`, in offset
    /// order. `end_offset` of `None` means no upper bound. May return fewer
    /// than `limit`; an empty result means the end of the stream as known so
    /// far.
    async fn get_objects(
        &self,
        stream_id: u64,
        start_offset: u64,
        end_offset: Option<u64>,
        limit: usize,
    ) -> Result<Vec<ObjectMetadata>>;

    /// Whether the object still exists. Returns false once a compactor has
    /// deleted it.
    fn is_object_exist(&self, object_id: u64) -> bool;
}

/// Block indexes discovered inside one object, in offset order
#[derive(Debug, Clone)]
pub struct FindResult {
    pub blocks: Vec<DataBlockIndex>,
}

/// Reads block indexes and block payloads from one object
#[async_trait]
pub trait ObjectReader: Send + Sync {
    fn object_id(&self) -> u64;

    /// Find the data blocks of `stream_id` covering `[start_offset,
    /// end_offset)`, bounded by `max_bytes` of approximate block size.
    async fn find(
        &self,
        stream_id: u64,
        start_offset: u64,
        end_offset: Option<u64>,
        max_bytes: usize,
    ) -> Result<FindResult>;

    /// Materialize the record batches of one data block
    async fn read_block(&self, index: &DataBlockIndex) -> Result<Vec<RecordBatch>>;
}

/// Opens object readers. The returned reader is released by dropping it.
pub trait ObjectReaderFactory: Send + Sync {
    fn open(&self, metadata: &ObjectMetadata) -> Arc<dyn ObjectReader>;
}

/// One committed object: metadata plus its blocks and their decoded payloads
#[derive(Clone)]
struct StoredObject {
    stream_id: u64,
    metadata: ObjectMetadata,
    blocks: Vec<(DataBlockIndex, Vec<RecordBatch>)>,
}

#[derive(Default)]
struct Registry {
    /// stream_id -> (first covered offset -> object_id)
    streams: HashMap<u64, BTreeMap<u64, u64>>,
    objects: HashMap<u64, StoredObject>,
    commit_seq: u64,
}

/// In-memory object registry implementing [`ObjectManager`] and
/// [`ObjectReaderFactory`]
#[derive(Clone, Default)]
pub struct InMemoryObjectManager {
    registry: Arc<RwLock<Registry>>,
}

impl InMemoryObjectManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit an object holding `blocks` (index plus decoded batches, in
    /// offset order) for `stream_id`.
    ///
    /// # Panics
    /// Panics if `blocks` is empty - an object always stores at least one
    /// block.
    pub fn commit_object(
        &self,
        stream_id: u64,
        object_id: u64,
        blocks: Vec<(DataBlockIndex, Vec<RecordBatch>)>,
    ) {
        assert!(!blocks.is_empty(), "object must contain at least one block");
        let first_offset = blocks[0].0.start_offset;
        let size_bytes = blocks.iter().map(|(i, _)| u64::from(i.size_bytes)).sum();
        let mut registry = self.registry.write().unwrap();
        registry.commit_seq += 1;
        let metadata = ObjectMetadata {
            object_id,
            size_bytes,
            created_at: registry.commit_seq,
        };
        registry
            .streams
            .entry(stream_id)
            .or_default()
            .insert(first_offset, object_id);
        registry.objects.insert(
            object_id,
            StoredObject {
                stream_id,
                metadata,
                blocks,
            },
        );
    }

    /// Delete an object, as a compactor would after rewriting it
    pub fn delete_object(&self, object_id: u64) {
        let mut registry = self.registry.write().unwrap();
        if let Some(object) = registry.objects.remove(&object_id) {
            if let Some(stream) = registry.streams.get_mut(&object.stream_id) {
                let first_offset = object.blocks[0].0.start_offset;
                // only unlink if the slot still points at this object (a
                // replacement may already have been committed over it)
                if stream.get(&first_offset) == Some(&object_id) {
                    stream.remove(&first_offset);
                }
            }
        }
    }

    /// Number of live objects across all streams
    pub fn object_count(&self) -> usize {
        self.registry.read().unwrap().objects.len()
    }
}

#[async_trait]
impl ObjectManager for InMemoryObjectManager {
    async fn get_objects(
        &self,
        stream_id: u64,
        start_offset: u64,
        end_offset: Option<u64>,
        limit: usize,
    ) -> Result<Vec<ObjectMetadata>> {
        let registry = self.registry.read().unwrap();
        let Some(stream) = registry.streams.get(&stream_id) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (&first_offset, object_id) in stream.iter() {
            if out.len() >= limit {
                break;
            }
            if let Some(end) = end_offset {
                if first_offset >= end {
                    break;
                }
            }
            let Some(object) = registry.objects.get(object_id) else {
                continue;
            };
            let Some((last_index, _)) = object.blocks.last() else {
                continue;
            };
            if last_index.end_offset <= start_offset {
                continue;
            }
            out.push(object.metadata.clone());
        }
        Ok(out)
    }

    fn is_object_exist(&self, object_id: u64) -> bool {
        self.registry.read().unwrap().objects.contains_key(&object_id)
    }
}

impl ObjectReaderFactory for InMemoryObjectManager {
    fn open(&self, metadata: &ObjectMetadata) -> Arc<dyn ObjectReader> {
        Arc::new(InMemoryObjectReader {
            object_id: metadata.object_id,
            registry: Arc::clone(&self.registry),
        })
    }
}

/// Reader over one object in an [`InMemoryObjectManager`]
struct InMemoryObjectReader {
    object_id: u64,
    registry: Arc<RwLock<Registry>>,
}

impl InMemoryObjectReader {
    fn object_key(&self) -> String {
        format!("object-{}", self.object_id)
    }
}

#[async_trait]
impl ObjectReader for InMemoryObjectReader {
    fn object_id(&self) -> u64 {
        self.object_id
    }

    async fn find(
        &self,
        stream_id: u64,
        start_offset: u64,
        end_offset: Option<u64>,
        max_bytes: usize,
    ) -> Result<FindResult> {
        let registry = self.registry.read().unwrap();
        let object = registry
            .objects
            .get(&self.object_id)
            .ok_or_else(|| Error::KeyNotFound(self.object_key()))?;
        if object.stream_id != stream_id {
            return Ok(FindResult { blocks: Vec::new() });
        }
        let max_bytes = max_bytes as u64;
        let mut consumed = 0u64;
        let mut blocks = Vec::new();
        for (index, _) in &object.blocks {
            if index.end_offset <= start_offset {
                continue;
            }
            if let Some(end) = end_offset {
                if index.start_offset >= end {
                    break;
                }
            }
            if consumed >= max_bytes {
                break;
            }
            blocks.push(*index);
            consumed += u64::from(index.size_bytes);
        }
        Ok(FindResult { blocks })
    }

    async fn read_block(&self, index: &DataBlockIndex) -> Result<Vec<RecordBatch>> {
        let registry = self.registry.read().unwrap();
        let object = registry
            .objects
            .get(&self.object_id)
            .ok_or_else(|| Error::KeyNotFound(self.object_key()))?;
        object
            .blocks
            .iter()
            .find(|(i, _)| i.start_offset == index.start_offset)
            .map(|(_, records)| records.clone())
            .ok_or_else(|| {
                Error::KeyNotFound(format!(
                    "object-{} block-{}",
                    self.object_id, index.start_offset
                ))
            })
    }
}
