//! StreamVault Storage Layer - Read Path
//!
//! This crate implements the read path of StreamVault: serving sequential
//! byte-range reads against append-only streams whose content lives as
//! immutable, content-addressed objects in remote object storage.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐
//! │  Consumers   │
//! └──────┬───────┘
//!        │ read(start, end, max_bytes)
//!        ▼
//! ┌──────────────────┐     ┌───────────────────┐
//! │  StreamReader    │────▶│  ObjectManager    │ which objects cover
//! │  - block window  │     │  (metadata svc)   │ this offset range?
//! │  - readahead     │     └───────────────────┘
//! └──────┬───────────┘
//!        │ get_block (pinned)
//!        ▼
//! ┌──────────────────┐     ┌───────────────────┐
//! │   BlockCache     │────▶│   ObjectReader    │ materialize one
//! │  - pins, LRU     │     │  (per object)     │ data block
//! └──────────────────┘     └───────────────────┘
//! ```
//!
//! ## Main Components
//!
//! ### StreamReader
//! Per-stream coordinator: discovers which data blocks cover a requested
//! range by walking object metadata, pins them through the shared
//! [`BlockCache`], assembles record batches under a byte budget, and drives
//! an adaptive readahead window. Tolerates concurrent compaction of the
//! underlying objects by resetting its window and retrying once.
//!
//! ### BlockCache
//! Process-wide cache of materialized blocks with reference-counted pins,
//! consumer read/unread state, and LRU eviction under size pressure.
//!
//! ### Object traits
//! [`ObjectManager`] / [`ObjectReader`] / [`ObjectReaderFactory`] are the
//! seams to the metadata service and the object store. The crate ships an
//! [`InMemoryObjectManager`] implementing all of them for tests and embedded
//! deployments.
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamvault_storage::{BlockCache, CacheConfig, ReaderConfig, StreamReader};
//!
//! let cache = BlockCache::new(CacheConfig::default());
//! let reader = StreamReader::new(
//!     stream_id,
//!     0, // initial read offset
//!     object_manager,
//!     object_reader_factory,
//!     cache.clone(),
//!     ReaderConfig::default(),
//! );
//!
//! let result = reader.read(0, 1_000, 1024 * 1024).await?;
//! for batch in result.records {
//!     process(batch);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod object;
mod readahead;
pub mod reader;
pub mod throttle;

pub use cache::{BlockCache, BlockKey, CacheConfig, CacheStats, DataBlock};
pub use config::ReaderConfig;
pub use error::{Error, Result};
pub use object::{
    FindResult, InMemoryObjectManager, ObjectManager, ObjectReader, ObjectReaderFactory,
};
pub use reader::{CacheAccessType, ReadResult, ReaderStats, StreamReader};
pub use throttle::LogThrottle;
