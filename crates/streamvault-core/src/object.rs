//! Object and Block Metadata
//!
//! Streams are stored as immutable remote objects, each containing one or
//! more data blocks. This module defines the metadata describing both:
//!
//! - [`ObjectMetadata`]: identity and size of a remote object. Objects are
//!   content-addressed and immutable; a background compactor may delete an
//!   object and replace it with a different one covering the same offsets.
//! - [`DataBlockIndex`]: the offset range and approximate byte size of one
//!   data block. The size is approximate because block and record headers
//!   make the index over- or under-count the bytes a reader will actually
//!   receive - budget math must tolerate both directions.

use serde::{Deserialize, Serialize};

/// Identity of an immutable remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Unique object id, assigned at commit time
    pub object_id: u64,

    /// Total object size in bytes
    pub size_bytes: u64,

    /// Commit timestamp in milliseconds since epoch
    pub created_at: u64,
}

/// Metadata describing one data block within an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBlockIndex {
    /// First logical offset covered by the block
    pub start_offset: u64,

    /// Exclusive end of the block's offset range
    pub end_offset: u64,

    /// Approximate encoded size of the block in bytes
    pub size_bytes: u32,
}

impl DataBlockIndex {
    pub fn new(start_offset: u64, end_offset: u64, size_bytes: u32) -> Self {
        debug_assert!(end_offset > start_offset, "block offset range is empty");
        Self {
            start_offset,
            end_offset,
            size_bytes,
        }
    }

    /// Whether `offset` falls inside this block's range
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start_offset && offset < self.end_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_boundaries() {
        let index = DataBlockIndex::new(50, 100, 4096);
        assert!(index.contains(50));
        assert!(index.contains(99));
        assert!(!index.contains(100));
        assert!(!index.contains(49));
    }

    #[test]
    fn test_contains_single_offset_block() {
        let index = DataBlockIndex::new(7, 8, 64);
        assert!(index.contains(7));
        assert!(!index.contains(8));
    }

    #[test]
    fn test_index_serde_roundtrip() {
        let index = DataBlockIndex::new(0, 50, 1024);
        let json = serde_json::to_string(&index).expect("serialize");
        let back: DataBlockIndex = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(index, back);
    }

    #[test]
    fn test_metadata_serde_roundtrip() {
        let meta = ObjectMetadata {
            object_id: 99,
            size_bytes: 1 << 20,
            created_at: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&meta).expect("serialize");
        let back: ObjectMetadata = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(meta, back);
    }
}
