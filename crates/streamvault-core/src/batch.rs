//! Record Batch Data Structure
//!
//! This module defines `RecordBatch` - the unit of data served by the read
//! path.
//!
//! ## What is a Record Batch?
//! A record batch is a contiguous, indivisible run of records in a stream:
//! - **base_offset**: logical offset of the first record in the batch
//! - **count**: number of records in the batch
//! - **payload**: the encoded records (arbitrary bytes)
//!
//! Batches are the granularity of budget accounting: a read either returns a
//! whole batch or stops before it.
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` for zero-copy sharing: cloning a batch clones a
//!   refcount, not the payload. Dropping the last clone releases the memory,
//!   which is how the read path "releases" batches on error.
//! - `last_offset()` is inclusive; `end_offset()` is the exclusive bound used
//!   by range math.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A contiguous batch of records in a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBatch {
    /// Offset of the first record in this batch
    base_offset: u64,

    /// Number of records in this batch (always > 0)
    count: u32,

    /// Encoded record payload
    payload: Bytes,
}

impl RecordBatch {
    /// Create a new batch covering `[base_offset, base_offset + count)`.
    ///
    /// # Panics
    /// Panics if `count` is zero - an empty batch has no offset range.
    pub fn new(base_offset: u64, count: u32, payload: Bytes) -> Self {
        assert!(count > 0, "record batch must contain at least one record");
        Self {
            base_offset,
            count,
            payload,
        }
    }

    /// Offset of the first record in this batch
    pub fn first_offset(&self) -> u64 {
        self.base_offset
    }

    /// Offset of the last record in this batch (inclusive)
    pub fn last_offset(&self) -> u64 {
        self.base_offset + u64::from(self.count) - 1
    }

    /// Exclusive end of the batch's offset range
    pub fn end_offset(&self) -> u64 {
        self.base_offset + u64::from(self.count)
    }

    /// Number of records in this batch
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Byte footprint of the batch payload
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// The encoded payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Construction and offset math
    // ---------------------------------------------------------------

    #[test]
    fn test_new_single_record() {
        let batch = RecordBatch::new(42, 1, Bytes::from("payload"));
        assert_eq!(batch.first_offset(), 42);
        assert_eq!(batch.last_offset(), 42);
        assert_eq!(batch.end_offset(), 43);
        assert_eq!(batch.count(), 1);
    }

    #[test]
    fn test_new_multi_record() {
        let batch = RecordBatch::new(100, 50, Bytes::from(vec![0u8; 512]));
        assert_eq!(batch.first_offset(), 100);
        assert_eq!(batch.last_offset(), 149);
        assert_eq!(batch.end_offset(), 150);
        assert_eq!(batch.size(), 512);
    }

    #[test]
    #[should_panic(expected = "at least one record")]
    fn test_new_zero_count_panics() {
        RecordBatch::new(0, 0, Bytes::from("x"));
    }

    #[test]
    fn test_zero_base_offset() {
        let batch = RecordBatch::new(0, 10, Bytes::from("x"));
        assert_eq!(batch.first_offset(), 0);
        assert_eq!(batch.last_offset(), 9);
    }

    #[test]
    fn test_empty_payload_is_allowed() {
        // A batch may carry zero payload bytes (e.g. control records); only
        // the record count must be non-zero.
        let batch = RecordBatch::new(5, 2, Bytes::new());
        assert_eq!(batch.size(), 0);
        assert_eq!(batch.end_offset(), 7);
    }

    // ---------------------------------------------------------------
    // Sharing semantics
    // ---------------------------------------------------------------

    #[test]
    fn test_clone_shares_payload() {
        let payload = Bytes::from(vec![7u8; 1024]);
        let batch = RecordBatch::new(0, 1, payload.clone());
        let cloned = batch.clone();
        // Bytes clones share the same backing allocation
        assert_eq!(cloned.payload().as_ptr(), batch.payload().as_ptr());
        assert_eq!(batch, cloned);
    }

    #[test]
    fn test_eq_differs_on_offset() {
        let a = RecordBatch::new(1, 1, Bytes::from("v"));
        let b = RecordBatch::new(2, 1, Bytes::from("v"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_eq_differs_on_payload() {
        let a = RecordBatch::new(1, 1, Bytes::from("x"));
        let b = RecordBatch::new(1, 1, Bytes::from("y"));
        assert_ne!(a, b);
    }

    // ---------------------------------------------------------------
    // Serde round-trip
    // ---------------------------------------------------------------

    #[test]
    fn test_serde_roundtrip() {
        let batch = RecordBatch::new(10, 3, Bytes::from(vec![1, 2, 3, 255]));
        let json = serde_json::to_string(&batch).expect("serialize");
        let back: RecordBatch = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(batch, back);
    }

    #[test]
    fn test_serde_roundtrip_empty_payload() {
        let batch = RecordBatch::new(0, 1, Bytes::new());
        let json = serde_json::to_string(&batch).expect("serialize");
        let back: RecordBatch = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(batch, back);
    }
}
