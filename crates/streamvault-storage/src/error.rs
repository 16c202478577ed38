//! Storage Error Types
//!
//! This module defines all error types that can occur on the read path.
//!
//! ## Error Categories
//!
//! ### Compaction-Induced Errors (retryable)
//! - `ObjectNotExist`: an object referenced by the block window was deleted
//! - `KeyNotFound`: the underlying store no longer has the object's key
//! - `BlockNotContinuous`: freshly discovered block indexes do not abut the
//!   window tail
//!
//! These three share one cause - a background compactor rewrote objects under
//! the reader - and one cure: reset the block window and retry once.
//!
//! ### Hard Errors (not retryable)
//! - `InternalConsistency`: the read cursor fell outside an assembled block's
//!   range, which indicates a window bookkeeping bug
//! - `LoadFailure`: a block load rejected; the failure is sticky on the block
//!   entry and surfaces to whichever read awaits it
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, Error>`. The enum is `Clone` so a single failure can propagate
//! through shared (coalesced) futures to every waiter.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Object not found: {0}")]
    ObjectNotExist(u64),

    #[error("Key not found in object store: {0}")]
    KeyNotFound(String),

    #[error("Block index not continuous at offset {0}")]
    BlockNotContinuous(u64),

    #[error("Internal consistency violation: {0}")]
    InternalConsistency(String),

    #[error("Block load failed: {0}")]
    LoadFailure(String),
}

impl Error {
    /// Whether the failure may be cured by resetting the block window and
    /// retrying the read against fresh object metadata.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ObjectNotExist(_) | Error::KeyNotFound(_) | Error::BlockNotContinuous(_)
        )
    }
}
