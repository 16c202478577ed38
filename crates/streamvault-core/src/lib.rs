//! Core Types for StreamVault
//!
//! This crate defines the data model shared by every StreamVault component:
//!
//! - [`RecordBatch`]: the indivisible unit of stream data returned to readers
//! - [`DataBlockIndex`]: metadata describing one data block inside an object
//! - [`ObjectMetadata`]: identity of an immutable remote object
//!
//! Everything here is cheap to clone: payloads use `bytes::Bytes`, so clones
//! share the underlying allocation and the last drop frees it.

pub mod batch;
pub mod object;

pub use batch::RecordBatch;
pub use object::{DataBlockIndex, ObjectMetadata};
