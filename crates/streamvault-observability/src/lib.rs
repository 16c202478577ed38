//! StreamVault Observability
//!
//! Provides metrics and monitoring for StreamVault.
//!
//! # Features
//!
//! - Prometheus metrics export
//! - Structured logging with tracing (emitted at the call sites)
//!
//! # Usage
//!
//! ```no_run
//! use streamvault_observability::{metrics, exporter};
//!
//! // Register the block-cache / reader / readahead series
//! metrics::init();
//!
//! // Mount the scrape endpoint on the admin listener
//! let metrics_router = exporter::router();
//! ```

pub mod exporter;
pub mod metrics;

// Re-export commonly used items
pub use metrics::{init as init_metrics, REGISTRY};

/// Initialize all observability components
pub fn init() {
    metrics::init();
}
