//! Reader Configuration
//!
//! This module defines configuration for the read path.
//!
//! ## ReaderConfig
//!
//! Controls how a stream reader walks object metadata and prefetches blocks:
//!
//! - **readahead_size**: initial prefetch window (default: 512KB)
//! - **max_readahead_size**: cap for the doubling prefetch window (default: 32MB)
//! - **readahead_cooldown_ms**: pause after an eviction-pressure reset (default: 60s)
//! - **get_object_step**: objects fetched per window extension (default: 4)
//!
//! ## Usage
//!
//! ```ignore
//! use streamvault_storage::ReaderConfig;
//!
//! // Smaller prefetch for memory-constrained deployments
//! let config = ReaderConfig {
//!     max_readahead_size: 8 * 1024 * 1024,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Initial readahead window size in bytes (default: 512KB)
    #[serde(default = "default_readahead_size")]
    pub readahead_size: usize,

    /// Maximum readahead window size in bytes (default: 32MB)
    #[serde(default = "default_max_readahead_size")]
    pub max_readahead_size: usize,

    /// Readahead cooldown after an eviction-pressure reset, in milliseconds
    /// (default: 1 minute)
    #[serde(default = "default_readahead_cooldown_ms")]
    pub readahead_cooldown_ms: u64,

    /// Number of objects requested per block-window extension (default: 4)
    #[serde(default = "default_get_object_step")]
    pub get_object_step: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            readahead_size: default_readahead_size(),
            max_readahead_size: default_max_readahead_size(),
            readahead_cooldown_ms: default_readahead_cooldown_ms(),
            get_object_step: default_get_object_step(),
        }
    }
}

fn default_readahead_size() -> usize {
    512 * 1024 // 512KB
}

fn default_max_readahead_size() -> usize {
    32 * 1024 * 1024 // 32MB
}

fn default_readahead_cooldown_ms() -> u64 {
    60_000 // 1 minute
}

fn default_get_object_step() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReaderConfig::default();
        assert_eq!(config.readahead_size, 512 * 1024);
        assert_eq!(config.max_readahead_size, 32 * 1024 * 1024);
        assert_eq!(config.readahead_cooldown_ms, 60_000);
        assert_eq!(config.get_object_step, 4);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: ReaderConfig = serde_json::from_str(r#"{"get_object_step": 2}"#).unwrap();
        assert_eq!(config.get_object_step, 2);
        assert_eq!(config.readahead_size, 512 * 1024);
        assert_eq!(config.max_readahead_size, 32 * 1024 * 1024);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = ReaderConfig {
            readahead_size: 1024,
            max_readahead_size: 4096,
            readahead_cooldown_ms: 5_000,
            get_object_step: 8,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ReaderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.readahead_size, 1024);
        assert_eq!(back.max_readahead_size, 4096);
        assert_eq!(back.readahead_cooldown_ms, 5_000);
        assert_eq!(back.get_object_step, 8);
    }
}
