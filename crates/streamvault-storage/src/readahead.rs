//! Adaptive Readahead State Machine
//!
//! Decides when to prefetch, from which offset, and how much. The policy is
//! tuned for near-sequential consumers:
//!
//! - **Grow**: when the consumer catches up with the prefetched frontier, the
//!   window was too small - move the frontier to the consumer and double the
//!   window (capped).
//! - **Skip**: when the consumer has not yet reached the mark of the last
//!   prefetch, the window is still ahead - do nothing.
//! - **Reset**: when the cache evicts a block nobody consumed, prefetching is
//!   outpacing the cache. Fall back to the initial window size after a
//!   cooldown.
//!
//! The decision function is separated from the launch so the policy can be
//! tested without I/O; the stream reader runs the returned `(start, size)`
//! plan as a background acquisition.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::ReaderConfig;

pub(crate) struct Readahead {
    /// Where the next readahead starts
    next_offset: u64,

    /// Current prefetch window size in bytes
    size: usize,

    /// Value of `next_offset` when the last readahead launched
    mark_offset: u64,

    require_reset: bool,
    reset_at: Option<Instant>,
    inflight: bool,

    default_size: usize,
    max_size: usize,
    cooldown: Duration,
}

impl Readahead {
    pub fn new(config: &ReaderConfig) -> Self {
        Self {
            next_offset: 0,
            size: config.readahead_size,
            mark_offset: 0,
            require_reset: false,
            reset_at: None,
            inflight: false,
            default_size: config.readahead_size,
            max_size: config.max_readahead_size,
            cooldown: Duration::from_millis(config.readahead_cooldown_ms),
        }
    }

    /// Decide whether to launch a readahead for a consumer positioned at
    /// `next_read_offset`. Returns the `(start, size)` to prefetch and marks
    /// the controller in-flight; the caller must call [`Readahead::finish`]
    /// when the launched acquisition completes.
    pub fn plan(&mut self, next_read_offset: u64) -> Option<(u64, usize)> {
        if self.inflight {
            return None;
        }
        if let Some(reset_at) = self.reset_at {
            if reset_at.elapsed() < self.cooldown {
                // cache pressure cooldown
                return None;
            }
        }
        if self.require_reset {
            self.next_offset = 0;
            self.size = self.default_size;
            self.mark_offset = 0;
            self.require_reset = false;
        }
        if next_read_offset >= self.next_offset {
            // the consumer caught up with the prefetched frontier
            self.next_offset = next_read_offset;
            self.size = (self.size * 2).min(self.max_size);
        } else if next_read_offset <= self.mark_offset {
            // the consumer has not reached the last prefetch mark yet
            return None;
        }
        self.mark_offset = self.next_offset;
        self.inflight = true;
        Some((self.next_offset, self.size))
    }

    /// Move the frontier to the end of the last prefetched block
    pub fn advance_frontier(&mut self, end_offset: u64) {
        self.next_offset = end_offset;
    }

    /// The launched acquisition finished (successfully or not)
    pub fn finish(&mut self) {
        self.inflight = false;
    }

    /// An unread block was evicted: restart from the initial window size
    /// after the cooldown.
    pub fn reset(&mut self) {
        self.require_reset = true;
        self.reset_at = Some(Instant::now());
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_inflight(&self) -> bool {
        self.inflight
    }
}
