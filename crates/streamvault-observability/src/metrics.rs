use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts, Registry};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Block Cache Metrics
    // ============================================================================

    /// Block cache hits
    pub static ref BLOCK_CACHE_HITS_TOTAL: IntCounter = IntCounter::new(
        "streamvault_block_cache_hits_total",
        "Total block cache hits"
    ).expect("metric can be created");

    /// Block cache misses
    pub static ref BLOCK_CACHE_MISSES_TOTAL: IntCounter = IntCounter::new(
        "streamvault_block_cache_misses_total",
        "Total block cache misses"
    ).expect("metric can be created");

    /// Blocks evicted under size pressure
    pub static ref BLOCK_CACHE_EVICTIONS_TOTAL: IntCounter = IntCounter::new(
        "streamvault_block_cache_evictions_total",
        "Total blocks evicted from the block cache"
    ).expect("metric can be created");

    /// Current block cache size in bytes
    pub static ref BLOCK_CACHE_SIZE_BYTES: IntGauge = IntGauge::new(
        "streamvault_block_cache_size_bytes",
        "Current block cache size in bytes"
    ).expect("metric can be created");

    // ============================================================================
    // Stream Reader Metrics
    // ============================================================================

    /// Total stream reads served
    pub static ref READER_READS_TOTAL: IntCounter = IntCounter::new(
        "streamvault_reader_reads_total",
        "Total stream reads served"
    ).expect("metric can be created");

    /// Reads retried after a compaction-induced failure
    pub static ref READER_RETRIES_TOTAL: IntCounter = IntCounter::new(
        "streamvault_reader_retries_total",
        "Total reads retried after the block window was reset"
    ).expect("metric can be created");

    /// Read latency
    pub static ref READER_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("streamvault_reader_latency_seconds", "Read latency in seconds")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["outcome"] // ok, error
    ).expect("metric can be created");

    // ============================================================================
    // Readahead Metrics
    // ============================================================================

    /// Readahead rounds launched
    pub static ref READAHEAD_LAUNCHES_TOTAL: IntCounter = IntCounter::new(
        "streamvault_readahead_launches_total",
        "Total readahead rounds launched"
    ).expect("metric can be created");

    /// Readahead resets caused by cache pressure
    pub static ref READAHEAD_RESETS_TOTAL: IntCounter = IntCounter::new(
        "streamvault_readahead_resets_total",
        "Total readahead resets caused by unread-block eviction"
    ).expect("metric can be created");

    // ============================================================================
    // Object Store Metrics
    // ============================================================================

    /// Object metadata listings (window extensions)
    pub static ref OBJECT_LISTINGS_TOTAL: IntCounter = IntCounter::new(
        "streamvault_object_listings_total",
        "Total object listings performed to extend block windows"
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        // Block cache metrics
        REGISTRY
            .register(Box::new(BLOCK_CACHE_HITS_TOTAL.clone()))
            .expect("block_cache_hits_total can be registered");
        REGISTRY
            .register(Box::new(BLOCK_CACHE_MISSES_TOTAL.clone()))
            .expect("block_cache_misses_total can be registered");
        REGISTRY
            .register(Box::new(BLOCK_CACHE_EVICTIONS_TOTAL.clone()))
            .expect("block_cache_evictions_total can be registered");
        REGISTRY
            .register(Box::new(BLOCK_CACHE_SIZE_BYTES.clone()))
            .expect("block_cache_size_bytes can be registered");

        // Reader metrics
        REGISTRY
            .register(Box::new(READER_READS_TOTAL.clone()))
            .expect("reader_reads_total can be registered");
        REGISTRY
            .register(Box::new(READER_RETRIES_TOTAL.clone()))
            .expect("reader_retries_total can be registered");
        REGISTRY
            .register(Box::new(READER_LATENCY.clone()))
            .expect("reader_latency can be registered");

        // Readahead metrics
        REGISTRY
            .register(Box::new(READAHEAD_LAUNCHES_TOTAL.clone()))
            .expect("readahead_launches_total can be registered");
        REGISTRY
            .register(Box::new(READAHEAD_RESETS_TOTAL.clone()))
            .expect("readahead_resets_total can be registered");

        // Object store metrics
        REGISTRY
            .register(Box::new(OBJECT_LISTINGS_TOTAL.clone()))
            .expect("object_listings_total can be registered");
    });
}
