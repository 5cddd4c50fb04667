// src/stats.rs

//! Statistics snapshot handed to the API/CLI layer.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::ipc::RingStats;
use crate::pipeline::ProcessorCounters;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Events the slowest consumer has not read yet.
    pub pending: u64,
    /// Events overwritten before every consumer read them.
    pub dropped: u64,
    /// Events ever published to the ring.
    pub total_events: u64,
    pub cache_size: usize,
    pub cache_hit_rate: f64,
    /// Touch-only modifications that were not published.
    pub suppressed: u64,
    /// Files over the size limit, published without a fingerprint.
    pub oversized: u64,
    /// Events dropped because the path is not valid UTF-8.
    pub non_utf8_paths: u64,
    /// Cache entries evicted to stay under `max_entries`.
    pub cache_evictions: u64,
    pub publish_failures: u64,
}

impl StatsSnapshot {
    pub fn collect(
        cache: &CacheStats,
        ring: &RingStats,
        processor: ProcessorCounters,
        publish_failures: u64,
    ) -> Self {
        Self {
            pending: ring.pending,
            dropped: ring.dropped,
            total_events: ring.total,
            cache_size: cache.entries,
            cache_hit_rate: cache.hit_rate(),
            suppressed: processor.suppressed,
            oversized: processor.oversized,
            non_utf8_paths: processor.non_utf8_paths,
            cache_evictions: cache.evictions,
            publish_failures,
        }
    }
}
