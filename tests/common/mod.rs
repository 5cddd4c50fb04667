#![allow(dead_code)]

use std::sync::Arc;

use changefeed::cache::{CacheOptions, HashCache};
use changefeed::hash::HashEngine;

pub use changefeed_test_utils::builders::{numbered_events, EventBuilder};
pub use changefeed_test_utils::{init_tracing, temp_ring, with_timeout, TempRing};

/// A cache over the detected engine with default options.
pub fn new_cache() -> Arc<HashCache> {
    Arc::new(HashCache::new(HashEngine::detect(), CacheOptions::default()).expect("valid options"))
}

/// Reference fingerprint of `data`, computed by the portable kernel.
pub fn reference_fingerprint(data: &[u8]) -> u64 {
    HashEngine::scalar().hash(data).fingerprint
}
