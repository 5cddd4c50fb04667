// src/pipeline/processor.rs

//! Turns one raw watcher event into (at most) one enriched event.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::cache::{HashCache, PathIdentity};
use crate::errors::CacheError;
use crate::fs::FileSystem;
use crate::ipc::{Event, EventKind};

/// An event as reported by a watcher backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: EventKind,
    pub timestamp_ns: u64,
    pub is_directory: bool,
}

/// Counters kept by the processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorCounters {
    /// Modified events dropped because the content did not change.
    pub suppressed: u64,
    /// Files over the size limit, published without a fingerprint.
    pub oversized: u64,
    /// Events dropped because the path is not valid UTF-8.
    pub non_utf8_paths: u64,
}

#[derive(Debug)]
pub struct ChangeProcessor {
    cache: Arc<HashCache>,
    fs: Arc<dyn FileSystem>,
    publish_unchanged: bool,
    max_file_size: Option<u64>,
    suppressed: AtomicU64,
    oversized: AtomicU64,
    non_utf8_paths: AtomicU64,
}

/// Outcome of fingerprinting one file.
enum Content {
    Hashed(u64),
    /// Over `max_file_size`; not read.
    TooLarge(u64),
}

impl ChangeProcessor {
    pub fn new(cache: Arc<HashCache>, fs: Arc<dyn FileSystem>, publish_unchanged: bool) -> Self {
        Self {
            cache,
            fs,
            publish_unchanged,
            max_file_size: None,
            suppressed: AtomicU64::new(0),
            oversized: AtomicU64::new(0),
            non_utf8_paths: AtomicU64::new(0),
        }
    }

    /// Skip hashing files larger than `limit` bytes.
    pub fn with_max_file_size(mut self, limit: Option<u64>) -> Self {
        self.max_file_size = limit;
        self
    }

    pub fn cache(&self) -> &Arc<HashCache> {
        &self.cache
    }

    pub fn counters(&self) -> ProcessorCounters {
        ProcessorCounters {
            suppressed: self.suppressed.load(Ordering::Relaxed),
            oversized: self.oversized.load(Ordering::Relaxed),
            non_utf8_paths: self.non_utf8_paths.load(Ordering::Relaxed),
        }
    }

    /// Enrich `raw`. `None` means the event is not published: either a
    /// metadata-only touch or a path the ring record cannot carry.
    ///
    /// Touch detection compares against the fingerprint still held by the
    /// cache, so it forgets a path when the cache does (TTL, eviction,
    /// invalidation).
    ///
    /// Blocks while hashing; call from a blocking context.
    pub fn process(&self, raw: &RawEvent) -> Option<Event> {
        let key = PathIdentity::absolute(&raw.path);
        let Some(path) = key.as_path().to_str() else {
            self.non_utf8_paths.fetch_add(1, Ordering::Relaxed);
            warn!(path = %key, kind = %raw.kind, "path is not valid UTF-8; event dropped");
            self.forget(&key, raw.is_directory);
            return None;
        };
        let event = |kind: EventKind, fingerprint: Option<u64>| Event {
            path: path.to_owned(),
            kind,
            is_directory: raw.is_directory,
            timestamp_ns: raw.timestamp_ns,
            fingerprint,
        };

        match raw.kind {
            EventKind::Deleted => {
                self.forget(&key, raw.is_directory);
                Some(event(EventKind::Deleted, None))
            }
            EventKind::Moved => {
                self.forget(&key, raw.is_directory);
                if raw.is_directory || !self.fs.is_file(key.as_path()) {
                    return Some(event(EventKind::Moved, None));
                }
                let fingerprint = match self.fingerprint(&key, raw.timestamp_ns) {
                    Ok(Content::Hashed(fp)) => Some(fp),
                    Ok(Content::TooLarge(_)) | Err(_) => None,
                };
                Some(event(EventKind::Moved, fingerprint))
            }
            EventKind::Created | EventKind::Modified if raw.is_directory => {
                Some(event(raw.kind, None))
            }
            EventKind::Created | EventKind::Modified => {
                let previous = self.cache.peek(&key).map(|entry| entry.fingerprint);
                match self.fingerprint(&key, raw.timestamp_ns) {
                    Ok(Content::Hashed(fp)) => {
                        if raw.kind == EventKind::Modified
                            && previous == Some(fp)
                            && !self.publish_unchanged
                        {
                            self.suppressed.fetch_add(1, Ordering::Relaxed);
                            trace!(path = %key, fingerprint = fp, "content unchanged; suppressing touch");
                            return None;
                        }
                        Some(event(raw.kind, Some(fp)))
                    }
                    Ok(Content::TooLarge(len)) => {
                        debug!(path = %key, len, "file over size limit; publishing without fingerprint");
                        self.cache.invalidate(&key);
                        Some(event(raw.kind, None))
                    }
                    Err(CacheError::ContentUnavailable { reason, .. }) => {
                        debug!(path = %key, %reason, "file vanished before hashing; reporting deletion");
                        self.forget(&key, false);
                        Some(event(EventKind::Deleted, None))
                    }
                }
            }
        }
    }

    fn fingerprint(&self, key: &PathIdentity, observed_at_ns: u64) -> Result<Content, CacheError> {
        if let Some(limit) = self.max_file_size {
            let len = self
                .fs
                .file_len(key.as_path())
                .map_err(|e| CacheError::ContentUnavailable {
                    path: key.to_string(),
                    reason: format!("{e:#}"),
                })?;
            if len > limit {
                self.oversized.fetch_add(1, Ordering::Relaxed);
                return Ok(Content::TooLarge(len));
            }
        }
        let fs = Arc::clone(&self.fs);
        self.cache
            .get_or_compute_after(key, observed_at_ns, || fs.open_read(key.as_path()))
            .map(Content::Hashed)
    }

    fn forget(&self, key: &PathIdentity, is_directory: bool) {
        self.cache.invalidate(key);
        if is_directory {
            self.cache.invalidate_under(key.as_path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::fs::mock::MockFileSystem;
    use crate::hash::HashEngine;
    use std::path::Path;

    fn setup(publish_unchanged: bool) -> (ChangeProcessor, Arc<MockFileSystem>) {
        setup_with(publish_unchanged, CacheOptions::default())
    }

    fn setup_with(
        publish_unchanged: bool,
        options: CacheOptions,
    ) -> (ChangeProcessor, Arc<MockFileSystem>) {
        let fs = Arc::new(MockFileSystem::new());
        let cache = Arc::new(HashCache::new(HashEngine::detect(), options).unwrap());
        let processor = ChangeProcessor::new(cache, fs.clone(), publish_unchanged);
        (processor, fs)
    }

    fn raw(path: &str, kind: EventKind) -> RawEvent {
        RawEvent {
            path: PathBuf::from(path),
            kind,
            timestamp_ns: crate::clock::unix_time_ns(),
            is_directory: false,
        }
    }

    #[test]
    fn modified_file_gets_fingerprint() {
        let (processor, fs) = setup(false);
        fs.add_file("/w/a.txt", "hello world");

        let event = processor.process(&raw("/w/a.txt", EventKind::Modified)).unwrap();
        assert_eq!(event.kind, EventKind::Modified);
        assert_eq!(event.path, "/w/a.txt");
        assert_eq!(event.fingerprint, Some(0xde7d_3db1_8af4_0c4f));
    }

    #[test]
    fn touch_without_content_change_is_suppressed() {
        let (processor, fs) = setup(false);
        fs.add_file("/w/a.txt", "same");

        assert!(processor.process(&raw("/w/a.txt", EventKind::Modified)).is_some());
        assert!(processor.process(&raw("/w/a.txt", EventKind::Modified)).is_none());
        assert_eq!(processor.counters().suppressed, 1);

        fs.add_file("/w/a.txt", "different");
        assert!(processor.process(&raw("/w/a.txt", EventKind::Modified)).is_some());
    }

    #[test]
    fn publish_unchanged_keeps_touches() {
        let (processor, fs) = setup(true);
        fs.add_file("/w/a.txt", "same");
        assert!(processor.process(&raw("/w/a.txt", EventKind::Modified)).is_some());
        assert!(processor.process(&raw("/w/a.txt", EventKind::Modified)).is_some());
        assert_eq!(processor.counters().suppressed, 0);
    }

    #[test]
    fn vanished_file_is_reported_as_deleted() {
        let (processor, _fs) = setup(false);
        let event = processor.process(&raw("/w/gone.txt", EventKind::Created)).unwrap();
        assert_eq!(event.kind, EventKind::Deleted);
        assert_eq!(event.fingerprint, None);
        assert!(processor.cache().is_empty());
    }

    #[test]
    fn delete_then_recreate_never_reuses_old_fingerprint() {
        let (processor, fs) = setup(false);
        fs.add_file("/w/a.txt", "v1");
        let first = processor.process(&raw("/w/a.txt", EventKind::Created)).unwrap();

        fs.remove("/w/a.txt");
        let deleted = processor.process(&raw("/w/a.txt", EventKind::Deleted)).unwrap();
        assert_eq!(deleted.fingerprint, None);

        fs.add_file("/w/a.txt", "v2");
        let second = processor.process(&raw("/w/a.txt", EventKind::Created)).unwrap();
        assert_ne!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn deleting_a_directory_drops_its_descendants() {
        let (processor, fs) = setup(false);
        fs.add_file("/w/src/a.rs", "a");
        fs.add_file("/w/src/b.rs", "b");
        fs.add_file("/w/keep.rs", "k");
        for p in ["/w/src/a.rs", "/w/src/b.rs", "/w/keep.rs"] {
            processor.process(&raw(p, EventKind::Created)).unwrap();
        }

        let dir_gone = RawEvent {
            is_directory: true,
            ..raw("/w/src", EventKind::Deleted)
        };
        let event = processor.process(&dir_gone).unwrap();
        assert!(event.is_directory);
        assert_eq!(processor.cache().len(), 1);
        assert!(processor.cache().peek(&Path::new("/w/keep.rs").into()).is_some());
    }

    #[test]
    fn moved_file_is_rehashed_at_destination() {
        let (processor, fs) = setup(false);
        fs.add_file("/w/new.txt", "moved content");

        let src = processor.process(&raw("/w/old.txt", EventKind::Moved)).unwrap();
        assert_eq!(src.fingerprint, None);

        let dst = processor.process(&raw("/w/new.txt", EventKind::Moved)).unwrap();
        assert_eq!(
            dst.fingerprint,
            Some(HashEngine::scalar().hash(b"moved content").fingerprint)
        );
    }

    #[test]
    fn oversized_file_is_published_without_reading_it() {
        let (processor, fs) = setup(false);
        let processor = processor.with_max_file_size(Some(8));
        fs.add_file("/w/big.bin", "0123456789");
        fs.add_file("/w/small.txt", "tiny");

        let big = processor.process(&raw("/w/big.bin", EventKind::Modified)).unwrap();
        assert_eq!(big.kind, EventKind::Modified);
        assert_eq!(big.fingerprint, None);
        assert_eq!(fs.open_count("/w/big.bin"), 0);
        assert!(processor.cache().peek(&Path::new("/w/big.bin").into()).is_none());

        let small = processor.process(&raw("/w/small.txt", EventKind::Created)).unwrap();
        assert!(small.fingerprint.is_some());

        let moved = processor.process(&raw("/w/big.bin", EventKind::Moved)).unwrap();
        assert_eq!(moved.fingerprint, None);
        assert_eq!(processor.counters().oversized, 2);
        assert_eq!(processor.counters().suppressed, 0);
    }

    #[test]
    fn file_growing_past_the_limit_drops_its_cached_fingerprint() {
        let (processor, fs) = setup(false);
        let processor = processor.with_max_file_size(Some(8));
        fs.add_file("/w/log.txt", "short");
        assert!(processor
            .process(&raw("/w/log.txt", EventKind::Created))
            .unwrap()
            .fingerprint
            .is_some());

        fs.add_file("/w/log.txt", "much longer now");
        let event = processor.process(&raw("/w/log.txt", EventKind::Modified)).unwrap();
        assert_eq!(event.fingerprint, None);
        assert!(processor.cache().is_empty());
    }

    #[test]
    fn touch_memory_is_bounded_by_the_cache() {
        let options = CacheOptions {
            max_entries: 10,
            ..CacheOptions::default()
        };
        let (processor, fs) = setup_with(false, options);
        for i in 0..50 {
            let path = format!("/w/{i}.txt");
            fs.add_file(&path, "same");
            assert!(processor.process(&raw(&path, EventKind::Modified)).is_some());
        }
        assert!(processor.cache().len() <= 10);

        // /w/0.txt was evicted, so its next touch cannot be recognised as one.
        assert!(processor.process(&raw("/w/0.txt", EventKind::Modified)).is_some());
        // /w/49.txt is still cached and its touch is suppressed.
        assert!(processor.process(&raw("/w/49.txt", EventKind::Modified)).is_none());
        assert_eq!(processor.counters().suppressed, 1);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_path_is_counted_and_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (processor, fs) = setup(false);
        let path = Path::new("/w").join(OsStr::from_bytes(b"bad\xff.txt"));
        fs.add_file(&path, "content");

        let event = RawEvent {
            path: path.clone(),
            ..raw("/w/ignored", EventKind::Modified)
        };
        assert!(processor.process(&event).is_none());
        assert_eq!(processor.counters().non_utf8_paths, 1);
        assert_eq!(fs.open_count(&path), 0);
        assert!(processor.cache().is_empty());
    }
}
