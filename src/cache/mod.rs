// src/cache/mod.rs

//! Concurrent fingerprint cache with single-flight computation.
//!
//! Entries live in a sharded [`DashMap`], so unrelated paths never contend on
//! one lock. A second map records computations in flight: the first caller
//! for a missing key becomes the leader and hashes the content, everyone
//! arriving meanwhile blocks on the leader's [`Flight`] and receives the same
//! outcome, errors included.
//!
//! Callers block on a condvar while waiting, so async code should call in
//! from `spawn_blocking`.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::clock::unix_time_ns;
use crate::errors::{CacheError, HashError};
use crate::hash::{HashEngine, DEFAULT_BLOCK_SIZE, STRIPE_LEN};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

pub const DEFAULT_MAX_ENTRIES: usize = 1_000_000;

/// Cache key: an absolute path, compared byte for byte.
///
/// [`PathIdentity::absolute`] makes relative paths absolute lexically;
/// symlinks are not resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathIdentity(PathBuf);

impl PathIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Anchor a relative path at the current directory. Falls back to the
    /// path as given if the current directory is unavailable.
    pub fn absolute(path: &Path) -> Self {
        Self(std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn is_under(&self, dir: &Path) -> bool {
        self.0.starts_with(dir) && self.0 != dir
    }
}

impl From<&Path> for PathIdentity {
    fn from(p: &Path) -> Self {
        Self(p.to_path_buf())
    }
}

impl From<PathBuf> for PathIdentity {
    fn from(p: PathBuf) -> Self {
        Self(p)
    }
}

impl From<&str> for PathIdentity {
    fn from(p: &str) -> Self {
        Self(PathBuf::from(p))
    }
}

impl fmt::Display for PathIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A cached fingerprint.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: u64,
    pub byte_length: u32,
    /// Monotonic time the computation finished; drives TTL expiry.
    pub computed_at: Instant,
    /// Wall-clock time the content read started. The entry reflects the file
    /// as it was at or after this instant.
    pub read_started_ns: u64,
    token: u64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.computed_at.elapsed() >= ttl
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    pub ttl: Duration,
    pub block_size: usize,
    /// Upper bound on cached paths. Going over it evicts the oldest entries
    /// down to 80% of the bound.
    pub max_entries: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            block_size: DEFAULT_BLOCK_SIZE,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Counters exposed through the stats snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    /// Entries dropped to stay under `max_entries`.
    pub evictions: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

type Outcome = Result<u64, CacheError>;

/// One in-flight computation.
struct Flight {
    read_started_ns: u64,
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
    /// Set by `invalidate` while the computation runs; the leader then
    /// discards its entry.
    stale: AtomicBool,
}

impl Flight {
    fn new(read_started_ns: u64) -> Self {
        Self {
            read_started_ns,
            outcome: Mutex::new(None),
            done: Condvar::new(),
            stale: AtomicBool::new(false),
        }
    }

    fn settle(&self, outcome: Outcome) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.done.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Releases waiters and the in-flight record even if the leader unwinds.
struct LeaderGuard<'a> {
    cache: &'a HashCache,
    key: &'a PathIdentity,
    flight: Arc<Flight>,
    settled: bool,
}

impl LeaderGuard<'_> {
    fn finish(mut self, outcome: Outcome) {
        self.release(outcome);
        self.settled = true;
    }

    fn release(&self, outcome: Outcome) {
        self.flight.settle(outcome);
        self.cache
            .in_flight
            .remove_if(self.key, |_, f| Arc::ptr_eq(f, &self.flight));
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(path = %self.key, "hash computation aborted; releasing waiters");
            self.release(Err(CacheError::ContentUnavailable {
                path: self.key.to_string(),
                reason: "hash computation aborted".to_string(),
            }));
        }
    }
}

pub struct HashCache {
    engine: HashEngine,
    options: CacheOptions,
    entries: DashMap<PathIdentity, CacheEntry>,
    in_flight: DashMap<PathIdentity, Arc<Flight>>,
    next_token: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    evictions: AtomicU64,
}

impl fmt::Debug for HashCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashCache")
            .field("engine", &self.engine)
            .field("options", &self.options)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl HashCache {
    pub fn new(engine: HashEngine, options: CacheOptions) -> Result<Self, HashError> {
        if options.block_size == 0 || options.block_size % STRIPE_LEN != 0 {
            return Err(HashError::InvalidBlockSize(options.block_size));
        }
        Ok(Self {
            engine,
            options,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            next_token: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            computations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    pub fn engine(&self) -> HashEngine {
        self.engine
    }

    pub fn ttl(&self) -> Duration {
        self.options.ttl
    }

    /// Fingerprint `key`, hashing the content from `open` on a miss.
    pub fn get_or_compute<F, R>(&self, key: &PathIdentity, open: F) -> Result<u64, CacheError>
    where
        F: FnOnce() -> anyhow::Result<R>,
        R: Read,
    {
        self.get_or_compute_after(key, 0, open)
    }

    /// Like [`get_or_compute`](Self::get_or_compute), but an entry or
    /// in-flight computation whose content read began before
    /// `observed_at_ns` does not count: the caller saw a change at that
    /// instant and needs a fingerprint of content at least that new.
    pub fn get_or_compute_after<F, R>(
        &self,
        key: &PathIdentity,
        observed_at_ns: u64,
        open: F,
    ) -> Result<u64, CacheError>
    where
        F: FnOnce() -> anyhow::Result<R>,
        R: Read,
    {
        loop {
            if let Some(fingerprint) = self.lookup(key, observed_at_ns) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(path = %key, fingerprint, "hash cache hit");
                return Ok(fingerprint);
            }

            let flight = Arc::new(Flight::new(unix_time_ns()));
            let joined = match self.in_flight.entry(key.clone()) {
                Entry::Occupied(existing) => Some(Arc::clone(existing.get())),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&flight));
                    None
                }
            };

            match joined {
                None => return self.lead(key, observed_at_ns, flight, open),
                Some(leader) => {
                    let outcome = leader.wait();
                    if leader.read_started_ns >= observed_at_ns
                        && !leader.stale.load(Ordering::SeqCst)
                    {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return outcome;
                    }
                    trace!(path = %key, "in-flight hash predates request; retrying");
                }
            }
        }
    }

    fn lead<F, R>(
        &self,
        key: &PathIdentity,
        observed_at_ns: u64,
        flight: Arc<Flight>,
        open: F,
    ) -> Outcome
    where
        F: FnOnce() -> anyhow::Result<R>,
        R: Read,
    {
        let guard = LeaderGuard {
            cache: self,
            key,
            flight: Arc::clone(&flight),
            settled: false,
        };

        // A previous leader may have finished between our lookup and our
        // claim on the in-flight slot.
        if let Some(fingerprint) = self.lookup(key, observed_at_ns) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            guard.finish(Ok(fingerprint));
            return Ok(fingerprint);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.computations.fetch_add(1, Ordering::Relaxed);

        let outcome = self.compute(key, open).map(|(fingerprint, byte_length)| {
            let entry = CacheEntry {
                fingerprint,
                byte_length,
                computed_at: Instant::now(),
                read_started_ns: flight.read_started_ns,
                token: self.next_token.fetch_add(1, Ordering::Relaxed),
            };
            self.store(key, &flight, entry);
            fingerprint
        });

        match &outcome {
            Ok(fingerprint) => debug!(path = %key, fingerprint, "computed fingerprint"),
            Err(e) => debug!(path = %key, error = %e, "content unavailable"),
        }

        guard.finish(outcome.clone());
        outcome
    }

    /// Insert a leader's result unless `invalidate` marked it stale.
    ///
    /// `stale` is read while holding the shard lock of `key`. `invalidate`
    /// sets it before taking the same lock to remove the entry, so a stale
    /// result is either never inserted or removed by that `invalidate`.
    fn store(&self, key: &PathIdentity, flight: &Flight, entry: CacheEntry) {
        let inserted = match self.entries.entry(key.clone()) {
            _ if flight.stale.load(Ordering::SeqCst) => false,
            Entry::Occupied(mut slot) => {
                slot.insert(entry);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        };
        if !inserted {
            debug!(path = %key, "discarded hash invalidated mid-computation");
            return;
        }
        if self.entries.len() > self.options.max_entries {
            self.evict_oldest();
        }
    }

    /// Drop the oldest entries until the cache is back to 80% of
    /// `max_entries`.
    fn evict_oldest(&self) {
        let target = self.options.max_entries / 5 * 4;
        let excess = self.entries.len().saturating_sub(target);
        if excess == 0 {
            return;
        }
        let mut by_age: Vec<(Instant, PathIdentity, u64)> = self
            .entries
            .iter()
            .map(|e| (e.computed_at, e.key().clone(), e.token))
            .collect();
        by_age.sort_unstable_by_key(|(computed_at, _, _)| *computed_at);

        let mut evicted = 0;
        for (_, key, token) in by_age.into_iter().take(excess) {
            if self.entries.remove_if(&key, |_, e| e.token == token).is_some() {
                evicted += 1;
            }
        }
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        debug!(evicted, max_entries = self.options.max_entries, "hash cache over capacity");
    }

    fn compute<F, R>(&self, key: &PathIdentity, open: F) -> Result<(u64, u32), CacheError>
    where
        F: FnOnce() -> anyhow::Result<R>,
        R: Read,
    {
        let unavailable = |e: anyhow::Error| CacheError::ContentUnavailable {
            path: key.to_string(),
            reason: format!("{e:#}"),
        };
        let mut reader = open().map_err(unavailable)?;
        let result = self
            .engine
            .hash_reader(&mut reader, self.options.block_size)
            .map_err(unavailable)?;
        Ok((result.fingerprint, result.byte_length))
    }

    /// Fresh entry for `key`, expiring it lazily if its TTL has passed.
    fn lookup(&self, key: &PathIdentity, observed_at_ns: u64) -> Option<u64> {
        let ttl = self.options.ttl;
        let (expired, fingerprint) = {
            let entry = self.entries.get(key)?;
            let fresh = entry.read_started_ns >= observed_at_ns;
            (
                entry.is_expired(ttl),
                fresh.then_some(entry.fingerprint),
            )
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.is_expired(ttl));
            return None;
        }
        fingerprint
    }

    /// Current entry without touching counters or computing.
    pub fn peek(&self, key: &PathIdentity) -> Option<CacheEntry> {
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(self.options.ttl))
            .map(|e| e.clone())
    }

    /// Forget `key`. A computation in flight for it is marked stale so its
    /// result is never stored. Returns whether an entry was removed.
    pub fn invalidate(&self, key: &PathIdentity) -> bool {
        if let Some((_, flight)) = self.in_flight.remove(key) {
            flight.stale.store(true, Ordering::SeqCst);
        }
        let removed = self.entries.remove(key).is_some();
        if removed {
            debug!(path = %key, "invalidated cached fingerprint");
        }
        removed
    }

    /// Forget every entry strictly below `dir`. Returns the number removed.
    pub fn invalidate_under(&self, dir: &Path) -> usize {
        let flying: Vec<PathIdentity> = self
            .in_flight
            .iter()
            .filter(|f| f.key().is_under(dir))
            .map(|f| f.key().clone())
            .collect();
        for key in &flying {
            if let Some((_, flight)) = self.in_flight.remove(key) {
                flight.stale.store(true, Ordering::SeqCst);
            }
        }

        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = !key.is_under(dir);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(dir = %dir.display(), removed, "invalidated cached fingerprints under directory");
        }
        removed
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let ttl = self.options.ttl;
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            in_flight: self.in_flight.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    fn cache_with_ttl(ttl: Duration) -> HashCache {
        HashCache::new(
            HashEngine::detect(),
            CacheOptions {
                ttl,
                block_size: 64,
                ..CacheOptions::default()
            },
        )
        .unwrap()
    }

    fn reader(bytes: &'static [u8]) -> impl FnOnce() -> anyhow::Result<Cursor<&'static [u8]>> {
        move || Ok(Cursor::new(bytes))
    }

    #[test]
    fn rejects_bad_block_size() {
        let err = HashCache::new(
            HashEngine::scalar(),
            CacheOptions {
                block_size: 100,
                ..CacheOptions::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, HashError::InvalidBlockSize(100));
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = cache_with_ttl(DEFAULT_TTL);
        let key = PathIdentity::from("/w/a.txt");

        let first = cache.get_or_compute(&key, reader(b"hello world")).unwrap();
        let second = cache
            .get_or_compute(&key, || -> anyhow::Result<Cursor<&[u8]>> {
                panic!("must not reopen a cached file")
            })
            .unwrap();

        assert_eq!(first, 0xde7d_3db1_8af4_0c4f);
        assert_eq!(first, second);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.computations), (1, 1, 1));
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let cache = cache_with_ttl(DEFAULT_TTL);
        let key = PathIdentity::from("/w/a.txt");

        let old = cache.get_or_compute(&key, reader(b"old content")).unwrap();
        assert!(cache.invalidate(&key));
        let new = cache.get_or_compute(&key, reader(b"new content")).unwrap();

        assert_ne!(old, new);
        assert_eq!(cache.stats().computations, 2);
    }

    #[test]
    fn expired_entries_read_as_miss_and_sweep() {
        let cache = cache_with_ttl(Duration::from_millis(20));
        cache.get_or_compute(&"/w/a".into(), reader(b"a")).unwrap();
        cache.get_or_compute(&"/w/b".into(), reader(b"b")).unwrap();
        assert_eq!(cache.len(), 2);

        thread::sleep(Duration::from_millis(40));
        assert!(cache.peek(&"/w/a".into()).is_none());
        assert_eq!(cache.sweep_expired(), 2);
        assert!(cache.is_empty());

        cache.get_or_compute(&"/w/a".into(), reader(b"a")).unwrap();
        assert_eq!(cache.stats().computations, 3);
    }

    #[test]
    fn unreadable_content_is_not_cached() {
        let cache = cache_with_ttl(DEFAULT_TTL);
        let key = PathIdentity::from("/w/gone.txt");

        let err = cache
            .get_or_compute(&key, || -> anyhow::Result<Cursor<&[u8]>> {
                anyhow::bail!("No such file or directory")
            })
            .unwrap_err();

        let CacheError::ContentUnavailable { path, reason } = err;
        assert_eq!(path, "/w/gone.txt");
        assert!(reason.contains("No such file"));
        assert!(cache.peek(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_callers_share_one_computation() {
        const CALLERS: usize = 8;
        let cache = Arc::new(cache_with_ttl(DEFAULT_TTL));
        let computations = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(CALLERS));
        let key = PathIdentity::from("/w/burst.txt");

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let computations = Arc::clone(&computations);
                let barrier = Arc::clone(&barrier);
                let key = key.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_compute(&key, || {
                            computations.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(100));
                            Ok(Cursor::new(b"burst".as_slice()))
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(computations.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.stats().computations, 1);
    }

    #[test]
    fn waiters_receive_the_leaders_error() {
        let cache = Arc::new(cache_with_ttl(DEFAULT_TTL));
        let key = PathIdentity::from("/w/vanishing.txt");
        let started = Arc::new(Barrier::new(2));

        let leader = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            let started = Arc::clone(&started);
            thread::spawn(move || {
                cache.get_or_compute(&key, || -> anyhow::Result<Cursor<&[u8]>> {
                    started.wait();
                    thread::sleep(Duration::from_millis(50));
                    anyhow::bail!("vanished")
                })
            })
        };

        started.wait();
        let waiter = cache.get_or_compute(&key, || -> anyhow::Result<Cursor<&[u8]>> {
            panic!("waiter must not compute")
        });

        assert!(leader.join().unwrap().is_err());
        assert!(waiter.is_err());
    }

    #[test]
    fn invalidate_during_computation_discards_result() {
        let cache = Arc::new(cache_with_ttl(DEFAULT_TTL));
        let key = PathIdentity::from("/w/racy.txt");
        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let leader = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            let (started, release) = (Arc::clone(&started), Arc::clone(&release));
            thread::spawn(move || {
                cache.get_or_compute(&key, || {
                    started.wait();
                    release.wait();
                    Ok(Cursor::new(b"pre-delete".as_slice()))
                })
            })
        };

        started.wait();
        cache.invalidate(&key);
        release.wait();
        leader.join().unwrap().unwrap();

        assert!(cache.peek(&key).is_none());
        let fresh = cache.get_or_compute(&key, reader(b"post-delete")).unwrap();
        assert_eq!(fresh, HashEngine::scalar().hash(b"post-delete").fingerprint);
    }

    #[test]
    fn invalidated_result_is_never_visible_after_invalidate_returns() {
        for _ in 0..200 {
            let cache = Arc::new(cache_with_ttl(DEFAULT_TTL));
            let key = PathIdentity::from("/w/racy.txt");
            let started = Arc::new(Barrier::new(2));
            let release = Arc::new(Barrier::new(2));

            let leader = {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                let (started, release) = (Arc::clone(&started), Arc::clone(&release));
                thread::spawn(move || {
                    cache.get_or_compute(&key, || {
                        started.wait();
                        release.wait();
                        Ok(Cursor::new(b"pre-delete".as_slice()))
                    })
                })
            };

            started.wait();
            cache.invalidate(&key);
            release.wait();
            // Watch the key the whole time the leader is storing its result.
            while !leader.is_finished() {
                assert!(cache.peek(&key).is_none());
            }
            leader.join().unwrap().unwrap();
            assert!(cache.peek(&key).is_none());
            assert!(cache.is_empty());
        }
    }

    #[test]
    fn over_capacity_evicts_oldest_down_to_80_percent() {
        let cache = HashCache::new(
            HashEngine::detect(),
            CacheOptions {
                max_entries: 10,
                ..CacheOptions::default()
            },
        )
        .unwrap();
        for i in 0..10 {
            cache
                .get_or_compute(&format!("/w/{i}").as_str().into(), reader(b"x"))
                .unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(cache.len(), 10);
        assert_eq!(cache.stats().evictions, 0);

        cache.get_or_compute(&"/w/new".into(), reader(b"y")).unwrap();
        assert_eq!(cache.len(), 8);
        assert_eq!(cache.stats().evictions, 3);
        for i in 0..3 {
            assert!(cache.peek(&format!("/w/{i}").as_str().into()).is_none());
        }
        assert!(cache.peek(&"/w/9".into()).is_some());
        assert!(cache.peek(&"/w/new".into()).is_some());
    }

    #[test]
    fn entries_older_than_the_event_are_misses() {
        let cache = cache_with_ttl(DEFAULT_TTL);
        let key = PathIdentity::from("/w/a.txt");

        cache.get_or_compute(&key, reader(b"v1")).unwrap();
        let observed = unix_time_ns() + 1_000_000;
        thread::sleep(Duration::from_millis(5));
        let fp = cache
            .get_or_compute_after(&key, observed, reader(b"v2"))
            .unwrap();

        assert_eq!(fp, HashEngine::scalar().hash(b"v2").fingerprint);
        assert_eq!(cache.stats().computations, 2);
    }

    #[test]
    fn invalidate_under_removes_only_descendants() {
        let cache = cache_with_ttl(DEFAULT_TTL);
        for p in ["/w/src/a.rs", "/w/src/deep/b.rs", "/w/srcs.txt", "/w/other.rs"] {
            cache.get_or_compute(&p.into(), reader(b"x")).unwrap();
        }

        assert_eq!(cache.invalidate_under(Path::new("/w/src")), 2);
        assert!(cache.peek(&"/w/srcs.txt".into()).is_some());
        assert!(cache.peek(&"/w/other.rs".into()).is_some());
        assert_eq!(cache.len(), 2);
    }
}
