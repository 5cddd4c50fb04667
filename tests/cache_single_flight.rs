mod common;
use crate::common::{init_tracing, new_cache, reference_fingerprint};

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use changefeed::cache::{CacheOptions, HashCache, PathIdentity};
use changefeed::errors::CacheError;
use changefeed::fs::mock::MockFileSystem;
use changefeed::fs::FileSystem;
use changefeed::hash::HashEngine;

#[test]
fn concurrent_misses_read_the_file_once() {
    init_tracing();
    let cache = new_cache();
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("/w/big.bin", vec![7u8; 256 * 1024]);
    let key = PathIdentity::from("/w/big.bin");
    let barrier = Arc::new(Barrier::new(16));

    let threads: Vec<_> = (0..16)
        .map(|_| {
            let (cache, fs, key, barrier) =
                (Arc::clone(&cache), Arc::clone(&fs), key.clone(), Arc::clone(&barrier));
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_compute(&key, || {
                        thread::sleep(Duration::from_millis(50));
                        fs.open_read(key.as_path())
                    })
                    .unwrap()
            })
        })
        .collect();

    let fingerprints: Vec<u64> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    let expected = reference_fingerprint(&vec![7u8; 256 * 1024]);
    assert!(fingerprints.iter().all(|fp| *fp == expected));
    assert_eq!(fs.open_count("/w/big.bin"), 1);

    let stats = cache.stats();
    assert_eq!(stats.computations, 1);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn distinct_paths_compute_independently() {
    let cache = new_cache();
    let opened = Arc::new(AtomicUsize::new(0));
    let threads: Vec<_> = (0..8)
        .map(|i| {
            let (cache, opened) = (Arc::clone(&cache), Arc::clone(&opened));
            thread::spawn(move || {
                let key = PathIdentity::from(format!("/w/{i}").as_str());
                cache
                    .get_or_compute(&key, || {
                        opened.fetch_add(1, Ordering::SeqCst);
                        Ok(Cursor::new(format!("file {i}").into_bytes()))
                    })
                    .unwrap()
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(opened.load(Ordering::SeqCst), 8);
    assert_eq!(cache.len(), 8);
}

#[test]
fn missing_file_is_reported_and_not_cached() {
    let cache = new_cache();
    let fs = MockFileSystem::new();
    let key = PathIdentity::from("/w/missing");
    let err = cache
        .get_or_compute(&key, || fs.open_read(key.as_path()))
        .unwrap_err();
    assert!(matches!(err, CacheError::ContentUnavailable { .. }));
    assert!(cache.peek(&key).is_none());
}

#[test]
fn zero_ttl_never_serves_from_cache() {
    let cache = HashCache::new(
        HashEngine::detect(),
        CacheOptions {
            ttl: Duration::ZERO,
            ..CacheOptions::default()
        },
    )
    .unwrap();
    let key = PathIdentity::from("/w/a");
    let opened = AtomicUsize::new(0);
    for _ in 0..3 {
        cache
            .get_or_compute(&key, || {
                opened.fetch_add(1, Ordering::SeqCst);
                Ok(Cursor::new(b"x".to_vec()))
            })
            .unwrap();
    }
    assert_eq!(opened.load(Ordering::SeqCst), 3);
    assert_eq!(cache.sweep_expired(), 1);
    assert!(cache.is_empty());
}
