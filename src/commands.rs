// src/commands.rs

//! The small client subcommands: `tail` and `hash`.

use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::{HashArgs, TailArgs};
use crate::config::default_ring_path;
use crate::fs::{FileSystem, RealFileSystem};
use crate::hash::{HashEngine, HashResult};
use crate::ipc::{Consumer, ConsumerOptions, WakeMode};

const TAIL_POLL: Duration = Duration::from_millis(250);

/// Attach a consumer and print events to stdout until Ctrl-C, `--count`
/// events, or the producer closes the ring.
pub async fn tail(args: TailArgs) -> Result<()> {
    let path = args.ring.clone().unwrap_or_else(default_ring_path);
    let options = ConsumerOptions {
        start: args.from.into(),
        wake: if args.poll { WakeMode::Poll } else { WakeMode::Futex },
    };
    let consumer = Consumer::attach(&path, options)
        .with_context(|| format!("attaching to ring at {}", path.display()))?;
    info!(path = %path.display(), pending = consumer.pending(), "tailing ring");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::Release);
            }
        });
    }

    let count = args.count;
    tokio::task::spawn_blocking(move || {
        tail_blocking(consumer, count, &stop, &mut io::stdout().lock())
    })
    .await
    .context("tail task failed")?
}

fn tail_blocking(
    mut consumer: Consumer,
    count: Option<u64>,
    stop: &AtomicBool,
    out: &mut impl Write,
) -> Result<()> {
    let mut printed = 0u64;
    while !stop.load(Ordering::Acquire) {
        if count.is_some_and(|limit| printed >= limit) {
            break;
        }
        if let Some(event) = consumer.poll_ref(TAIL_POLL)? {
            writeln!(out, "{event}")?;
            printed += 1;
            continue;
        }
        if consumer.is_producer_closed() && consumer.pending() == 0 {
            info!("producer closed the ring");
            break;
        }
    }
    out.flush()?;

    let stats = consumer.stats();
    if stats.missed > 0 {
        warn!(missed = stats.missed, "consumer fell behind and skipped events");
    }
    debug!(printed, dropped = stats.dropped, total = stats.total, "tail finished");
    Ok(())
}

/// Print `fingerprint  path  N bytes` for every file.
pub fn hash_files(args: &HashArgs) -> Result<()> {
    let engine = crate::engine_for(args.simd)?;
    debug!(simd = %engine.level(), "hashing with");
    let fs = RealFileSystem;
    let mut out = io::stdout().lock();
    for file in &args.files {
        let result = hash_file(&fs, &engine, file, args.block_size)?;
        writeln!(
            out,
            "{:016x}  {}  {} bytes",
            result.fingerprint,
            file.display(),
            result.byte_length
        )?;
    }
    Ok(())
}

fn hash_file(
    fs: &dyn FileSystem,
    engine: &HashEngine,
    path: &Path,
    block_size: usize,
) -> Result<HashResult> {
    let mut reader = fs.open_read(path)?;
    engine
        .hash_reader(&mut reader, block_size)
        .with_context(|| format!("hashing {}", path.display()))
}
