// src/daemon.rs

//! `changefeed daemon`: config -> cache -> ring -> pipeline -> watcher.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::HashCache;
use crate::cli::DaemonArgs;
use crate::config::{load_or_default, ConfigFile};
use crate::fs::RealFileSystem;
use crate::ipc::Producer;
use crate::pipeline::{Pipeline, PipelineHandle, RingSink};
use crate::watch::{spawn_watcher, PathFilter};

/// Run until Ctrl-C, then drain the pipeline.
pub async fn run_daemon(args: DaemonArgs) -> Result<()> {
    let mut cfg = load_or_default(args.config.as_deref())?;
    apply_overrides(&mut cfg, &args);

    let engine = crate::engine_for(cfg.hash.simd)?;
    info!(simd = %engine.level(), "hash engine selected");

    let cache = Arc::new(HashCache::new(engine, cfg.cache_options())?);
    let producer = Producer::create(&cfg.ring.path, &cfg.ring_options())
        .with_context(|| format!("creating ring at {}", cfg.ring.path.display()))?;
    info!(
        path = %cfg.ring.path.display(),
        capacity = cfg.ring.capacity,
        slot_size = cfg.ring.slot_size,
        "ring created"
    );

    let pipeline = Pipeline::start(
        Arc::clone(&cache),
        Arc::new(RealFileSystem),
        Arc::new(RingSink::new(producer)),
        cfg.pipeline_options(),
    );

    let filter = PathFilter::new(&cfg.watch.include, &cfg.watch.exclude)?;
    let watcher = spawn_watcher(
        &cfg.watch.paths,
        cfg.watch.recursive,
        filter,
        pipeline.handle(),
    )?;

    let maintenance = spawn_maintenance(&cfg, cache, pipeline.handle());

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl+C")?;
    info!("shutdown requested");

    // Stop the event source first so nothing new races the drain.
    drop(watcher);
    for task in maintenance {
        task.abort();
    }
    let report = pipeline.shutdown().await;
    info!(
        received = report.received,
        published = report.published,
        abandoned_lanes = report.abandoned_lanes,
        "daemon stopped"
    );
    Ok(())
}

fn apply_overrides(cfg: &mut ConfigFile, args: &DaemonArgs) {
    if let Some(ring) = &args.ring {
        debug!(path = %ring.display(), "ring path overridden on command line");
        cfg.ring.path = ring.clone();
    }
    if !args.paths.is_empty() {
        cfg.watch.paths = args.paths.clone();
    }
}

/// Cache sweeping and the periodic stats line.
fn spawn_maintenance(
    cfg: &ConfigFile,
    cache: Arc<HashCache>,
    pipeline: PipelineHandle,
) -> Vec<JoinHandle<()>> {
    let sweep_every = Duration::from_secs(cfg.hash.sweep_interval_secs);
    let stats_every = Duration::from_secs(cfg.pipeline.stats_interval_secs);

    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let cache = Arc::clone(&cache);
            match tokio::task::spawn_blocking(move || cache.sweep_expired()).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "swept expired cache entries"),
                Err(e) => warn!(error = %e, "cache sweep task failed"),
            }
        }
    });

    let reporter = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(stats_every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let s = pipeline.stats();
            info!(
                pending = s.pending,
                dropped = s.dropped,
                total_events = s.total_events,
                cache_size = s.cache_size,
                cache_hit_rate = s.cache_hit_rate,
                suppressed = s.suppressed,
                oversized = s.oversized,
                non_utf8_paths = s.non_utf8_paths,
                cache_evictions = s.cache_evictions,
                publish_failures = s.publish_failures,
                "stats"
            );
        }
    });

    vec![sweeper, reporter]
}
