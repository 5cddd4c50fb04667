// src/pipeline/mod.rs

//! watcher -> hash -> publish.
//!
//! Raw events enter through [`PipelineHandle::on_raw_event`], which any
//! number of backend threads may call. Each event is routed to one of N
//! lanes by a hash of its path, so all events for one path are handled by
//! the same lane in arrival order while unrelated paths hash in parallel.
//! Each lane is a tokio task that runs the CPU-bound processing and the
//! publish on the blocking pool.

pub mod processor;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::cache::HashCache;
use crate::errors::{PipelineError, RingError};
use crate::fs::FileSystem;
use crate::ipc::{Event, EventKind, Producer, RingStats};
use crate::stats::StatsSnapshot;

pub use processor::{ChangeProcessor, ProcessorCounters, RawEvent};

/// Where enriched events go.
pub trait EventSink: Send + Sync + 'static {
    fn publish(&self, event: &Event) -> Result<(), RingError>;
    fn ring_stats(&self) -> RingStats;
}

/// The production sink: a ring producer behind a mutex (the ring has a
/// single writer).
#[derive(Debug)]
pub struct RingSink {
    producer: Mutex<Producer>,
}

impl RingSink {
    pub fn new(producer: Producer) -> Self {
        Self {
            producer: Mutex::new(producer),
        }
    }
}

impl EventSink for RingSink {
    fn publish(&self, event: &Event) -> Result<(), RingError> {
        let mut producer = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        producer.publish(event).map(|_| ())
    }

    fn ring_stats(&self) -> RingStats {
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats()
    }
}

/// Files larger than this are published without a fingerprint.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Number of lanes. 0 means one per available CPU.
    pub workers: usize,
    pub shutdown_grace: Duration,
    pub publish_unchanged: bool,
    /// `None` hashes every file regardless of size.
    pub max_file_size: Option<u64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 0,
            shutdown_grace: Duration::from_secs(2),
            publish_unchanged: false,
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
        }
    }
}

impl PipelineOptions {
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map_or(4, |n| n.get())
        }
    }
}

struct Shared {
    processor: ChangeProcessor,
    sink: Arc<dyn EventSink>,
    abandon: AtomicBool,
    received: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
}

impl Shared {
    /// Process and publish one event. Runs on the blocking pool.
    fn handle(&self, raw: RawEvent) {
        let Some(event) = self.processor.process(&raw) else {
            return;
        };
        if self.abandon.load(Ordering::Acquire) {
            trace!(path = %event.path, "discarding result after shutdown grace");
            return;
        }
        match self.sink.publish(&event) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                trace!(path = %event.path, kind = %event.kind, "published event");
            }
            Err(e) => {
                self.publish_failures.fetch_add(1, Ordering::Relaxed);
                warn!(path = %event.path, error = %e, "failed to publish event");
            }
        }
    }
}

/// Cheap, cloneable entry point for watcher backends.
#[derive(Clone)]
pub struct PipelineHandle {
    lanes: Arc<RwLock<Vec<mpsc::UnboundedSender<RawEvent>>>>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle").finish()
    }
}

impl PipelineHandle {
    /// Accept one raw event. Safe to call from any thread, including
    /// non-runtime threads.
    pub fn on_raw_event(
        &self,
        path: impl Into<PathBuf>,
        kind: EventKind,
        timestamp_ns: u64,
        is_directory: bool,
    ) -> Result<(), PipelineError> {
        self.submit(RawEvent {
            path: path.into(),
            kind,
            timestamp_ns,
            is_directory,
        })
    }

    pub fn submit(&self, raw: RawEvent) -> Result<(), PipelineError> {
        let lanes = self.lanes.read().unwrap_or_else(PoisonError::into_inner);
        if lanes.is_empty() {
            return Err(PipelineError::ShuttingDown);
        }
        let lane = self.lane_for(&raw, lanes.len());
        self.shared.received.fetch_add(1, Ordering::Relaxed);
        lanes[lane]
            .send(raw)
            .map_err(|_| PipelineError::ShuttingDown)
    }

    fn lane_for(&self, raw: &RawEvent, lanes: usize) -> usize {
        let engine = self.shared.processor.cache().engine();
        let digest = engine.hash(raw.path.as_os_str().as_encoded_bytes()).fingerprint;
        (digest % lanes as u64) as usize
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot::collect(
            &self.shared.processor.cache().stats(),
            &self.shared.sink.ring_stats(),
            self.shared.processor.counters(),
            self.shared.publish_failures.load(Ordering::Relaxed),
        )
    }
}

/// Summary returned by [`Pipeline::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub received: u64,
    pub published: u64,
    /// Lanes still busy when the grace period ran out.
    pub abandoned_lanes: usize,
}

pub struct Pipeline {
    handle: PipelineHandle,
    workers: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl Pipeline {
    /// Start the lanes. Must be called inside a tokio runtime.
    pub fn start(
        cache: Arc<HashCache>,
        fs: Arc<dyn FileSystem>,
        sink: Arc<dyn EventSink>,
        options: PipelineOptions,
    ) -> Self {
        let shared = Arc::new(Shared {
            processor: ChangeProcessor::new(cache, fs, options.publish_unchanged)
                .with_max_file_size(options.max_file_size),
            sink,
            abandon: AtomicBool::new(false),
            received: AtomicU64::new(0),
            published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
        });

        let lane_count = options.effective_workers();
        let mut senders = Vec::with_capacity(lane_count);
        let mut workers = Vec::with_capacity(lane_count);
        for lane in 0..lane_count {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            workers.push(tokio::spawn(run_lane(lane, rx, Arc::clone(&shared))));
        }
        info!(lanes = lane_count, "pipeline started");

        Self {
            handle: PipelineHandle {
                lanes: Arc::new(RwLock::new(senders)),
                shared,
            },
            workers,
            grace: options.shutdown_grace,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.handle.stats()
    }

    /// Refuse new events, let the lanes drain for up to the grace period,
    /// then abandon whatever is still running. Abandoned results are never
    /// published.
    pub async fn shutdown(self) -> ShutdownReport {
        self.handle
            .lanes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let deadline = Instant::now() + self.grace;
        let mut abandoned_lanes = 0;
        for mut worker in self.workers {
            if tokio::time::timeout_at(deadline, &mut worker).await.is_err() {
                self.handle.shared.abandon.store(true, Ordering::Release);
                worker.abort();
                abandoned_lanes += 1;
            }
        }

        let shared = &self.handle.shared;
        let report = ShutdownReport {
            received: shared.received.load(Ordering::Relaxed),
            published: shared.published.load(Ordering::Relaxed),
            abandoned_lanes,
        };
        if abandoned_lanes > 0 {
            warn!(abandoned_lanes, "shutdown grace expired; abandoned in-flight work");
        }
        info!(received = report.received, published = report.published, "pipeline stopped");
        report
    }
}

async fn run_lane(lane: usize, mut rx: mpsc::UnboundedReceiver<RawEvent>, shared: Arc<Shared>) {
    debug!(lane, "lane started");
    while let Some(raw) = rx.recv().await {
        if shared.abandon.load(Ordering::Acquire) {
            break;
        }
        let job = Arc::clone(&shared);
        if let Err(e) = tokio::task::spawn_blocking(move || job.handle(raw)).await {
            error!(lane, error = %e, "event processing task failed");
        }
    }
    debug!(lane, "lane finished");
}
