pub mod builders;

use std::path::{Path, PathBuf};
use std::sync::Once;

use changefeed::ipc::{Consumer, ConsumerOptions, Producer, RingOptions, StartFrom, WakeMode};
use tempfile::TempDir;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A ring region in a fresh temp dir. Keep the `TempRing` alive for as long
/// as the region is used; dropping it removes the directory.
pub struct TempRing {
    pub dir: TempDir,
    pub path: PathBuf,
    pub producer: Producer,
}

impl TempRing {
    /// Attach a consumer that polls instead of blocking on the futex, so
    /// tests never depend on wakeups.
    pub fn consumer(&self, start: StartFrom) -> Consumer {
        Self::consumer_at(&self.path, start)
    }

    /// Same as [`consumer`](Self::consumer), for when the producer has been
    /// moved out of the `TempRing`.
    pub fn consumer_at(path: &Path, start: StartFrom) -> Consumer {
        Consumer::attach(
            path,
            ConsumerOptions {
                start,
                wake: WakeMode::Poll,
            },
        )
        .expect("attach consumer")
    }
}

/// Create a ring with `capacity` slots of 256 bytes and the given options.
pub fn temp_ring(capacity: u32, options: RingOptions) -> TempRing {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("events.ring");
    let producer = Producer::create(
        &path,
        &RingOptions {
            capacity,
            slot_size: 256,
            ..options
        },
    )
    .expect("create ring");
    TempRing {
        dir,
        path,
        producer,
    }
}
