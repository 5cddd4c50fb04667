// src/ipc/producer.rs

//! Single writer side of the ring.

use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::errors::RingError;

use super::codec::{Event, EventRef};
use super::layout::{
    committed_stamp, owner_pid, writing_stamp, Geometry, Region, FLAG_PRODUCER_CLOSED,
};
use super::wake::{self, process_alive, WakeMode};
use super::{OverflowPolicy, RingOptions, RingStats};

/// Outcome of a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    /// Monotonic event index (the ring's `write_index` before this publish).
    pub index: u64,
    /// The slot reused for this event still held an event some consumer had
    /// not read; `dropped_count` was incremented.
    pub dropped_oldest: bool,
}

/// The producing end of a ring region. Owns the region file's contents.
pub struct Producer {
    region: Region,
    path: PathBuf,
    overflow: OverflowPolicy,
    wake: WakeMode,
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("path", &self.path)
            .field("geometry", &self.region.geometry())
            .field("overflow", &self.overflow)
            .finish()
    }
}

impl Producer {
    /// Create a fresh region at `path`. A previous file there is replaced.
    pub fn create(path: impl AsRef<Path>, options: &RingOptions) -> Result<Self, RingError> {
        let path = path.as_ref();
        let geometry = Geometry::new(options.capacity, options.slot_size)?;
        let region = Region::create(path, geometry)?;

        info!(
            path = %path.display(),
            capacity = geometry.capacity,
            slot_size = geometry.slot_size,
            bytes = region.len(),
            overflow = ?options.overflow,
            "created ring region"
        );

        Ok(Self {
            region,
            path: path.to_path_buf(),
            overflow: options.overflow,
            wake: options.wake,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn geometry(&self) -> Geometry {
        self.region.geometry()
    }

    pub fn publish(&mut self, event: &Event) -> Result<Published, RingError> {
        self.publish_ref(&event.as_event_ref())
    }

    /// Serialize `event` straight into the next slot and make it visible.
    pub fn publish_ref(&mut self, event: &EventRef<'_>) -> Result<Published, RingError> {
        let geometry = self.region.geometry();
        let max = geometry.payload_capacity();
        let len = event.encoded_len();
        if len > max || event.path.len() > usize::from(u16::MAX) {
            return Err(RingError::RecordTooLarge { len, max });
        }

        let header = self.region.header();
        let index = header.write_index.load(Ordering::Relaxed);
        let capacity = u64::from(geometry.capacity);

        let dropped_oldest = if index >= capacity {
            self.make_room(index - capacity)?
        } else {
            false
        };

        let slot = self.region.slot(index);
        slot.sequence.store(writing_stamp(index), Ordering::Relaxed);
        fence(Ordering::Release);

        // SAFETY: the payload area of this slot is `max` bytes inside the
        // mapping and only this producer writes it; readers validate the
        // sequence stamp around their copy.
        let payload =
            unsafe { std::slice::from_raw_parts_mut(self.region.payload_ptr(index), max) };
        let written = event.encode_into(payload)?;
        slot.payload_len.store(written as u32, Ordering::Relaxed);
        slot.sequence.store(committed_stamp(index), Ordering::Release);

        header.write_index.store(index + 1, Ordering::Release);
        wake::notify(self.region.trailer(), self.wake);

        Ok(Published {
            index,
            dropped_oldest,
        })
    }

    /// Decide whether event `oldest` may be overwritten. Returns whether the
    /// overwrite loses an unread event.
    fn make_room(&self, oldest: u64) -> Result<bool, RingError> {
        match self.overflow {
            OverflowPolicy::DropOldest => {
                let consumed = self.slowest_cursor().is_some_and(|slowest| slowest > oldest);
                if !consumed {
                    self.count_drop();
                }
                Ok(!consumed)
            }
            OverflowPolicy::Block { timeout } => self.wait_for_consumers(oldest, timeout),
        }
    }

    fn wait_for_consumers(&self, oldest: u64, timeout: Option<Duration>) -> Result<bool, RingError> {
        let started = Instant::now();
        let mut pause = Duration::from_micros(20);
        loop {
            match self.slowest_cursor() {
                None => {
                    // Nobody to wait for.
                    self.count_drop();
                    return Ok(true);
                }
                Some(slowest) if slowest > oldest => return Ok(false),
                Some(_) => {}
            }

            let waited = started.elapsed();
            if timeout.is_some_and(|t| waited >= t) {
                debug!(?waited, oldest, "publish timed out waiting for consumers");
                return Err(RingError::Backpressure { waited });
            }
            std::thread::sleep(pause);
            pause = (pause * 2).min(Duration::from_millis(1));
        }
    }

    fn count_drop(&self) {
        let dropped = self.region.header().dropped_count.fetch_add(1, Ordering::AcqRel) + 1;
        if dropped.is_power_of_two() {
            warn!(dropped, path = %self.path.display(), "ring full; dropping oldest unread events");
        }
    }

    /// Read index of the slowest live consumer.
    fn slowest_cursor(&self) -> Option<u64> {
        self.region
            .active_cursors()
            .filter(|(owner, _)| process_alive(owner_pid(*owner)))
            .map(|(_, read_index)| read_index)
            .min()
    }

    pub fn stats(&self) -> RingStats {
        let header = self.region.header();
        let total = header.write_index.load(Ordering::Acquire);
        let capacity = u64::from(self.region.geometry().capacity);
        let pending = self
            .slowest_cursor()
            .map(|slowest| total.saturating_sub(slowest).min(capacity))
            .unwrap_or(0);
        RingStats {
            pending,
            dropped: header.dropped_count.load(Ordering::Acquire),
            total,
            missed: 0,
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.region
            .active_cursors()
            .filter(|(owner, _)| process_alive(owner_pid(*owner)))
            .count()
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        let trailer = self.region.trailer();
        trailer
            .flags
            .fetch_or(FLAG_PRODUCER_CLOSED, Ordering::Release);
        wake::notify(trailer, self.wake);
        debug!(path = %self.path.display(), "ring producer closed");
    }
}
