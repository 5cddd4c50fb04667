// src/ipc/consumer.rs

//! Reading side of the ring. Any number of consumers, in any process, each
//! with its own cursor in the region trailer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::errors::RingError;

use super::codec::{Event, EventRef};
use super::layout::{committed_stamp, owner_pid, CursorSlot, Region, OWNER_CLAIMING};
use super::wake::{self, process_alive, WakeMode};
use super::RingStats;

/// Where a new consumer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartFrom {
    /// The oldest event still held by the ring.
    #[default]
    Oldest,
    /// Only events published after attaching.
    Latest,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumerOptions {
    pub start: StartFrom,
    pub wake: WakeMode,
}

enum Step {
    /// A record was copied into the scratch buffer.
    Ready,
    /// Nothing published past the cursor yet.
    Empty,
}

pub struct Consumer {
    region: Region,
    path: PathBuf,
    cursor_slot: usize,
    /// Owner word we wrote into our cursor; 0 once released.
    cursor_token: u64,
    read_index: u64,
    missed: u64,
    scratch: Vec<u8>,
    wake: WakeMode,
    poisoned: Option<String>,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("path", &self.path)
            .field("cursor_slot", &self.cursor_slot)
            .field("read_index", &self.read_index)
            .field("missed", &self.missed)
            .finish()
    }
}

impl Consumer {
    /// Map the region at `path`, validate it and claim a cursor.
    pub fn attach(path: impl AsRef<Path>, options: ConsumerOptions) -> Result<Self, RingError> {
        let path = path.as_ref();
        let region = Region::attach(path)?;
        let geometry = region.geometry();

        let write_index = region.header().write_index.load(Ordering::Acquire);
        let start = match options.start {
            StartFrom::Oldest => write_index.saturating_sub(u64::from(geometry.capacity)),
            StartFrom::Latest => write_index,
        };
        let (cursor_slot, cursor_token) = claim_cursor(&region.trailer().cursors, start)?;

        debug!(
            path = %path.display(),
            cursor_slot,
            start,
            "attached ring consumer"
        );

        Ok(Self {
            path: path.to_path_buf(),
            cursor_slot,
            cursor_token,
            read_index: start,
            missed: 0,
            scratch: Vec::with_capacity(geometry.payload_capacity()),
            wake: options.wake,
            poisoned: None,
            region,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next event, waiting up to `timeout`. `Ok(None)` on timeout or when
    /// the producer has closed and everything was read.
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<Event>, RingError> {
        Ok(self.poll_ref(timeout)?.map(|event| event.to_event()))
    }

    /// Like [`poll`](Self::poll) but borrows the event from the consumer's
    /// read buffer instead of allocating.
    pub fn poll_ref(&mut self, timeout: Duration) -> Result<Option<EventRef<'_>>, RingError> {
        if let Some(reason) = &self.poisoned {
            return Err(RingError::Corrupted(reason.clone()));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let trailer = self.region.trailer();
            let observed = trailer.wake_seq.load(Ordering::SeqCst);

            match self.step() {
                Ok(Step::Ready) => break,
                Ok(Step::Empty) => {}
                Err(e) => return Err(self.poison(e)),
            }

            if self.region.is_closed() {
                return Ok(None);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            wake::wait(self.region.trailer(), observed, deadline - now, self.wake);
        }

        if let Err(e) = EventRef::decode(&self.scratch) {
            warn!(path = %self.path.display(), error = %e, "undecodable ring record");
            self.poisoned = Some(e.to_string());
            self.release_cursor();
            return Err(e);
        }
        EventRef::decode(&self.scratch).map(Some)
    }

    /// Try to copy the record at the cursor into `scratch` and advance.
    fn step(&mut self) -> Result<Step, RingError> {
        let capacity = u64::from(self.region.geometry().capacity);
        let max = self.region.geometry().payload_capacity();

        loop {
            let write_index = self.region.header().write_index.load(Ordering::Acquire);
            if self.read_index >= write_index {
                return Ok(Step::Empty);
            }
            if write_index - self.read_index > capacity {
                self.skip_to(write_index - capacity);
                continue;
            }

            let index = self.read_index;
            let expected = committed_stamp(index);
            let slot = self.region.slot(index);
            let before = slot.sequence.load(Ordering::Acquire);

            if before > expected {
                // The producer has already reused this slot for a later event.
                self.skip_to(index + 1);
                continue;
            }
            if before < expected {
                return Err(RingError::Corrupted(format!(
                    "slot for event {index} carries stamp {before}, expected {expected}"
                )));
            }

            let len = slot.payload_len.load(Ordering::Relaxed) as usize;
            if len > max {
                return Err(RingError::Corrupted(format!(
                    "event {index} claims {len} payload bytes, slots hold {max}"
                )));
            }
            self.scratch.resize(len, 0);
            // SAFETY: `len <= max` bytes of payload are in bounds of this
            // slot; a concurrent overwrite is detected by the stamp re-check
            // below and the copy is discarded.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.region.payload_ptr(index),
                    self.scratch.as_mut_ptr(),
                    len,
                );
            }
            fence(Ordering::Acquire);
            if slot.sequence.load(Ordering::Relaxed) != before {
                trace!(index, "slot overwritten during read; retrying");
                continue;
            }

            self.advance(index + 1);
            return Ok(Step::Ready);
        }
    }

    fn skip_to(&mut self, index: u64) {
        let skipped = index - self.read_index;
        self.missed += skipped;
        debug!(from = self.read_index, to = index, skipped, "consumer lapped by producer");
        self.advance(index);
    }

    fn advance(&mut self, index: u64) {
        self.read_index = index;
        self.cursor()
            .read_index
            .store(index, Ordering::Release);
    }

    fn cursor(&self) -> &CursorSlot {
        &self.region.trailer().cursors[self.cursor_slot]
    }

    fn poison(&mut self, e: RingError) -> RingError {
        let reason = e.to_string();
        warn!(path = %self.path.display(), %reason, "ring protocol violation; consumer stopped");
        self.poisoned = Some(reason);
        self.release_cursor();
        e
    }

    /// Give our cursor back so the producer stops waiting on it. Only clears
    /// the owner word if it is still ours.
    fn release_cursor(&mut self) {
        if self.cursor_token == 0 {
            return;
        }
        let released = self
            .cursor()
            .owner
            .compare_exchange(self.cursor_token, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !released {
            debug!(cursor_slot = self.cursor_slot, "cursor already taken over; not releasing");
        }
        self.cursor_token = 0;
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    pub fn is_producer_closed(&self) -> bool {
        self.region.is_closed()
    }

    /// Events in the ring this consumer has not read yet.
    pub fn pending(&self) -> u64 {
        let write_index = self.region.header().write_index.load(Ordering::Acquire);
        write_index
            .saturating_sub(self.read_index)
            .min(u64::from(self.region.geometry().capacity))
    }

    pub fn stats(&self) -> RingStats {
        let header = self.region.header();
        RingStats {
            pending: self.pending(),
            dropped: header.dropped_count.load(Ordering::Acquire),
            total: header.write_index.load(Ordering::Acquire),
            missed: self.missed,
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.release_cursor();
    }
}

/// Claim a free cursor (or one whose owner process died) and publish `start`.
/// Returns the slot and the owner token written into it.
fn claim_cursor(cursors: &[CursorSlot], start: u64) -> Result<(usize, u64), RingError> {
    let pid = std::process::id();
    for (slot, cursor) in cursors.iter().enumerate() {
        let owner = cursor.owner.load(Ordering::Acquire);
        if owner == OWNER_CLAIMING || (owner != 0 && process_alive(owner_pid(owner))) {
            continue;
        }
        if cursor
            .owner
            .compare_exchange(owner, OWNER_CLAIMING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            continue;
        }
        if owner != 0 {
            debug!(slot, dead_pid = owner_pid(owner), "reclaimed cursor of exited consumer");
        }
        cursor.read_index.store(start, Ordering::Release);
        let token = (u64::from(pid) << 32) | (slot as u64 + 1);
        cursor.owner.store(token, Ordering::Release);
        return Ok((slot, token));
    }
    Err(RingError::ConsumerTableFull)
}
