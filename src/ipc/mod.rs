// src/ipc/mod.rs

//! Zero-copy event transport over a memory-mapped ring.
//!
//! One [`Producer`] creates a file-backed region and serializes events
//! directly into fixed-size slots. Any number of [`Consumer`]s, in this or
//! other processes, map the same file and read with their own cursor. Slot
//! reads are validated with a per-slot sequence stamp (a seqlock), so a
//! consumer never returns a record that was being overwritten.
//!
//! See [`layout`] for the bit-exact region format and [`codec`] for the
//! record format.

pub mod codec;
pub mod consumer;
pub mod layout;
pub mod producer;
pub mod wake;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use codec::{Event, EventKind, EventRef};
pub use consumer::{Consumer, ConsumerOptions, StartFrom};
pub use layout::Geometry;
pub use producer::{Producer, Published};
pub use wake::WakeMode;

pub const DEFAULT_CAPACITY: u32 = 32_768;
pub const DEFAULT_SLOT_SIZE: u32 = 1024;

/// What the producer does when the slot it needs still holds an unread
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Overwrite it and count the loss in `dropped_count`.
    #[default]
    DropOldest,
    /// Wait for the slowest consumer, failing with `Backpressure` after
    /// `timeout` if one is set.
    Block { timeout: Option<Duration> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingOptions {
    pub capacity: u32,
    pub slot_size: u32,
    pub overflow: OverflowPolicy,
    pub wake: WakeMode,
}

impl Default for RingOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            slot_size: DEFAULT_SLOT_SIZE,
            overflow: OverflowPolicy::default(),
            wake: WakeMode::default(),
        }
    }
}

/// Ring counters.
///
/// `pending` is unread events (for the producer: of the slowest consumer),
/// `dropped` the shared overwrite counter, `total` every event ever
/// published, and `missed` the events this consumer skipped after being
/// lapped (always 0 on the producer side).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingStats {
    pub pending: u64,
    pub dropped: u64,
    pub total: u64,
    pub missed: u64,
}

#[cfg(test)]
mod tests {
    use super::layout::Region;
    use super::*;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn small_ring(dir: &TempDir, capacity: u32) -> (Producer, std::path::PathBuf) {
        let path = dir.path().join("ring");
        let producer = Producer::create(
            &path,
            &RingOptions {
                capacity,
                slot_size: 128,
                ..RingOptions::default()
            },
        )
        .unwrap();
        (producer, path)
    }

    fn ev(i: u64) -> Event {
        Event {
            path: format!("/w/file{i}"),
            kind: EventKind::Modified,
            is_directory: false,
            timestamp_ns: i,
            fingerprint: Some(i * 3),
        }
    }

    #[test]
    fn bad_stamp_poisons_only_that_consumer() {
        let dir = TempDir::new().unwrap();
        let (mut producer, path) = small_ring(&dir, 4);
        let mut victim = Consumer::attach(&path, ConsumerOptions::default()).unwrap();
        producer.publish(&ev(0)).unwrap();

        // Roll the stamp back as if the slot were never committed.
        let region = Region::attach(&path).unwrap();
        region.slot(0).sequence.store(0, Ordering::Release);

        assert!(matches!(
            victim.poll(Duration::ZERO),
            Err(crate::errors::RingError::Corrupted(_))
        ));
        assert!(victim.is_poisoned());
        assert!(victim.poll(Duration::ZERO).is_err());

        // Shared state is untouched and the producer keeps going.
        assert_eq!(region.header().write_index.load(Ordering::Acquire), 1);
        producer.publish(&ev(1)).unwrap();
        let mut late = Consumer::attach(
            &path,
            ConsumerOptions {
                start: StartFrom::Latest,
                ..Default::default()
            },
        )
        .unwrap();
        producer.publish(&ev(2)).unwrap();
        assert_eq!(late.poll(Duration::ZERO).unwrap(), Some(ev(2)));
    }

    #[test]
    fn poisoned_consumer_does_not_hold_back_a_blocking_producer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ring");
        let mut producer = Producer::create(
            &path,
            &RingOptions {
                capacity: 4,
                slot_size: 128,
                overflow: OverflowPolicy::Block { timeout: None },
                ..RingOptions::default()
            },
        )
        .unwrap();
        let mut victim = Consumer::attach(&path, ConsumerOptions::default()).unwrap();
        producer.publish(&ev(0)).unwrap();

        let region = Region::attach(&path).unwrap();
        region.slot(0).sequence.store(0, Ordering::Release);
        assert!(victim.poll(Duration::ZERO).is_err());
        assert!(victim.is_poisoned());
        assert_eq!(producer.consumer_count(), 0);

        // Would wait forever on the victim's cursor if it were still held.
        for i in 1..10 {
            producer.publish(&ev(i)).unwrap();
        }

        // The freed cursor is reused, and dropping the victim leaves it alone.
        let mut fresh = Consumer::attach(
            &path,
            ConsumerOptions {
                start: StartFrom::Latest,
                ..Default::default()
            },
        )
        .unwrap();
        drop(victim);
        assert_eq!(producer.consumer_count(), 1);
        producer.publish(&ev(10)).unwrap();
        assert_eq!(fresh.poll(Duration::ZERO).unwrap(), Some(ev(10)));
    }

    #[test]
    fn slot_reused_under_reader_is_skipped_as_missed() {
        let dir = TempDir::new().unwrap();
        let (mut producer, path) = small_ring(&dir, 2);
        let mut consumer = Consumer::attach(&path, ConsumerOptions::default()).unwrap();
        producer.publish(&ev(0)).unwrap();
        producer.publish(&ev(1)).unwrap();

        // Event 2 half-written into slot 0: odd stamp, write_index not yet moved.
        let region = Region::attach(&path).unwrap();
        region
            .slot(2)
            .sequence
            .store(layout::writing_stamp(2), Ordering::Release);

        assert_eq!(consumer.poll(Duration::ZERO).unwrap(), Some(ev(1)));
        assert_eq!(consumer.stats().missed, 1);
    }

    #[test]
    fn oversized_record_leaves_ring_untouched() {
        let dir = TempDir::new().unwrap();
        let (mut producer, _path) = small_ring(&dir, 4);
        let huge = Event {
            path: "x".repeat(500),
            ..ev(0)
        };
        let err = producer.publish(&huge).unwrap_err();
        assert!(matches!(
            err,
            crate::errors::RingError::RecordTooLarge { max: 112, .. }
        ));
        assert_eq!(producer.stats().total, 0);
    }

    #[test]
    fn cursor_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let (producer, path) = small_ring(&dir, 4);
        {
            let _a = Consumer::attach(&path, ConsumerOptions::default()).unwrap();
            let _b = Consumer::attach(&path, ConsumerOptions::default()).unwrap();
            assert_eq!(producer.consumer_count(), 2);
        }
        assert_eq!(producer.consumer_count(), 0);
    }

    #[test]
    fn consumer_table_has_a_limit() {
        let dir = TempDir::new().unwrap();
        let (_producer, path) = small_ring(&dir, 4);
        let _held: Vec<Consumer> = (0..layout::MAX_CONSUMERS)
            .map(|_| Consumer::attach(&path, ConsumerOptions::default()).unwrap())
            .collect();
        assert!(matches!(
            Consumer::attach(&path, ConsumerOptions::default()),
            Err(crate::errors::RingError::ConsumerTableFull)
        ));
    }
}
