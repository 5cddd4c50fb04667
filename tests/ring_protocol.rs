mod common;
use crate::common::{init_tracing, numbered_events, temp_ring, EventBuilder};

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use changefeed::errors::RingError;
use changefeed::ipc::{
    Consumer, ConsumerOptions, EventKind, OverflowPolicy, Producer, RingOptions, StartFrom,
};

const NOW: Duration = Duration::ZERO;

#[test]
fn events_are_read_in_publish_order() {
    init_tracing();
    let mut ring = temp_ring(16, RingOptions::default());
    let mut consumer = ring.consumer(StartFrom::Oldest);

    let events = numbered_events("/w", 10);
    for event in &events {
        ring.producer.publish(event).unwrap();
    }

    for expected in &events {
        assert_eq!(consumer.poll(NOW).unwrap().as_ref(), Some(expected));
    }
    assert_eq!(consumer.poll(NOW).unwrap(), None);
    assert_eq!(consumer.stats().pending, 0);
    assert_eq!(ring.producer.stats().total, 10);
}

#[test]
fn drop_oldest_keeps_the_newest_capacity_events() {
    init_tracing();
    let mut ring = temp_ring(4, RingOptions::default());
    let events = numbered_events("/w", 6);
    for event in &events {
        ring.producer.publish(event).unwrap();
    }

    let stats = ring.producer.stats();
    assert_eq!(stats.total, 6);
    assert_eq!(stats.dropped, 2);

    let mut consumer = ring.consumer(StartFrom::Oldest);
    let read: Vec<_> = std::iter::from_fn(|| consumer.poll(NOW).unwrap()).collect();
    assert_eq!(read, events[2..].to_vec());
}

#[test]
fn slow_consumer_sees_overwrites_counted_as_dropped() {
    init_tracing();
    let mut ring = temp_ring(4, RingOptions::default());
    let mut consumer = ring.consumer(StartFrom::Oldest);

    let events = numbered_events("/w", 4);
    for event in &events {
        ring.producer.publish(event).unwrap();
    }
    // Consumer reads two, then the producer laps it by three.
    assert_eq!(consumer.poll(NOW).unwrap().as_ref(), Some(&events[0]));
    assert_eq!(consumer.poll(NOW).unwrap().as_ref(), Some(&events[1]));

    let more = numbered_events("/x", 3);
    for event in &more {
        ring.producer.publish(event).unwrap();
    }
    // Overwrote events 0 and 1 (already read) and 2 (unread).
    assert_eq!(ring.producer.stats().dropped, 1);

    let rest: Vec<_> = std::iter::from_fn(|| consumer.poll(NOW).unwrap()).collect();
    assert_eq!(rest.len(), 4);
    assert_eq!(rest[0], events[3]);
    assert_eq!(&rest[1..], &more[..]);
    assert_eq!(consumer.stats().missed, 1);
}

#[test]
fn latest_consumer_skips_backlog() {
    let mut ring = temp_ring(8, RingOptions::default());
    ring.producer
        .publish(&EventBuilder::created("/w/old").build())
        .unwrap();
    let mut consumer = ring.consumer(StartFrom::Latest);
    assert_eq!(consumer.poll(NOW).unwrap(), None);

    let fresh = EventBuilder::deleted("/w/new").at(9).build();
    ring.producer.publish(&fresh).unwrap();
    assert_eq!(consumer.poll(NOW).unwrap(), Some(fresh));
}

#[test]
fn every_consumer_reads_every_event() {
    let mut ring = temp_ring(8, RingOptions::default());
    let mut a = ring.consumer(StartFrom::Oldest);
    let mut b = ring.consumer(StartFrom::Oldest);
    let events = numbered_events("/w", 5);
    for event in &events {
        ring.producer.publish(event).unwrap();
    }

    let read_a: Vec<_> = std::iter::from_fn(|| a.poll(NOW).unwrap()).collect();
    assert_eq!(read_a, events);
    // b has not read anything, so the producer still reports it as pending.
    assert_eq!(ring.producer.stats().pending, 5);
    let read_b: Vec<_> = std::iter::from_fn(|| b.poll(NOW).unwrap()).collect();
    assert_eq!(read_b, events);
    assert_eq!(ring.producer.stats().pending, 0);
}

#[test]
fn block_policy_times_out_with_backpressure() {
    init_tracing();
    let mut ring = temp_ring(
        2,
        RingOptions {
            overflow: OverflowPolicy::Block {
                timeout: Some(Duration::from_millis(30)),
            },
            ..RingOptions::default()
        },
    );
    let _idle = ring.consumer(StartFrom::Oldest);
    let events = numbered_events("/w", 3);
    ring.producer.publish(&events[0]).unwrap();
    ring.producer.publish(&events[1]).unwrap();

    let started = Instant::now();
    let err = ring.producer.publish(&events[2]).unwrap_err();
    assert!(matches!(err, RingError::Backpressure { .. }));
    assert!(started.elapsed() >= Duration::from_millis(30));
    // Nothing was overwritten or counted.
    let stats = ring.producer.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn block_policy_resumes_once_a_reader_catches_up() {
    let mut ring = temp_ring(
        2,
        RingOptions {
            overflow: OverflowPolicy::Block {
                timeout: Some(Duration::from_secs(5)),
            },
            ..RingOptions::default()
        },
    );
    let mut consumer = ring.consumer(StartFrom::Oldest);
    let events = numbered_events("/w", 3);
    ring.producer.publish(&events[0]).unwrap();
    ring.producer.publish(&events[1]).unwrap();

    let reader = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let first = consumer.poll(NOW).unwrap();
        (first, consumer)
    });

    let published = ring.producer.publish(&events[2]).unwrap();
    assert_eq!(published.index, 2);
    assert!(!published.dropped_oldest);

    let (first, mut consumer) = reader.join().unwrap();
    assert_eq!(first.as_ref(), Some(&events[0]));
    assert_eq!(consumer.poll(NOW).unwrap().as_ref(), Some(&events[1]));
    assert_eq!(consumer.poll(NOW).unwrap().as_ref(), Some(&events[2]));
    assert_eq!(ring.producer.stats().dropped, 0);
}

#[test]
fn waiting_consumer_is_woken_by_publish() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wake.ring");
    let mut producer = Producer::create(
        &path,
        &RingOptions {
            capacity: 8,
            slot_size: 256,
            ..RingOptions::default()
        },
    )
    .unwrap();
    let mut consumer = Consumer::attach(&path, ConsumerOptions::default()).unwrap();

    let reader = thread::spawn(move || consumer.poll(Duration::from_secs(5)).unwrap());
    thread::sleep(Duration::from_millis(20));
    let event = EventBuilder::new("/w/a.txt").fingerprint(7).build();
    producer.publish(&event).unwrap();

    assert_eq!(reader.join().unwrap(), Some(event));
}

#[test]
fn closed_producer_is_visible_to_consumers() {
    let mut ring = temp_ring(4, RingOptions::default());
    let mut consumer = ring.consumer(StartFrom::Oldest);
    let event = EventBuilder::new("/w/last").kind(EventKind::Moved).build();
    ring.producer.publish(&event).unwrap();
    let changefeed_test_utils::TempRing { dir, producer, .. } = ring;
    drop(producer);

    assert!(consumer.is_producer_closed());
    // Already-published events stay readable after close.
    assert_eq!(consumer.poll(Duration::from_secs(1)).unwrap(), Some(event));
    assert_eq!(consumer.poll(Duration::from_secs(1)).unwrap(), None);
    drop(dir);
}

#[test]
fn attach_rejects_foreign_region() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.ring");
    fs::write(&path, vec![0x5a; 4096]).unwrap();

    let err = Consumer::attach(&path, ConsumerOptions::default()).unwrap_err();
    assert!(matches!(err, RingError::AttachMismatch { .. }), "{err:?}");
}

#[test]
fn attach_rejects_truncated_region() {
    let mut ring = temp_ring(8, RingOptions::default());
    ring.producer
        .publish(&EventBuilder::new("/w/a").build())
        .unwrap();
    let bytes = fs::read(&ring.path).unwrap();
    let short = ring.dir.path().join("short.ring");
    fs::write(&short, &bytes[..bytes.len() / 2]).unwrap();

    let err = Consumer::attach(&short, ConsumerOptions::default()).unwrap_err();
    assert!(matches!(err, RingError::RegionTooSmall { .. }), "{err:?}");
}

#[test]
fn invalid_geometry_is_rejected_at_create() {
    let dir = tempfile::tempdir().unwrap();
    let err = Producer::create(
        dir.path().join("bad.ring"),
        &RingOptions {
            capacity: 0,
            ..RingOptions::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, RingError::InvalidOptions(_)), "{err:?}");
}
