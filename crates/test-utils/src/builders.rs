#![allow(dead_code)]

use std::path::PathBuf;

use changefeed::ipc::{Event, EventKind};
use changefeed::pipeline::RawEvent;

/// Builder for ring [`Event`]s and pipeline [`RawEvent`]s to simplify test
/// setup.
pub struct EventBuilder {
    path: String,
    kind: EventKind,
    is_directory: bool,
    timestamp_ns: u64,
    fingerprint: Option<u64>,
}

impl EventBuilder {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: EventKind::Modified,
            is_directory: false,
            timestamp_ns: 0,
            fingerprint: None,
        }
    }

    pub fn created(path: &str) -> Self {
        Self::new(path).kind(EventKind::Created)
    }

    pub fn deleted(path: &str) -> Self {
        Self::new(path).kind(EventKind::Deleted)
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    pub fn at(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    pub fn fingerprint(mut self, fp: u64) -> Self {
        self.fingerprint = Some(fp);
        self
    }

    pub fn build(self) -> Event {
        Event {
            path: self.path,
            kind: self.kind,
            is_directory: self.is_directory,
            timestamp_ns: self.timestamp_ns,
            fingerprint: self.fingerprint,
        }
    }

    pub fn raw(self) -> RawEvent {
        RawEvent {
            path: PathBuf::from(self.path),
            kind: self.kind,
            timestamp_ns: self.timestamp_ns,
            is_directory: self.is_directory,
        }
    }
}

/// `count` distinct events `{prefix}/{i}` with increasing timestamps.
pub fn numbered_events(prefix: &str, count: u64) -> Vec<Event> {
    (0..count)
        .map(|i| {
            EventBuilder::new(&format!("{prefix}/{i}"))
                .at(i + 1)
                .fingerprint(i)
                .build()
        })
        .collect()
}
