// src/ipc/codec.rs

//! Serialized event record carried in a slot payload.
//!
//! ```text
//! path_len:        u16 LE
//! path:            path_len bytes, UTF-8
//! kind:            u8   (0 Created, 1 Modified, 2 Deleted, 3 Moved)
//! is_directory:    u8   (0 | 1)
//! timestamp_ns:    u64 LE
//! has_fingerprint: u8   (0 | 1)
//! fingerprint:     u64 LE (zero when absent)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::RingError;

/// Record bytes besides the path.
pub const RECORD_FIXED_LEN: usize = 2 + 1 + 1 + 8 + 1 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EventKind {
    Created = 0,
    Modified = 1,
    Deleted = 2,
    Moved = 3,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
            EventKind::Moved => "moved",
        }
    }
}

impl TryFrom<u8> for EventKind {
    type Error = RingError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(EventKind::Created),
            1 => Ok(EventKind::Modified),
            2 => Ok(EventKind::Deleted),
            3 => Ok(EventKind::Moved),
            other => Err(RingError::Corrupted(format!("unknown event kind {other}"))),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// An enriched change event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub path: String,
    pub kind: EventKind,
    pub is_directory: bool,
    pub timestamp_ns: u64,
    pub fingerprint: Option<u64>,
}

/// An event decoded in place from a consumer's read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRef<'a> {
    pub path: &'a str,
    pub kind: EventKind,
    pub is_directory: bool,
    pub timestamp_ns: u64,
    pub fingerprint: Option<u64>,
}

impl Event {
    pub fn as_event_ref(&self) -> EventRef<'_> {
        EventRef {
            path: &self.path,
            kind: self.kind,
            is_directory: self.is_directory,
            timestamp_ns: self.timestamp_ns,
            fingerprint: self.fingerprint,
        }
    }

    pub fn encoded_len(&self) -> usize {
        RECORD_FIXED_LEN + self.path.len()
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, RingError> {
        self.as_event_ref().encode_into(buf)
    }

    pub fn encode(&self) -> Result<Vec<u8>, RingError> {
        let mut buf = vec![0u8; self.encoded_len()];
        self.encode_into(&mut buf)?;
        Ok(buf)
    }
}

impl<'a> EventRef<'a> {
    pub fn encoded_len(&self) -> usize {
        RECORD_FIXED_LEN + self.path.len()
    }

    /// Write the record at the start of `buf`, returning its length.
    ///
    /// Fails with `RecordTooLarge` if the path does not fit a `u16` length
    /// or the record does not fit `buf`.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, RingError> {
        let len = self.encoded_len();
        let path_len = u16::try_from(self.path.len()).map_err(|_| RingError::RecordTooLarge {
            len,
            max: RECORD_FIXED_LEN + u16::MAX as usize,
        })?;
        if len > buf.len() {
            return Err(RingError::RecordTooLarge {
                len,
                max: buf.len(),
            });
        }

        let p = self.path.len();
        buf[0..2].copy_from_slice(&path_len.to_le_bytes());
        buf[2..2 + p].copy_from_slice(self.path.as_bytes());
        buf[2 + p] = self.kind as u8;
        buf[3 + p] = u8::from(self.is_directory);
        buf[4 + p..12 + p].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[12 + p] = u8::from(self.fingerprint.is_some());
        buf[13 + p..21 + p].copy_from_slice(&self.fingerprint.unwrap_or(0).to_le_bytes());
        Ok(len)
    }

    /// Decode a record that occupies exactly `buf`.
    pub fn decode(buf: &'a [u8]) -> Result<Self, RingError> {
        if buf.len() < RECORD_FIXED_LEN {
            return Err(RingError::Corrupted(format!(
                "record of {} bytes is shorter than the fixed {RECORD_FIXED_LEN}",
                buf.len()
            )));
        }
        let p = usize::from(u16::from_le_bytes([buf[0], buf[1]]));
        if buf.len() != RECORD_FIXED_LEN + p {
            return Err(RingError::Corrupted(format!(
                "record length {} does not match path length {p}",
                buf.len()
            )));
        }

        let path = std::str::from_utf8(&buf[2..2 + p])
            .map_err(|e| RingError::Corrupted(format!("path is not UTF-8: {e}")))?;
        let kind = EventKind::try_from(buf[2 + p])?;
        let is_directory = decode_bool(buf[3 + p], "is_directory")?;
        let timestamp_ns = read_u64(&buf[4 + p..12 + p]);
        let has_fingerprint = decode_bool(buf[12 + p], "has_fingerprint")?;
        let fingerprint = has_fingerprint.then(|| read_u64(&buf[13 + p..21 + p]));

        Ok(EventRef {
            path,
            kind,
            is_directory,
            timestamp_ns,
            fingerprint,
        })
    }

    pub fn to_event(&self) -> Event {
        Event {
            path: self.path.to_owned(),
            kind: self.kind,
            is_directory: self.is_directory,
            timestamp_ns: self.timestamp_ns,
            fingerprint: self.fingerprint,
        }
    }
}

fn decode_bool(byte: u8, field: &str) -> Result<bool, RingError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RingError::Corrupted(format!("{field} byte is {other}"))),
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(bytes);
    u64::from_le_bytes(word)
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_event_ref(), f)
    }
}

impl fmt::Display for EventRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:<8} {}", self.timestamp_ns, self.kind, self.path)?;
        if self.is_directory {
            f.write_str("/")?;
        }
        if let Some(fp) = self.fingerprint {
            write!(f, " {fp:016x}")?;
        }
        Ok(())
    }
}
