// src/errors.rs

//! Crate-wide error types.
//!
//! Each core component has its own small enum so callers can match on the
//! failure that matters to them; [`ChangefeedError`] wraps them all for the
//! daemon glue.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the hashing engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// `update`/`finalize` called on a session that was already finalized.
    #[error("incremental hasher session already finalized")]
    InvalidSession,

    #[error("block size {0} must be a non-zero multiple of the 64-byte stripe")]
    InvalidBlockSize(usize),
}

/// Errors raised by the hash cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The file could not be read (usually it vanished between the event and
    /// the hash attempt). Callers treat the event as a deletion.
    #[error("content unavailable for {path}: {reason}")]
    ContentUnavailable { path: String, reason: String },
}

/// Errors raised by the shared-memory ring buffer.
#[derive(Error, Debug)]
pub enum RingError {
    #[error(
        "ring region mismatch: expected magic {expected_magic:#010x} v{expected_version}, \
         found magic {found_magic:#010x} v{found_version}"
    )]
    AttachMismatch {
        expected_magic: u32,
        found_magic: u32,
        expected_version: u32,
        found_version: u32,
    },

    #[error("ring region is {actual} bytes, layout requires {required}")]
    RegionTooSmall { required: usize, actual: usize },

    /// Publish under the `block` policy timed out waiting for a consumer.
    #[error("ring buffer full; consumer did not free a slot within {waited:?}")]
    Backpressure { waited: Duration },

    #[error("serialized event is {len} bytes, slot payload holds {max}")]
    RecordTooLarge { len: usize, max: usize },

    /// A protocol violation seen by a consumer. Fatal for that consumer only.
    #[error("ring protocol violation: {0}")]
    Corrupted(String),

    #[error("all consumer cursor slots are taken")]
    ConsumerTableFull,

    #[error("invalid ring options: {0}")]
    InvalidOptions(String),

    #[error("ring IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the event pipeline front door.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline is shutting down; event refused")]
    ShuttingDown,
}

#[derive(Error, Debug)]
pub enum ChangefeedError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Watcher error: {0}")]
    WatchError(#[from] notify::Error),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Ring(#[from] RingError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ChangefeedError>;
