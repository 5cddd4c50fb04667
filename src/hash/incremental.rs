// src/hash/incremental.rs

//! Streaming fingerprint sessions.
//!
//! Bytes are staged into a block of `block_size` bytes; each full block is
//! folded through the engine's kernel. Because the block size is a whole
//! number of stripes, the accumulator never sees a partial stripe until
//! [`IncrementalHasher::finalize`], and the result is the same fingerprint a
//! one-shot [`HashEngine::hash`] of the concatenated input would give.

use std::io::{ErrorKind, Read};

use anyhow::Result;

use crate::errors::HashError;

use super::dispatch::HashEngine;
use super::kernel::{self, ACC_INIT, Accumulator, STRIPE_LEN};
use super::HashResult;

/// Block size used when the config does not override it.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

#[derive(Debug)]
pub struct IncrementalHasher {
    engine: HashEngine,
    session: Option<Session>,
}

#[derive(Debug)]
struct Session {
    block: Box<[u8]>,
    filled: usize,
    acc: Accumulator,
    total_bytes_seen: u64,
}

impl IncrementalHasher {
    /// `block_size` must be a non-zero multiple of [`STRIPE_LEN`].
    pub fn new(engine: HashEngine, block_size: usize) -> Result<Self, HashError> {
        if block_size == 0 || block_size % STRIPE_LEN != 0 {
            return Err(HashError::InvalidBlockSize(block_size));
        }
        Ok(Self {
            engine,
            session: Some(Session {
                block: vec![0u8; block_size].into_boxed_slice(),
                filled: 0,
                acc: ACC_INIT,
                total_bytes_seen: 0,
            }),
        })
    }

    pub fn is_finalized(&self) -> bool {
        self.session.is_none()
    }

    pub fn total_bytes_seen(&self) -> Result<u64, HashError> {
        self.session
            .as_ref()
            .map(|s| s.total_bytes_seen)
            .ok_or(HashError::InvalidSession)
    }

    /// Append bytes to the session.
    pub fn update(&mut self, mut data: &[u8]) -> Result<(), HashError> {
        let engine = self.engine;
        let session = self.session.as_mut().ok_or(HashError::InvalidSession)?;
        let block_len = session.block.len();
        session.total_bytes_seen += data.len() as u64;

        while !data.is_empty() {
            // Whole blocks straight from the caller's buffer, no staging copy.
            if session.filled == 0 && data.len() >= block_len {
                let whole = data.len() - data.len() % block_len;
                engine.accumulate(&mut session.acc, &data[..whole]);
                data = &data[whole..];
                continue;
            }

            let take = (block_len - session.filled).min(data.len());
            session.block[session.filled..session.filled + take].copy_from_slice(&data[..take]);
            session.filled += take;
            data = &data[take..];

            if session.filled == block_len {
                engine.accumulate(&mut session.acc, &session.block);
                session.filled = 0;
            }
        }
        Ok(())
    }

    /// Drain a reader into the session, reading directly into the staging
    /// block. Returns the number of bytes read.
    pub fn update_from_reader<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<u64> {
        let engine = self.engine;
        let session = self.session.as_mut().ok_or(HashError::InvalidSession)?;
        let mut read_total = 0u64;

        loop {
            let n = match reader.read(&mut session.block[session.filled..]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            session.filled += n;
            session.total_bytes_seen += n as u64;
            read_total += n as u64;

            if session.filled == session.block.len() {
                engine.accumulate(&mut session.acc, &session.block);
                session.filled = 0;
            }
        }
        Ok(read_total)
    }

    /// Close the session and produce the fingerprint.
    ///
    /// Any later `update` or `finalize` fails with
    /// [`HashError::InvalidSession`].
    pub fn finalize(&mut self) -> Result<HashResult, HashError> {
        let mut session = self.session.take().ok_or(HashError::InvalidSession)?;
        let (stripes, tail) = kernel::split_stripes(&session.block[..session.filled]);
        self.engine.accumulate(&mut session.acc, stripes);
        let fingerprint = kernel::finish(&session.acc, tail, session.total_bytes_seen);
        Ok(HashResult::new(fingerprint, session.total_bytes_seen, true))
    }
}
