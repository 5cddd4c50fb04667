// src/hash/mod.rs

//! Content fingerprinting.
//!
//! One canonical 64-bit algorithm (see [`kernel`]) with several
//! lane-parallel kernels that all produce the same bits. The kernel is
//! picked once by [`HashEngine::detect`] and the engine value is then passed
//! to whoever needs to hash.

pub mod dispatch;
pub mod incremental;
pub mod kernel;

use serde::{Deserialize, Serialize};

pub use dispatch::{HashEngine, SimdLevel};
pub use incremental::{IncrementalHasher, DEFAULT_BLOCK_SIZE};
pub use kernel::STRIPE_LEN;

/// Result of a fingerprint computation.
///
/// `fingerprint` is a pure function of the input bytes. `byte_length`
/// saturates at `u32::MAX` for inputs of 4 GiB or more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashResult {
    pub fingerprint: u64,
    pub byte_length: u32,
    pub incremental: bool,
}

impl HashResult {
    pub(crate) fn new(fingerprint: u64, total_len: u64, incremental: bool) -> Self {
        Self {
            fingerprint,
            byte_length: u32::try_from(total_len).unwrap_or(u32::MAX),
            incremental,
        }
    }
}
