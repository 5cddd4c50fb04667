// src/hash/dispatch.rs

//! Runtime kernel selection.
//!
//! CPU features are detected once per process; after that an engine is just a
//! level tag plus a resolved function pointer, so the stripe loop is a direct
//! call with no per-call branching on the level.

use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::HashError;

use super::incremental::IncrementalHasher;
use super::kernel::{self, ACC_INIT, AccumulateFn, Accumulator};
use super::HashResult;

/// Instruction-set level a kernel is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimdLevel {
    /// Portable scalar code.
    None,
    /// aarch64 NEON, 128-bit.
    Neon,
    /// x86_64 AVX2, 256-bit.
    Avx2,
    /// x86_64 AVX-512F, 512-bit.
    Avx512,
}

impl SimdLevel {
    pub const ALL: [SimdLevel; 4] = [
        SimdLevel::None,
        SimdLevel::Neon,
        SimdLevel::Avx2,
        SimdLevel::Avx512,
    ];

    /// Best level the running CPU supports. Probed once, then cached.
    pub fn detect() -> SimdLevel {
        static DETECTED: OnceLock<SimdLevel> = OnceLock::new();
        *DETECTED.get_or_init(|| {
            let level = SimdLevel::ALL
                .into_iter()
                .rev()
                .find(|level| level.is_supported())
                .unwrap_or(SimdLevel::None);
            debug!(%level, "detected SIMD level for hashing");
            level
        })
    }

    /// Whether a kernel for this level can run on this CPU.
    pub fn is_supported(self) -> bool {
        match self {
            SimdLevel::None => true,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => std::arch::is_x86_feature_detected!("avx2"),
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx512 => std::arch::is_x86_feature_detected!("avx512f"),
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => std::arch::is_aarch64_feature_detected!("neon"),
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Every level usable on this CPU, lowest first.
    pub fn available() -> Vec<SimdLevel> {
        SimdLevel::ALL
            .into_iter()
            .filter(|level| level.is_supported())
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SimdLevel::None => "none",
            SimdLevel::Neon => "neon",
            SimdLevel::Avx2 => "avx2",
            SimdLevel::Avx512 => "avx512",
        }
    }
}

impl FromStr for SimdLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SimdLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown SIMD level '{s}' (expected none, neon, avx2 or avx512)"))
    }
}

impl fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability object for hashing.
///
/// Cheap to copy. Every engine produces bit-identical fingerprints; only the
/// speed differs.
#[derive(Clone, Copy)]
pub struct HashEngine {
    level: SimdLevel,
    accumulate_fn: AccumulateFn,
}

impl fmt::Debug for HashEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashEngine")
            .field("level", &self.level)
            .finish()
    }
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::detect()
    }
}

impl HashEngine {
    /// Engine for the best level this CPU supports.
    pub fn detect() -> Self {
        Self::resolve(SimdLevel::detect())
    }

    /// The portable engine.
    pub fn scalar() -> Self {
        Self::resolve(SimdLevel::None)
    }

    /// Engine pinned to `level`, or `None` if the CPU cannot run it.
    pub fn with_level(level: SimdLevel) -> Option<Self> {
        level.is_supported().then(|| Self::resolve(level))
    }

    /// Callers must only pass levels that passed `is_supported`.
    fn resolve(level: SimdLevel) -> Self {
        let accumulate_fn: AccumulateFn = match level {
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => kernel::avx2::accumulate,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx512 => kernel::avx512::accumulate,
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => kernel::neon::accumulate,
            _ => kernel::scalar::accumulate,
        };
        HashEngine {
            level,
            accumulate_fn,
        }
    }

    pub fn level(&self) -> SimdLevel {
        self.level
    }

    /// Fold whole stripes into `acc`.
    #[inline]
    pub(crate) fn accumulate(&self, acc: &mut Accumulator, stripes: &[u8]) {
        if stripes.is_empty() {
            return;
        }
        // SAFETY: engines are only built for levels the CPU supports, and
        // every caller hands over a whole number of stripes.
        unsafe { (self.accumulate_fn)(acc, stripes) }
    }

    /// Fingerprint a buffer in one call.
    pub fn hash(&self, data: &[u8]) -> HashResult {
        let mut acc = ACC_INIT;
        let (stripes, tail) = kernel::split_stripes(data);
        self.accumulate(&mut acc, stripes);
        let total = data.len() as u64;
        HashResult::new(kernel::finish(&acc, tail, total), total, false)
    }

    /// Start a streaming session.
    pub fn incremental(&self, block_size: usize) -> Result<IncrementalHasher, HashError> {
        IncrementalHasher::new(*self, block_size)
    }

    /// Stream a reader through an incremental session of `block_size`.
    ///
    /// Reads straight into the session's staging block, so no extra buffer
    /// is allocated.
    pub fn hash_reader<R: Read>(
        &self,
        reader: &mut R,
        block_size: usize,
    ) -> anyhow::Result<HashResult> {
        let mut hasher = self.incremental(block_size)?;
        hasher.update_from_reader(reader)?;
        Ok(hasher.finalize()?)
    }
}
