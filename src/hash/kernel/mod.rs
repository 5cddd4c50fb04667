// src/hash/kernel/mod.rs

//! The canonical fingerprint algorithm.
//!
//! Input is consumed in 64-byte stripes. Each stripe is eight little-endian
//! `u64` words, word `i` feeding accumulator lane `i`:
//!
//! ```text
//! keyed   = word ^ SECRET[i]
//! product = lo32(keyed) * hi32(keyed)          (32x32 -> 64)
//! acc[i]  = rotl64((acc[i] + product) ^ word, 31)
//! ```
//!
//! After the last whole stripe the lanes are XOR-reduced, the trailing
//! `len % 64` bytes are folded in one at a time (`h ^= b; h *= PRIME`), the
//! total length is mixed in and a murmur-style avalanche finishes the value.
//! Empty input hashes to 0.
//!
//! The vector kernels only replace the stripe loop; reduction, tail and
//! avalanche always run through [`finish`], so every kernel yields the same
//! bits for the same input.

pub(crate) mod scalar;

#[cfg(target_arch = "x86_64")]
pub(crate) mod avx2;
#[cfg(target_arch = "x86_64")]
pub(crate) mod avx512;
#[cfg(target_arch = "aarch64")]
pub(crate) mod neon;

/// Bytes consumed per accumulate step.
pub const STRIPE_LEN: usize = 64;

/// Independent accumulator lanes (one `u64` word of the stripe each).
pub const LANES: usize = STRIPE_LEN / 8;

pub(crate) const PRIME: u64 = 0x9E37_79B1_85EB_CA87;

pub(crate) const SECRET: [u64; LANES] = [
    0xC2B2_AE3D_27D4_EB4F,
    0x1656_6791_9E37_79F9,
    0x85EB_CA77_C2B2_AE63,
    0x27D4_EB2F_1656_67C5,
    0xFF51_AFD7_ED55_8CCD,
    0xC4CE_B9FE_1A85_EC53,
    0x94D0_49BB_1331_11EB,
    0xBF58_476D_1CE4_E5B9,
];

pub(crate) const ACC_INIT: [u64; LANES] = [
    0x9E37_79B1_85EB_CA87,
    0x60EA_27EE_ADC0_B5D6,
    0xC2B2_AE3D_27D4_EB4F,
    0x27D4_EB2F_1656_67C5,
    0x1656_67B1_9E37_79F9,
    0x85EB_CA77_C2B2_AE63,
    0xD6E8_FEB8_6659_FD93,
    0x4CF5_AD43_2745_937F,
];

pub(crate) const ROTATE: u32 = 31;

pub(crate) type Accumulator = [u64; LANES];

/// Stripe loop shared by every kernel.
///
/// `stripes.len()` must be a multiple of [`STRIPE_LEN`]. Vector kernels are
/// `unsafe` because they need the matching CPU feature at runtime.
pub(crate) type AccumulateFn = unsafe fn(&mut Accumulator, &[u8]);

/// Lane reduction, tail fold and avalanche.
pub(crate) fn finish(acc: &Accumulator, tail: &[u8], total_len: u64) -> u64 {
    debug_assert!(tail.len() < STRIPE_LEN);
    if total_len == 0 {
        return 0;
    }

    let mut h = acc.iter().fold(0u64, |h, lane| h ^ lane);
    for &byte in tail {
        h ^= u64::from(byte);
        h = h.wrapping_mul(PRIME);
    }
    h ^= total_len;
    avalanche(h)
}

#[inline]
fn avalanche(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 33;
    h = h.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    h ^= h >> 33;
    h
}

/// Split a buffer into its whole-stripe prefix and the tail.
#[inline]
pub(crate) fn split_stripes(data: &[u8]) -> (&[u8], &[u8]) {
    data.split_at(data.len() - data.len() % STRIPE_LEN)
}
