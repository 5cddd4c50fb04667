// src/hash/kernel/scalar.rs

//! Portable kernel. This is the reference every vector kernel must match.

use super::{Accumulator, LANES, ROTATE, SECRET, STRIPE_LEN};

#[inline(always)]
pub(crate) fn mix_lane(acc: u64, word: u64, secret: u64) -> u64 {
    let keyed = word ^ secret;
    let product = (keyed & 0xFFFF_FFFF).wrapping_mul(keyed >> 32);
    (acc.wrapping_add(product) ^ word).rotate_left(ROTATE)
}

pub(crate) fn accumulate(acc: &mut Accumulator, stripes: &[u8]) {
    debug_assert_eq!(stripes.len() % STRIPE_LEN, 0);

    for stripe in stripes.chunks_exact(STRIPE_LEN) {
        for (lane, word_bytes) in stripe.chunks_exact(8).enumerate().take(LANES) {
            let mut word = [0u8; 8];
            word.copy_from_slice(word_bytes);
            acc[lane] = mix_lane(acc[lane], u64::from_le_bytes(word), SECRET[lane]);
        }
    }
}
