// src/hash/kernel/neon.rs

//! NEON kernel: four 128-bit registers, two lanes each.

use std::arch::aarch64::*;

use super::{Accumulator, SECRET, STRIPE_LEN};

/// # Safety
///
/// The CPU must support NEON (always true on aarch64 targets we build for).
#[target_feature(enable = "neon")]
pub(crate) unsafe fn accumulate(acc: &mut Accumulator, stripes: &[u8]) {
    debug_assert_eq!(stripes.len() % STRIPE_LEN, 0);
    let secret: &'static [u64; 8] = &SECRET;

    // SAFETY: every pointer offset stays inside a 64-byte region.
    unsafe {
        let mut state = [
            vld1q_u64(acc.as_ptr()),
            vld1q_u64(acc.as_ptr().add(2)),
            vld1q_u64(acc.as_ptr().add(4)),
            vld1q_u64(acc.as_ptr().add(6)),
        ];
        let key = [
            vld1q_u64(secret.as_ptr()),
            vld1q_u64(secret.as_ptr().add(2)),
            vld1q_u64(secret.as_ptr().add(4)),
            vld1q_u64(secret.as_ptr().add(6)),
        ];

        for stripe in stripes.chunks_exact(STRIPE_LEN) {
            let base = stripe.as_ptr();
            for (q, lanes) in state.iter_mut().enumerate() {
                let word = vreinterpretq_u64_u8(vld1q_u8(base.add(q * 16)));
                *lanes = mix(*lanes, word, key[q]);
            }
        }

        for (q, lanes) in state.iter().enumerate() {
            vst1q_u64(acc.as_mut_ptr().add(q * 2), *lanes);
        }
    }
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn mix(acc: uint64x2_t, word: uint64x2_t, key: uint64x2_t) -> uint64x2_t {
    unsafe {
        let keyed = veorq_u64(word, key);
        let product = vmull_u32(vmovn_u64(keyed), vshrn_n_u64::<32>(keyed));
        let folded = veorq_u64(vaddq_u64(acc, product), word);
        vorrq_u64(vshlq_n_u64::<31>(folded), vshrq_n_u64::<33>(folded))
    }
}
