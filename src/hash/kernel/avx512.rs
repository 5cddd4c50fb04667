// src/hash/kernel/avx512.rs

//! AVX-512F kernel: one 512-bit register holds the whole accumulator.

use std::arch::x86_64::*;

use super::{Accumulator, SECRET, STRIPE_LEN};

/// # Safety
///
/// The CPU must support AVX-512F.
#[target_feature(enable = "avx512f")]
pub(crate) unsafe fn accumulate(acc: &mut Accumulator, stripes: &[u8]) {
    debug_assert_eq!(stripes.len() % STRIPE_LEN, 0);
    let secret: &'static [u64; 8] = &SECRET;

    // SAFETY: unaligned 64-byte loads/stores over 64-byte regions.
    unsafe {
        let key = _mm512_loadu_si512(secret.as_ptr().cast());
        let mut state = _mm512_loadu_si512(acc.as_ptr().cast());

        for stripe in stripes.chunks_exact(STRIPE_LEN) {
            let word = _mm512_loadu_si512(stripe.as_ptr().cast());
            let keyed = _mm512_xor_si512(word, key);
            let product = _mm512_mul_epu32(keyed, _mm512_srli_epi64::<32>(keyed));
            let folded = _mm512_xor_si512(_mm512_add_epi64(state, product), word);
            state = _mm512_rol_epi64::<31>(folded);
        }

        _mm512_storeu_si512(acc.as_mut_ptr().cast(), state);
    }
}
