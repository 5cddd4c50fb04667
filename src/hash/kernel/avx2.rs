// src/hash/kernel/avx2.rs

//! AVX2 kernel: the eight lanes live in two 256-bit registers.

use std::arch::x86_64::*;

use super::{Accumulator, SECRET, STRIPE_LEN};

/// # Safety
///
/// The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn accumulate(acc: &mut Accumulator, stripes: &[u8]) {
    debug_assert_eq!(stripes.len() % STRIPE_LEN, 0);
    let secret: &'static [u64; 8] = &SECRET;

    // SAFETY: all loads/stores are unaligned variants over in-bounds memory:
    // `acc` and `secret` are 64 bytes, each stripe is 64 bytes.
    unsafe {
        let acc_ptr = acc.as_mut_ptr().cast::<__m256i>();
        let key_ptr = secret.as_ptr().cast::<__m256i>();
        let key_lo = _mm256_loadu_si256(key_ptr);
        let key_hi = _mm256_loadu_si256(key_ptr.add(1));
        let mut lo = _mm256_loadu_si256(acc_ptr);
        let mut hi = _mm256_loadu_si256(acc_ptr.add(1));

        for stripe in stripes.chunks_exact(STRIPE_LEN) {
            let words = stripe.as_ptr().cast::<__m256i>();
            lo = mix(lo, _mm256_loadu_si256(words), key_lo);
            hi = mix(hi, _mm256_loadu_si256(words.add(1)), key_hi);
        }

        _mm256_storeu_si256(acc_ptr, lo);
        _mm256_storeu_si256(acc_ptr.add(1), hi);
    }
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn mix(acc: __m256i, word: __m256i, key: __m256i) -> __m256i {
    unsafe {
        let keyed = _mm256_xor_si256(word, key);
        // mul_epu32 multiplies the low 32 bits of each 64-bit lane.
        let product = _mm256_mul_epu32(keyed, _mm256_srli_epi64::<32>(keyed));
        let folded = _mm256_xor_si256(_mm256_add_epi64(acc, product), word);
        _mm256_or_si256(
            _mm256_slli_epi64::<31>(folded),
            _mm256_srli_epi64::<33>(folded),
        )
    }
}
