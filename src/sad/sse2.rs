use std::arch::x86_64::*;

use crate::kernel::Block;

/// `psadbw` over both blocks packed into one register each.
///
/// SSE2 is part of the x86_64 baseline, so no runtime detection is needed.
#[must_use]
pub(super) fn sad_4x4(reference: &Block, candidate: &Block) -> u32 {
    // SAFETY: `Block` is 16 contiguous bytes and the loads are unaligned.
    unsafe {
        let r = _mm_loadu_si128(reference.as_ptr().cast::<__m128i>());
        let c = _mm_loadu_si128(candidate.as_ptr().cast::<__m128i>());
        let sums = _mm_sad_epu8(r, c);
        let high = _mm_unpackhi_epi64(sums, sums);
        _mm_cvtsi128_si32(_mm_add_epi32(sums, high)) as u32
    }
}
