mod rust;
#[cfg(target_arch = "x86_64")]
mod sse2;


use cfg_if::cfg_if;

use crate::kernel::Block;

/// Sum of absolute differences between two 4x4 blocks.
///
/// The result is at most `16 * 255`, so the caller can sum a full
/// radius-3 neighborhood of them in a `u32` without overflow.
#[must_use]
pub fn sad_4x4(reference: &Block, candidate: &Block) -> u32 {
    cfg_if! {
        if #[cfg(all(target_arch = "x86_64", not(feature = "no_simd")))] {
            sse2::sad_4x4(reference, candidate)
        } else {
            rust::sad_4x4(reference, candidate)
        }
    }
}
