
use crate::{
    kernel::{Accumulator, BlendWeight, Block},
    plane::PlaneRef,
    reciprocal::ReciprocalTable,
    sad::sad_4x4,
};

/// SAD sum over the inner 3x3 offsets at or above which the adaptive kernel
/// also searches the radius-2 ring.
pub const ADAPTIVE_WIDEN_RING_2: u32 = 16 * 9;
/// SAD sum over the inner 5x5 offsets at or above which the adaptive kernel
/// also searches the radius-3 ring.
pub const ADAPTIVE_WIDEN_RING_3: u32 = 16 * 25;

/// Result of a kernel that writes a whole block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filtered {
    pub block: Block,
    /// Number of candidates whose SAD passed the threshold.
    pub weight: u32,
}

/// Result of the diff kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffFiltered {
    pub filtered: Filtered,
    /// Sum of absolute differences between the blended output and the scaled
    /// previous destination values. Used as a per-tile activity score.
    pub residual: u32,
}

/// Checks every candidate whose offset from `(cx, cy)` has Chebyshev
/// distance exactly `ring`. Returns the summed SAD of those candidates.
fn scan_ring(
    acc: &mut Accumulator,
    reference: &Block,
    search: &PlaneRef,
    cx: isize,
    cy: isize,
    ring: isize,
    threshold: u32,
) -> u32 {
    let mut sad_sum = 0;
    for dy in -ring..=ring {
        let edge_row = dy.abs() == ring;
        let mut dx = -ring;
        while dx <= ring {
            let candidate = search.block(cx + dx, cy + dy);
            sad_sum += acc.check(reference, &candidate, threshold);
            // rows strictly inside the ring only touch its two side columns
            dx += if edge_row || ring == 0 { 1 } else { 2 * ring };
        }
    }
    sad_sum
}

/// Checks the full `(2R+1)^2` square of offsets around `(sx, sy)`.
fn scan_square<const R: isize>(
    acc: &mut Accumulator,
    reference: &Block,
    search: &PlaneRef,
    sx: isize,
    sy: isize,
    threshold: u32,
) {
    for dy in -R..=R {
        for dx in -R..=R {
            let candidate = search.block(sx + dx, sy + dy);
            acc.check(reference, &candidate, threshold);
        }
    }
}

/// Averages the blocks around `(sx, sy)` in `search` whose SAD against
/// `reference` is below `threshold`.
///
/// `R` is 0, 2 or 3. With `R = 0` the only candidate is the block at the
/// anchor itself, which reproduces it exactly.
///
/// Returns `None` if no candidate passed.
#[must_use]
pub fn filter_plain<const R: isize>(
    reference: &Block,
    search: &PlaneRef,
    sx: isize,
    sy: isize,
    threshold: u32,
    table: &ReciprocalTable,
) -> Option<Filtered> {
    let mut acc = Accumulator::new();
    scan_square::<R>(&mut acc, reference, search, sx, sy, threshold);

    (acc.weight() > 0).then(|| Filtered {
        block: acc.store(table),
        weight: acc.weight(),
    })
}

/// Like [`filter_plain`], but starts with the inner 3x3 offsets and only
/// searches further out while the neighborhood looks busy.
///
/// The SADs of every checked candidate are summed. If the inner 3x3 sum
/// reaches [`ADAPTIVE_WIDEN_RING_2`], the radius-2 ring is added. For
/// `R = 3`, if the running sum then reaches [`ADAPTIVE_WIDEN_RING_3`], the
/// radius-3 ring is added too. Earlier contributions are always kept.
///
/// The rings are centered `3 - R` columns right of the anchor: with `R = 2`
/// the inner 3x3 covers offsets `0..=2` and the radius-2 ring `-1..=3`.
#[must_use]
pub fn filter_adaptive<const R: isize>(
    reference: &Block,
    search: &PlaneRef,
    sx: isize,
    sy: isize,
    threshold: u32,
    table: &ReciprocalTable,
) -> Option<Filtered> {
    debug_assert!(R == 2 || R == 3);

    let cx = sx + (3 - R);
    let mut acc = Accumulator::new();
    let mut sad_sum = scan_ring(&mut acc, reference, search, cx, sy, 0, threshold);
    sad_sum += scan_ring(&mut acc, reference, search, cx, sy, 1, threshold);

    if sad_sum >= ADAPTIVE_WIDEN_RING_2 {
        sad_sum += scan_ring(&mut acc, reference, search, cx, sy, 2, threshold);

        if R >= 3 && sad_sum >= ADAPTIVE_WIDEN_RING_3 {
            scan_ring(&mut acc, reference, search, cx, sy, 3, threshold);
        }
    }

    (acc.weight() > 0).then(|| Filtered {
        block: acc.store(table),
        weight: acc.weight(),
    })
}

/// Full-square search like [`filter_plain`] whose average is blended into
/// `existing` according to `blend`.
///
/// `R` is 2 or 3. `search` may be a different frame than the one `reference`
/// was taken from, so unlike the other kernels there is no guaranteed self
/// match; `None` means nothing passed and `existing` should be kept.
#[must_use]
pub fn filter_overlap<const R: isize>(
    reference: &Block,
    search: &PlaneRef,
    sx: isize,
    sy: isize,
    threshold: u32,
    existing: &Block,
    blend: BlendWeight,
    table: &ReciprocalTable,
) -> Option<Filtered> {
    let mut acc = Accumulator::new();
    scan_square::<R>(&mut acc, reference, search, sx, sy, threshold);

    (acc.weight() > 0).then(|| Filtered {
        block: acc.blend(table, existing, blend),
        weight: acc.weight(),
    })
}

/// Radius-1 search blended into `existing`, also reporting how much the
/// blend moved away from the existing values.
#[must_use]
pub fn filter_diff(
    reference: &Block,
    search: &PlaneRef,
    sx: isize,
    sy: isize,
    threshold: u32,
    existing: &Block,
    blend: BlendWeight,
    table: &ReciprocalTable,
) -> Option<DiffFiltered> {
    let mut acc = Accumulator::new();
    scan_square::<1>(&mut acc, reference, search, sx, sy, threshold);

    if acc.weight() == 0 {
        return None;
    }
    let (block, residual) = acc.blend_diff(table, existing, blend);
    Some(DiffFiltered {
        filtered: Filtered {
            block,
            weight: acc.weight(),
        },
        residual,
    })
}

/// Cheap local gradient estimate at `(x, y)`: the smaller SAD between the
/// block there and the two blocks one row down and one column to either side.
#[must_use]
pub fn local_deviation(plane: &PlaneRef, x: isize, y: isize) -> u32 {
    let block = plane.block(x, y);
    let down_left = sad_4x4(&block, &plane.block(x - 1, y + 1));
    let down_right = sad_4x4(&block, &plane.block(x + 1, y + 1));
    down_left.min(down_right)
}

/// SAD between two blocks at arbitrary positions, possibly in different planes.
#[must_use]
pub fn block_sad(a: &PlaneRef, ax: isize, ay: isize, b: &PlaneRef, bx: isize, by: isize) -> u32 {
    sad_4x4(&a.block(ax, ay), &b.block(bx, by))
}
