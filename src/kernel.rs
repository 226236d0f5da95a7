
use crate::{reciprocal::ReciprocalTable, sad::sad_4x4};

/// Edge length of the filtering tile.
pub const BLOCK_SIZE: usize = 4;

/// A 4x4 block of 8-bit samples, row-major.
pub type Block = [[u8; BLOCK_SIZE]; BLOCK_SIZE];

/// Rounding constant applied before the final `>> 5` of a blend.
const BLEND_ROUNDER: u32 = 16;

/// Returns whether a candidate with the given SAD contributes to the average.
#[must_use]
pub fn compare(sad: u32, threshold: u32) -> bool {
    sad < threshold
}

/// Adds one candidate row into its four lanes when `mask` is set.
pub fn accumulate_row(lanes: &mut [u32; BLOCK_SIZE], row: &[u8; BLOCK_SIZE], mask: bool) {
    if mask {
        for (lane, &px) in lanes.iter_mut().zip(row.iter()) {
            *lane += u32::from(px);
        }
    }
}

/// Mix ratio between a freshly filtered block and the destination pixels
/// already written by an earlier pass. Both ratios are 15-bit fixed point and
/// sum to roughly `2^15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendWeight {
    /// Weight of the value computed by the current pass.
    pub ratio_this: u32,
    /// Weight of the value already present in the destination.
    pub ratio_prev: u32,
}

impl BlendWeight {
    /// Weights for blending in the `alpha`-th extra contribution: the new
    /// value gets `1 / (alpha + 1)` and the existing value keeps the rest.
    #[must_use]
    pub fn for_contribution(alpha: u32) -> Self {
        let denominator = alpha + 1;
        let half = denominator / 2;
        Self {
            ratio_this: ((1 << 15) + half) / denominator,
            ratio_prev: ((alpha << 15) + half) / denominator,
        }
    }
}

/// Fixed point normalization of one accumulated row: `round(acc * recip / 2^15)`.
#[must_use]
pub fn store_row(lanes: &[u32; BLOCK_SIZE], recip: u32) -> [u8; BLOCK_SIZE] {
    lanes.map(|acc| ((((acc * recip) >> 14) + 1) >> 1).min(255) as u8)
}

/// Blends one normalized accumulated row into an existing destination row.
#[must_use]
pub fn blend_row(
    lanes: &[u32; BLOCK_SIZE],
    recip: u32,
    existing: &[u8; BLOCK_SIZE],
    weight: BlendWeight,
) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    for x in 0..BLOCK_SIZE {
        out[x] = blend_lane(lanes[x], recip, existing[x], weight).0;
    }
    out
}

/// Like [`blend_row`], also returning `sum |new - scaled_existing|` over the row.
#[must_use]
pub fn blend_diff_row(
    lanes: &[u32; BLOCK_SIZE],
    recip: u32,
    existing: &[u8; BLOCK_SIZE],
    weight: BlendWeight,
) -> ([u8; BLOCK_SIZE], u32) {
    let mut out = [0u8; BLOCK_SIZE];
    let mut residual = 0;
    for x in 0..BLOCK_SIZE {
        let (value, scaled_existing) = blend_lane(lanes[x], recip, existing[x], weight);
        out[x] = value;
        residual += u32::from(value).abs_diff(scaled_existing);
    }
    (out, residual)
}

fn blend_lane(acc: u32, recip: u32, existing: u8, weight: BlendWeight) -> (u8, u32) {
    let filtered = (((acc * recip) >> 16) * weight.ratio_this) >> 9;
    let scaled_existing = (u32::from(existing) * weight.ratio_prev) >> 10;
    let value = ((filtered + scaled_existing + BLEND_ROUNDER) >> 5).min(255) as u8;
    (value, scaled_existing)
}

/// Running state of one kernel invocation: per-pixel sums of every passing
/// candidate block and the number of candidates that passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accumulator {
    rows: [[u32; BLOCK_SIZE]; BLOCK_SIZE],
    weight: u32,
}

impl Accumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `candidate` to the sums if `mask` is set.
    pub fn accumulate(&mut self, candidate: &Block, mask: bool) {
        for (lanes, row) in self.rows.iter_mut().zip(candidate.iter()) {
            accumulate_row(lanes, row, mask);
        }
        self.weight += u32::from(mask);
    }

    /// Compares `candidate` against `reference` and accumulates it when its
    /// SAD is under `threshold`. Returns the SAD.
    pub fn check(&mut self, reference: &Block, candidate: &Block, threshold: u32) -> u32 {
        let sad = sad_4x4(reference, candidate);
        self.accumulate(candidate, compare(sad, threshold));
        sad
    }

    /// Number of candidates that passed the threshold so far.
    #[must_use]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    #[cfg(test)]
    #[must_use]
    pub fn sums(&self) -> &[[u32; BLOCK_SIZE]; BLOCK_SIZE] {
        &self.rows
    }

    /// Average of the passing candidates. Requires `weight() >= 1`.
    #[must_use]
    pub fn store(&self, table: &ReciprocalTable) -> Block {
        let recip = table.get(self.weight);
        self.rows.map(|lanes| store_row(&lanes, recip))
    }

    /// Average of the passing candidates mixed into `existing`.
    /// Requires `weight() >= 1`.
    #[must_use]
    pub fn blend(&self, table: &ReciprocalTable, existing: &Block, weight: BlendWeight) -> Block {
        let recip = table.get(self.weight);
        let mut out = [[0u8; BLOCK_SIZE]; BLOCK_SIZE];
        for y in 0..BLOCK_SIZE {
            out[y] = blend_row(&self.rows[y], recip, &existing[y], weight);
        }
        out
    }

    /// [`Accumulator::blend`] plus the summed residual between the new
    /// values and the scaled existing ones.
    #[must_use]
    pub fn blend_diff(
        &self,
        table: &ReciprocalTable,
        existing: &Block,
        weight: BlendWeight,
    ) -> (Block, u32) {
        let recip = table.get(self.weight);
        let mut out = [[0u8; BLOCK_SIZE]; BLOCK_SIZE];
        let mut residual = 0;
        for y in 0..BLOCK_SIZE {
            let (row, row_residual) = blend_diff_row(&self.rows[y], recip, &existing[y], weight);
            out[y] = row;
            residual += row_residual;
        }
        (out, residual)
    }
}
