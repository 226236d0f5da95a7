use crate::kernel::Block;

#[must_use]
pub(super) fn sad_4x4(reference: &Block, candidate: &Block) -> u32 {
    reference
        .iter()
        .zip(candidate.iter())
        .map(|(ref_row, cand_row)| {
            ref_row
                .iter()
                .zip(cand_row.iter())
                .map(|(&r, &c)| u32::from(r.abs_diff(c)))
                .sum::<u32>()
        })
        .sum()
}
