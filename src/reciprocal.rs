
/// Number of entries in the reciprocal table. Index 0 is never read.
pub const RECIPROCAL_TABLE_LEN: usize = 1024;

/// 15-bit fixed point `1/n` lookup used to normalize accumulated block sums.
///
/// `get(n)` is `round(2^15 / n)` for `n` in `2..1024`. `get(1)` is `2^15 - 1`
/// so that a single contributing candidate still fits a signed 16-bit lane.
#[derive(Debug, Clone)]
pub struct ReciprocalTable {
    table: [u32; RECIPROCAL_TABLE_LEN],
}

impl ReciprocalTable {
    #[must_use]
    pub fn new() -> Self {
        let mut table = [0u32; RECIPROCAL_TABLE_LEN];
        for (n, entry) in table.iter_mut().enumerate().skip(1) {
            let n = n as u32;
            *entry = ((1 << 15) + n / 2) / n;
        }
        table[1] = (1 << 15) - 1;
        Self { table }
    }

    /// Reciprocal of a passing-candidate count.
    ///
    /// Callers guarantee `weight >= 1`; a zero count has no reciprocal.
    #[must_use]
    pub fn get(&self, weight: u32) -> u32 {
        debug_assert!(weight >= 1, "reciprocal of zero candidates requested");
        self.table[weight as usize]
    }
}

impl Default for ReciprocalTable {
    fn default() -> Self {
        Self::new()
    }
}
