
use bitflags::bitflags;

use anyhow::{Result, bail};

use crate::scan::PlaneSettings;

pub const DEFAULT_LAMBDA: f64 = 1.1;
pub const DEFAULT_LUMA_THRESHOLD: f64 = 6.0;
pub const DEFAULT_CHROMA_THRESHOLD: f64 = 2.0;

/// `lambda` is stored with 10 fractional bits.
const LAMBDA_SCALE: f64 = 1024.0;
/// Threshold caps are stored with 4 fractional bits.
const THRESHOLD_SCALE: f64 = 16.0;

/// Search radius of the main pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radius {
    Two = 2,
    Three = 3,
}

impl TryFrom<i64> for Radius {
    type Error = anyhow::Error;

    fn try_from(val: i64) -> Result<Self> {
        Ok(match val {
            2 => Self::Two,
            3 => Self::Three,
            _ => bail!("Frfun7: r1 must be 2 or 3, got {val}."),
        })
    }
}

impl From<Radius> for isize {
    fn from(value: Radius) -> Self {
        match value {
            Radius::Two => 2,
            Radius::Three => 3,
        }
    }
}

bitflags! {
    /// Mode bits of the `p` argument.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FilterMode: u8 {
        /// Refine the interior with a diff pass and eight phased overlap passes.
        const ADAPTIVE_OVERLAP = 0x01;
        /// Blend in matching blocks from the previous and next frames.
        const TEMPORAL = 0x02;
        /// Grow the spatial search radius only where the image is busy.
        const ADAPTIVE_RADIUS = 0x04;
    }
}

impl From<i64> for FilterMode {
    fn from(p: i64) -> Self {
        // only the low three bits carry meaning
        Self::from_bits_truncate((p & 0x07) as u8)
    }
}

/// Converts a user-facing float into its fixed point representation,
/// truncating toward zero.
fn to_fixed(name: &str, value: f64, scale: f64) -> Result<u32> {
    if !value.is_finite() || value < 0.0 {
        bail!("Frfun7: {name} must be a non-negative number, got {value}.");
    }
    let scaled = value * scale;
    if scaled > f64::from(i32::MAX) {
        bail!("Frfun7: {name} is too large, got {value}.");
    }
    Ok(scaled as u32)
}

/// Validated filter configuration in the fixed point units the scan driver uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frfun7Params {
    /// Deviation multiplier, 10 fractional bits.
    pub lambda: u32,
    /// Luma threshold cap, 4 fractional bits. Zero disables luma processing.
    pub luma_cap: u32,
    /// Chroma threshold cap, 4 fractional bits. Zero disables chroma processing.
    pub chroma_cap: u32,
    pub mode: FilterMode,
    /// Weight map entries below this skip the phased overlap passes.
    pub tp1: i64,
    pub radius: Radius,
}

impl Frfun7Params {
    pub fn new(
        lambda: Option<f64>,
        t: Option<f64>,
        tuv: Option<f64>,
        p: Option<i64>,
        tp1: Option<i64>,
        r1: Option<i64>,
    ) -> Result<Self> {
        let lambda = to_fixed("lambda", lambda.unwrap_or(DEFAULT_LAMBDA), LAMBDA_SCALE)?;
        let luma_cap = to_fixed("t", t.unwrap_or(DEFAULT_LUMA_THRESHOLD), THRESHOLD_SCALE)?;
        let chroma_cap = to_fixed(
            "tuv",
            tuv.unwrap_or(DEFAULT_CHROMA_THRESHOLD),
            THRESHOLD_SCALE,
        )?;
        let mode = p.map_or(FilterMode::empty(), FilterMode::from);
        let tp1 = tp1.unwrap_or(0);
        let radius = r1.map_or(Ok(Radius::Three), Radius::try_from)?;

        Ok(Self {
            lambda,
            luma_cap,
            chroma_cap,
            mode,
            tp1,
            radius,
        })
    }

    /// Threshold cap used for `plane`. Plane 0 is luma, the rest are chroma.
    #[must_use]
    pub fn threshold_cap(&self, plane: usize) -> u32 {
        if plane == 0 {
            self.luma_cap
        } else {
            self.chroma_cap
        }
    }

    /// Whether `plane` is filtered at all. Skipped planes are passed through.
    #[must_use]
    pub fn processes_plane(&self, plane: usize) -> bool {
        self.threshold_cap(plane) != 0
    }

    #[must_use]
    pub fn plane_settings(&self, plane: usize) -> PlaneSettings {
        PlaneSettings {
            radius: self.radius,
            lambda: self.lambda,
            threshold_cap: self.threshold_cap(plane),
            tp1: self.tp1,
            mode: self.mode,
        }
    }
}
