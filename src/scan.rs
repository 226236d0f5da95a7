#[cfg(test)]
mod tests;

use anyhow::{Result, bail};

use crate::{
    filter::{
        Filtered,
        block_sad,
        filter_adaptive,
        filter_diff,
        filter_overlap,
        filter_plain,
        local_deviation,
    },
    kernel::{BLOCK_SIZE, BlendWeight, Block},
    params::{FilterMode, Radius},
    plane::{PlaneMut, PlaneRef},
    reciprocal::ReciprocalTable,
};

const B: isize = BLOCK_SIZE as isize;
/// Distance between neighboring tiles of one pass.
const STEP: usize = 4;
/// Search radius of the diff pass.
const DIFF_RADIUS: isize = 1;
/// Search radius of the phased overlap passes.
const PHASE_RADIUS: isize = 2;
/// Number of phased overlap passes.
const PHASE_COUNT: u32 = 8;
/// Row alignment of the weight map in bytes.
const WEIGHT_MAP_ALIGN: usize = 32;

/// Per-plane inputs of the scan driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneSettings {
    pub radius: Radius,
    /// Deviation multiplier, 10 fractional bits.
    pub lambda: u32,
    /// Upper bound on the per-tile threshold.
    pub threshold_cap: u32,
    pub tp1: i64,
    pub mode: FilterMode,
}

/// The same plane taken from the neighboring frames.
#[derive(Debug, Clone, Copy)]
pub struct TemporalNeighbors<'a> {
    pub prev: PlaneRef<'a>,
    pub next: PlaneRef<'a>,
}

/// One byte of diff activity per 4x4 tile.
#[derive(Debug, Clone)]
pub struct WeightMap {
    data: Vec<u8>,
    width: usize,
    height: usize,
    stride: usize,
}

impl WeightMap {
    /// Allocates a zeroed map for a plane of the given dimensions.
    #[must_use]
    pub fn new(plane_width: usize, plane_height: usize) -> Self {
        let width = plane_width / BLOCK_SIZE;
        let height = plane_height / BLOCK_SIZE;
        let stride = width.next_multiple_of(WEIGHT_MAP_ALIGN).max(WEIGHT_MAP_ALIGN);
        Self {
            data: vec![0; stride * height],
            width,
            height,
            stride,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[cfg(test)]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[cfg(test)]
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Entry for the tile containing pixel `(x, y)`.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[(y / BLOCK_SIZE) * self.stride + x / BLOCK_SIZE]
    }

    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.data[(y / BLOCK_SIZE) * self.stride + x / BLOCK_SIZE] = value;
    }

    /// Whether every tile of a `width` x `height` plane has an entry.
    #[must_use]
    pub fn covers(&self, width: usize, height: usize) -> bool {
        width / BLOCK_SIZE <= self.width && height / BLOCK_SIZE <= self.height
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

/// Per-tile SAD threshold: `dev * lambda / 1024`, capped to `[1, cap]`.
#[must_use]
pub fn threshold(dev: u32, lambda: u32, cap: u32) -> u32 {
    let scaled = (u64::from(dev) * u64::from(lambda)) >> 10;
    // the cap fits in u32, so the narrowing is lossless
    (scaled.min(u64::from(cap)) as u32).max(1)
}

/// Saturates a diff residual into a weight map entry.
#[must_use]
pub fn clip_weight(residual: u32) -> u8 {
    residual.min(u32::from(u8::MAX)) as u8
}

/// Clamps a nominal coordinate so a block plus `radius` of search stays
/// inside `dim`. Planes narrower than `2 * radius + 4` clamp below `radius`.
fn clamp_search(pos: usize, radius: isize, dim: usize) -> isize {
    (pos as isize).max(radius).min(dim as isize - radius - B)
}

fn clamp_base(pos: usize, dim: usize) -> usize {
    pos.min(dim - BLOCK_SIZE)
}

fn plain(
    radius: Radius,
    reference: &Block,
    search: &PlaneRef,
    sx: isize,
    sy: isize,
    thresh: u32,
    table: &ReciprocalTable,
) -> Option<Filtered> {
    match radius {
        Radius::Two => filter_plain::<2>(reference, search, sx, sy, thresh, table),
        Radius::Three => filter_plain::<3>(reference, search, sx, sy, thresh, table),
    }
}

fn adaptive(
    radius: Radius,
    reference: &Block,
    search: &PlaneRef,
    sx: isize,
    sy: isize,
    thresh: u32,
    table: &ReciprocalTable,
) -> Option<Filtered> {
    match radius {
        Radius::Two => filter_adaptive::<2>(reference, search, sx, sy, thresh, table),
        Radius::Three => filter_adaptive::<3>(reference, search, sx, sy, thresh, table),
    }
}

fn overlap(
    radius: Radius,
    reference: &Block,
    search: &PlaneRef,
    sx: isize,
    sy: isize,
    thresh: u32,
    existing: &Block,
    blend: BlendWeight,
    table: &ReciprocalTable,
) -> Option<Filtered> {
    match radius {
        Radius::Two => {
            filter_overlap::<2>(reference, search, sx, sy, thresh, existing, blend, table)
        }
        Radius::Three => {
            filter_overlap::<3>(reference, search, sx, sy, thresh, existing, blend, table)
        }
    }
}

/// Filters one plane of `src` into `dst`.
///
/// `dst` must have the same dimensions as `src`. Every pixel of `dst` is
/// written by the main pass. With [`FilterMode::TEMPORAL`], `neighbors` must be
/// given; with [`FilterMode::ADAPTIVE_OVERLAP`], `weight_map` must be given and
/// cover the plane. Its previous contents are irrelevant.
pub fn process_plane(
    src: &PlaneRef,
    neighbors: Option<&TemporalNeighbors>,
    dst: &mut PlaneMut,
    settings: &PlaneSettings,
    table: &ReciprocalTable,
    weight_map: Option<&mut WeightMap>,
) -> Result<()> {
    let (width, height) = (src.width(), src.height());
    if width < BLOCK_SIZE || height < BLOCK_SIZE {
        bail!("Frfun7: planes must be at least 4x4, got {width}x{height}");
    }
    if dst.width() != width || dst.height() != height {
        bail!(
            "Frfun7: destination plane is {}x{}, source is {width}x{height}",
            dst.width(),
            dst.height()
        );
    }

    let neighbors = if settings.mode.contains(FilterMode::TEMPORAL) {
        let Some(neighbors) = neighbors else {
            bail!("Frfun7: temporal mode requires the neighboring frames");
        };
        if !neighbors.prev.same_shape(width, height) || !neighbors.next.same_shape(width, height)
        {
            bail!("Frfun7: neighboring frames must match the current frame's dimensions");
        }
        Some(neighbors)
    } else {
        None
    };

    scan_main(src, neighbors, dst, settings, table)?;

    if settings.mode.contains(FilterMode::ADAPTIVE_OVERLAP) {
        let Some(weight_map) = weight_map else {
            bail!("Frfun7: adaptive overlapping requires a weight map");
        };
        if !weight_map.covers(width, height) {
            bail!("Frfun7: weight map is too small for a {width}x{height} plane");
        }
        refine_diff(src, dst, settings, table, weight_map)?;
        refine_phases(src, dst, settings, table, weight_map);
    }

    Ok(())
}

/// Main pass: every tile of the plane, including a final partial row and
/// column that are shifted inward to stay inside the plane.
fn scan_main(
    src: &PlaneRef,
    neighbors: Option<&TemporalNeighbors>,
    dst: &mut PlaneMut,
    settings: &PlaneSettings,
    table: &ReciprocalTable,
) -> Result<()> {
    let (width, height) = (src.width(), src.height());
    let radius = isize::from(settings.radius);
    let adaptive_radius = settings.mode.contains(FilterMode::ADAPTIVE_RADIUS);

    for y in (0..height + BLOCK_SIZE - 1).step_by(STEP) {
        let sy = clamp_search(y, radius, height);
        let by = clamp_base(y, height);

        for x in (0..width + BLOCK_SIZE - 1).step_by(STEP) {
            let sx = clamp_search(x, radius, width);
            let bx = clamp_base(x, width);

            let reference = src.block(bx as isize, by as isize);
            let mut dev = local_deviation(src, sx, sy);

            if let Some(neighbors) = neighbors {
                let dev_prev = block_sad(src, sx, sy, &neighbors.prev, sx, sy);
                let dev_next = block_sad(src, sx, sy, &neighbors.next, sx, sy);
                dev = dev.min(dev_prev).min(dev_next);
                let thresh = threshold(dev, settings.lambda, settings.threshold_cap);

                let Some(own) =
                    filter_plain::<0>(&reference, src, bx as isize, by as isize, thresh, table)
                else {
                    bail!("Frfun7: no candidate passed at ({bx}, {by})");
                };
                dst.store(bx, by, &own.block);

                let mut alpha = 1;
                for (dev_other, other) in [(dev_prev, &neighbors.prev), (dev_next, &neighbors.next)]
                {
                    if dev_other >= thresh {
                        continue;
                    }
                    let existing = dst.block(bx, by);
                    let blended = overlap(
                        settings.radius,
                        &reference,
                        other,
                        sx,
                        sy,
                        thresh,
                        &existing,
                        BlendWeight::for_contribution(alpha),
                        table,
                    );
                    if let Some(blended) = blended {
                        dst.store(bx, by, &blended.block);
                        alpha += 1;
                    }
                }
                continue;
            }

            let thresh = threshold(dev, settings.lambda, settings.threshold_cap);
            let exact = sx == x as isize && sy == y as isize;
            let filtered = if adaptive_radius && exact {
                adaptive(settings.radius, &reference, src, sx, sy, thresh, table)
            } else {
                plain(settings.radius, &reference, src, sx, sy, thresh, table)
            };
            let Some(filtered) = filtered else {
                bail!("Frfun7: no candidate passed at ({bx}, {by})");
            };
            dst.store(bx, by, &filtered.block);
        }
    }

    Ok(())
}

/// Interior tiles starting at `start`, stepping by 4 while a whole block
/// still fits strictly inside `dim`.
fn interior(start: usize, dim: usize) -> impl Iterator<Item = usize> {
    (start..dim.saturating_sub(BLOCK_SIZE)).step_by(STEP)
}

/// Radius-1 diff pass over the interior. Blends into `dst` and records each
/// tile's residual in the weight map.
fn refine_diff(
    src: &PlaneRef,
    dst: &mut PlaneMut,
    settings: &PlaneSettings,
    table: &ReciprocalTable,
    weight_map: &mut WeightMap,
) -> Result<()> {
    let (width, height) = (src.width(), src.height());
    let blend = BlendWeight::for_contribution(1);
    weight_map.clear();

    for y in interior(2, height) {
        let sy = clamp_search(y, DIFF_RADIUS, height);
        for x in interior(2, width) {
            let sx = clamp_search(x, DIFF_RADIUS, width);
            let thresh = threshold(
                local_deviation(src, sx, sy),
                settings.lambda,
                settings.threshold_cap,
            );

            let reference = src.block(x as isize, y as isize);
            let existing = dst.block(x, y);
            let Some(diff) =
                filter_diff(&reference, src, sx, sy, thresh, &existing, blend, table)
            else {
                bail!("Frfun7: no candidate passed at ({x}, {y})");
            };
            dst.store(x, y, &diff.filtered.block);
            weight_map.set(x, y, clip_weight(diff.residual));
        }
    }

    Ok(())
}

/// Eight radius-2 overlap passes, each on its own sub-grid, with decreasing
/// weight for each new pass. Tiles whose weight map entry is below `tp1` are
/// left as they are.
fn refine_phases(
    src: &PlaneRef,
    dst: &mut PlaneMut,
    settings: &PlaneSettings,
    table: &ReciprocalTable,
    weight_map: &WeightMap,
) {
    let (width, height) = (src.width(), src.height());

    for phase in 1..=PHASE_COUNT {
        let blend = BlendWeight::for_contribution(phase);
        let (start_x, start_y) = ((phase % 3 + 1) as usize, (phase / 3 + 1) as usize);

        for y in interior(start_y, height) {
            let sy = clamp_search(y, PHASE_RADIUS, height);
            for x in interior(start_x, width) {
                if i64::from(weight_map.get(x, y)) < settings.tp1 {
                    continue;
                }

                let sx = clamp_search(x, PHASE_RADIUS, width);
                let thresh = threshold(
                    local_deviation(src, sx, sy),
                    settings.lambda,
                    settings.threshold_cap,
                );

                let reference = src.block(x as isize, y as isize);
                let existing = dst.block(x, y);
                if let Some(blended) = filter_overlap::<{ PHASE_RADIUS }>(
                    &reference, src, sx, sy, thresh, &existing, blend, table,
                ) {
                    dst.store(x, y, &blended.block);
                }
            }
        }
    }
}
