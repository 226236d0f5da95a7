
use anyhow::{Result, anyhow, bail};
use log::{debug, warn};
use vapoursynth::{
    format::{ColorFamily, Format, SampleType},
    frame::{FrameRef, FrameRefMut},
    node::Node,
    plugins::Filter,
    prelude::Property,
};

use crate::{
    kernel::BLOCK_SIZE,
    params::{FilterMode, Frfun7Params},
    plane::{PlaneMut, PlaneRef},
    reciprocal::ReciprocalTable,
    scan::{TemporalNeighbors, WeightMap, process_plane},
};

/// Block-based edge preserving denoiser. Each 4x4 tile is replaced by the
/// average of nearby tiles that look similar enough to it, where "similar
/// enough" adapts to the local gradient.
pub struct Frfun7<'core> {
    /// Input clip
    clip: Node<'core>,
    /// Validated arguments in fixed point.
    params: Frfun7Params,
    /// Whether each plane is filtered. Unfiltered planes are copied through.
    process: [bool; 3],
    /// Shared by all frames.
    table: ReciprocalTable,

    // Internal fields
    format: Format<'core>,
    num_frames: usize,
}

impl<'core> Frfun7<'core> {
    pub fn new(
        clip: Node<'core>,
        lambda: Option<f64>,
        t: Option<f64>,
        tuv: Option<f64>,
        p: Option<i64>,
        tp1: Option<i64>,
        r1: Option<i64>,
        opt: Option<i64>,
    ) -> Result<Self> {
        let params = Frfun7Params::new(lambda, t, tuv, p, tp1, r1)?;
        if let Some(opt) = opt {
            debug!("Frfun7: opt={opt} has no effect, the SAD dispatch is chosen at build time");
        }

        let video_info = clip.info();
        let format = match video_info.format {
            Property::Variable => bail!("Frfun7: variable format input clips are not supported"),
            Property::Constant(format) => format,
        };
        let resolution = match video_info.resolution {
            Property::Variable => {
                bail!("Frfun7: variable resolution input clips are not supported")
            }
            Property::Constant(resolution) => resolution,
        };
        if format.sample_type() != SampleType::Integer || format.bits_per_sample() != 8 {
            bail!("Frfun7: input clip must be 8 bit integer");
        }
        if ![ColorFamily::YUV, ColorFamily::Gray].contains(&format.color_family()) {
            bail!("Frfun7: input clip must be GRAY or YUV");
        }

        let chroma_width = resolution.width >> format.sub_sampling_w();
        let chroma_height = resolution.height >> format.sub_sampling_h();
        let min_dim = if format.color_family() == ColorFamily::YUV {
            resolution.width.min(resolution.height).min(chroma_width).min(chroma_height)
        } else {
            resolution.width.min(resolution.height)
        };
        if min_dim < BLOCK_SIZE {
            bail!("Frfun7: every plane must be at least 4x4");
        }

        let chroma = format.color_family() == ColorFamily::YUV && params.processes_plane(1);
        if format.color_family() == ColorFamily::Gray && tuv.is_some_and(|tuv| tuv != 0.0) {
            warn!("Frfun7: tuv has no effect on a GRAY clip");
        }
        let process = [params.processes_plane(0), chroma, chroma];
        if !process.contains(&true) {
            warn!("Frfun7: t and tuv are both zero, frames are passed through unchanged");
        }

        debug!(
            "Frfun7: lambda={} t={} tuv={} mode={:?} tp1={} r1={:?} process={:?}",
            params.lambda,
            params.luma_cap,
            params.chroma_cap,
            params.mode,
            params.tp1,
            params.radius,
            process
        );

        Ok(Self {
            clip,
            params,
            process,
            table: ReciprocalTable::new(),
            format,
            num_frames: video_info.num_frames,
        })
    }

    fn temporal(&self) -> bool {
        self.params.mode.contains(FilterMode::TEMPORAL)
    }

    /// Frames whose planes stand in for the previous and next frame.
    /// The first and last frames are their own neighbors.
    fn neighbor_frames(&self, n: usize) -> (usize, usize) {
        (n.saturating_sub(1), (n + 1).min(self.num_frames.saturating_sub(1)))
    }

    fn get_frame_internal(
        &self,
        core: vapoursynth::core::CoreRef<'core>,
        context: vapoursynth::plugins::FrameContext,
        n: usize,
    ) -> Result<FrameRef<'core>> {
        let src = self
            .clip
            .get_frame_filter(context, n)
            .ok_or_else(|| anyhow!("Frfun7: get_frame_filter past end of video"))?;
        let neighbors = if self.temporal() {
            let (prev_n, next_n) = self.neighbor_frames(n);
            let prev = self
                .clip
                .get_frame_filter(context, prev_n)
                .ok_or_else(|| anyhow!("Frfun7: get_frame_filter prev past end of video"))?;
            let next = self
                .clip
                .get_frame_filter(context, next_n)
                .ok_or_else(|| anyhow!("Frfun7: get_frame_filter next past end of video"))?;
            Some((prev, next))
        } else {
            None
        };

        let mut dest = FrameRefMut::copy_of(core, &src);
        let mut weight_map = self
            .params
            .mode
            .contains(FilterMode::ADAPTIVE_OVERLAP)
            .then(|| WeightMap::new(src.width(0), src.height(0)));

        for plane in 0..self.format.plane_count() {
            if !self.process[plane] {
                continue;
            }

            let src_plane = PlaneRef::from_frame(&src, plane)?;
            let neighbor_planes = match neighbors {
                Some((ref prev, ref next)) => Some(TemporalNeighbors {
                    prev: PlaneRef::from_frame(prev, plane)?,
                    next: PlaneRef::from_frame(next, plane)?,
                }),
                None => None,
            };
            let mut dest_plane = PlaneMut::from_frame(&mut dest, plane)?;

            process_plane(
                &src_plane,
                neighbor_planes.as_ref(),
                &mut dest_plane,
                &self.params.plane_settings(plane),
                &self.table,
                weight_map.as_mut(),
            )?;
        }

        Ok(dest.into())
    }
}

impl<'core> Filter<'core> for Frfun7<'core> {
    fn video_info(
        &self,
        _api: vapoursynth::prelude::API,
        _core: vapoursynth::core::CoreRef<'core>,
    ) -> Vec<vapoursynth::video_info::VideoInfo<'core>> {
        vec![self.clip.info()]
    }

    fn get_frame_initial(
        &self,
        _api: vapoursynth::prelude::API,
        _core: vapoursynth::core::CoreRef<'core>,
        context: vapoursynth::plugins::FrameContext,
        n: usize,
    ) -> std::result::Result<Option<vapoursynth::prelude::FrameRef<'core>>, anyhow::Error> {
        if self.temporal() {
            let (prev_n, next_n) = self.neighbor_frames(n);
            self.clip.request_frame_filter(context, prev_n);
            if prev_n != n {
                self.clip.request_frame_filter(context, n);
            }
            if next_n != n {
                self.clip.request_frame_filter(context, next_n);
            }
        } else {
            self.clip.request_frame_filter(context, n);
        }
        Ok(None)
    }

    fn get_frame(
        &self,
        _api: vapoursynth::prelude::API,
        core: vapoursynth::core::CoreRef<'core>,
        context: vapoursynth::plugins::FrameContext,
        n: usize,
    ) -> std::result::Result<vapoursynth::prelude::FrameRef<'core>, anyhow::Error> {
        self.get_frame_internal(core, context, n)
    }
}
