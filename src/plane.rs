
use core::slice;
use std::num::NonZeroUsize;

use anyhow::{Result, bail};
use vapoursynth::frame::Frame;

use crate::kernel::{BLOCK_SIZE, Block};

/// Gets a slice to the plane's data including its padding.
/// The `plane` function in Vapoursynth fails if a plane has padding,
/// but we need access to the whole stride, so we use this function to do so.
pub fn plane_with_padding<'a>(frame: &'a Frame, plane: usize) -> Result<&'a [u8]> {
    if frame.format().plane_count() < plane + 1 {
        bail!("Tried to get plane not present in frame");
    }

    let data_ptr = frame.data_ptr(plane);
    let stride = frame.stride(plane);
    let height = frame.height(plane);

    // SAFETY: We know the layout of the plane
    Ok(unsafe { slice::from_raw_parts(data_ptr, stride * height) })
}

/// Mutable counterpart of [`plane_with_padding`].
pub fn plane_with_padding_mut<'a>(frame: &'a mut Frame, plane: usize) -> Result<&'a mut [u8]> {
    if frame.format().plane_count() < plane + 1 {
        bail!("Tried to get plane not present in frame");
    }

    let data_ptr = frame.data_ptr_mut(plane);
    let stride = frame.stride(plane);
    let height = frame.height(plane);

    // SAFETY: We know the layout of the plane
    Ok(unsafe { slice::from_raw_parts_mut(data_ptr, stride * height) })
}

fn frame_plane_layout(
    frame: &Frame,
    plane: usize,
) -> Result<(NonZeroUsize, NonZeroUsize, NonZeroUsize)> {
    if frame.format().plane_count() < plane + 1 {
        bail!("Tried to get plane not present in frame");
    }

    // SAFETY: vapoursynth frames never have empty planes
    Ok(unsafe {
        (
            NonZeroUsize::new_unchecked(frame.stride(plane)),
            NonZeroUsize::new_unchecked(frame.width(plane)),
            NonZeroUsize::new_unchecked(frame.height(plane)),
        )
    })
}

fn check_layout(len: usize, stride: usize, width: usize, height: usize) -> Result<()> {
    if stride < width {
        bail!("plane stride ({stride}) is smaller than its width ({width})");
    }
    let required = stride * (height - 1) + width;
    if len < required {
        bail!("plane buffer holds {len} bytes, {width}x{height} with stride {stride} needs {required}");
    }
    Ok(())
}

/// Read-only view of one 8-bit plane.
#[derive(Debug, Clone, Copy)]
pub struct PlaneRef<'a> {
    data: &'a [u8],
    stride: usize,
    width: usize,
    height: usize,
}

impl<'a> PlaneRef<'a> {
    pub fn new(
        data: &'a [u8],
        stride: NonZeroUsize,
        width: NonZeroUsize,
        height: NonZeroUsize,
    ) -> Result<Self> {
        check_layout(data.len(), stride.get(), width.get(), height.get())?;
        Ok(Self {
            data,
            stride: stride.get(),
            width: width.get(),
            height: height.get(),
        })
    }

    /// View of one plane of a frame.
    pub fn from_frame(frame: &'a Frame, plane: usize) -> Result<Self> {
        let (stride, width, height) = frame_plane_layout(frame, plane)?;
        Self::new(plane_with_padding(frame, plane)?, stride, width, height)
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[cfg(test)]
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.stride + x]
    }

    /// Loads the 4x4 block whose top-left corner is at `(x, y)`.
    ///
    /// Coordinates may lie outside the plane; such samples replicate the
    /// nearest edge sample. Blocks fully inside the plane are copied row by row.
    #[must_use]
    pub fn block(&self, x: isize, y: isize) -> Block {
        let mut block = [[0u8; BLOCK_SIZE]; BLOCK_SIZE];
        let inside = x >= 0
            && y >= 0
            && x as usize + BLOCK_SIZE <= self.width
            && y as usize + BLOCK_SIZE <= self.height;

        if inside {
            let (x, y) = (x as usize, y as usize);
            for (j, row) in block.iter_mut().enumerate() {
                let start = (y + j) * self.stride + x;
                row.copy_from_slice(&self.data[start..start + BLOCK_SIZE]);
            }
        } else {
            let max_x = self.width as isize - 1;
            let max_y = self.height as isize - 1;
            for (j, row) in block.iter_mut().enumerate() {
                let yy = (y + j as isize).clamp(0, max_y) as usize;
                for (i, px) in row.iter_mut().enumerate() {
                    let xx = (x + i as isize).clamp(0, max_x) as usize;
                    *px = self.data[yy * self.stride + xx];
                }
            }
        }

        block
    }

    #[must_use]
    pub fn same_shape(&self, width: usize, height: usize) -> bool {
        self.width == width && self.height == height
    }
}

/// Writable view of one 8-bit plane. Block accesses must lie inside the plane.
#[derive(Debug)]
pub struct PlaneMut<'a> {
    data: &'a mut [u8],
    stride: usize,
    width: usize,
    height: usize,
}

impl<'a> PlaneMut<'a> {
    pub fn new(
        data: &'a mut [u8],
        stride: NonZeroUsize,
        width: NonZeroUsize,
        height: NonZeroUsize,
    ) -> Result<Self> {
        check_layout(data.len(), stride.get(), width.get(), height.get())?;
        Ok(Self {
            data,
            stride: stride.get(),
            width: width.get(),
            height: height.get(),
        })
    }

    /// Writable view of one plane of a frame.
    pub fn from_frame(frame: &'a mut Frame, plane: usize) -> Result<Self> {
        let (stride, width, height) = frame_plane_layout(frame, plane)?;
        Self::new(plane_with_padding_mut(frame, plane)?, stride, width, height)
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[cfg(test)]
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.stride + x]
    }

    #[must_use]
    pub fn block(&self, x: usize, y: usize) -> Block {
        debug_assert!(x + BLOCK_SIZE <= self.width && y + BLOCK_SIZE <= self.height);
        let mut block = [[0u8; BLOCK_SIZE]; BLOCK_SIZE];
        for (j, row) in block.iter_mut().enumerate() {
            let start = (y + j) * self.stride + x;
            row.copy_from_slice(&self.data[start..start + BLOCK_SIZE]);
        }
        block
    }

    pub fn store(&mut self, x: usize, y: usize, block: &Block) {
        debug_assert!(x + BLOCK_SIZE <= self.width && y + BLOCK_SIZE <= self.height);
        for (j, row) in block.iter().enumerate() {
            let start = (y + j) * self.stride + x;
            self.data[start..start + BLOCK_SIZE].copy_from_slice(row);
        }
    }
}
