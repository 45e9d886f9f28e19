//! Scatter primitives standing in for point rasterization with blending
//!
//! A pass scatters fragments from many points in parallel into an
//! [`AtomicAccumulator`]; the accumulator applies the pass's [`BlendOp`] per
//! pixel, so the result does not depend on the order points are visited.

use splatcrate_core::{SplattingConfig, TargetCountPolicy};
use std::sync::atomic::{AtomicU32, Ordering};

/// Per-pixel reduction applied when several fragments hit the same pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Replace,
    Max,
    Add,
}

impl BlendOp {
    pub fn apply(self, dst: f32, src: f32) -> f32 {
        match self {
            BlendOp::Replace => src,
            BlendOp::Max => dst.max(src),
            BlendOp::Add => dst + src,
        }
    }
}

/// One float per pixel that many threads can blend into concurrently
pub struct AtomicAccumulator {
    cells: Vec<AtomicU32>,
    op: BlendOp,
}

impl AtomicAccumulator {
    /// All cells start at `0.0`, the cleared sentinel
    pub fn new(len: usize, op: BlendOp) -> Self {
        Self {
            cells: (0..len).map(|_| AtomicU32::new(0.0f32.to_bits())).collect(),
            op,
        }
    }

    pub fn op(&self) -> BlendOp {
        self.op
    }

    /// Blend `value` into cell `index`; out-of-range indices are ignored
    pub fn blend(&self, index: usize, value: f32) {
        let Some(cell) = self.cells.get(index) else {
            return;
        };

        match self.op {
            BlendOp::Replace => cell.store(value.to_bits(), Ordering::Relaxed),
            op => {
                // the closure always returns Some, so this cannot fail
                let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                    Some(op.apply(f32::from_bits(bits), value).to_bits())
                });
            }
        }
    }

    /// Current value of cell `index`
    pub fn load(&self, index: usize) -> f32 {
        self.cells
            .get(index)
            .map(|cell| f32::from_bits(cell.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    /// Copy the blended values into `target`
    pub fn resolve_into(self, target: &mut [f32]) {
        for (dst, cell) in target.iter_mut().zip(self.cells) {
            *dst = f32::from_bits(cell.into_inner());
        }
    }
}

/// A screen-space disk centred on a pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disk {
    pub center: [u32; 2],
    /// Radius in pixels after clamping
    pub radius: f32,
}

impl Disk {
    /// `radius` is clamped to `[0, max_radius]`; NaN collapses to a single pixel
    pub fn new(center: [u32; 2], radius: f32, max_radius: f32) -> Self {
        let radius = if radius.is_nan() { 0.0 } else { radius.clamp(0.0, max_radius) };
        Self { center, radius }
    }

    /// Pixels whose centre lies within half a pixel of the disk
    pub fn covered_pixels(&self, width: u32, height: u32) -> impl Iterator<Item = [u32; 2]> {
        let reach = self.radius + 0.5;
        let reach_sq = reach * reach;
        let extent = reach.ceil() as i64;
        let (cx, cy) = (self.center[0] as i64, self.center[1] as i64);
        let (width, height) = (width as i64, height as i64);

        (-extent..=extent).flat_map(move |dy| {
            (-extent..=extent).filter_map(move |dx| {
                if (dx * dx + dy * dy) as f32 > reach_sq {
                    return None;
                }
                let (x, y) = (cx + dx, cy + dy);
                if x < 0 || y < 0 || x >= width || y >= height {
                    return None;
                }
                Some([x as u32, y as u32])
            })
        })
    }
}

/// The parameters every pass reads, passed explicitly instead of living in
/// shared render state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassContext {
    pub width: u32,
    pub height: u32,
    pub k_neighbors: u32,
    pub grid_size: u32,
    pub max_splat_pixels: f32,
    pub fallback_radius: f32,
    pub target_policy: TargetCountPolicy,
}

impl PassContext {
    pub fn new(config: &SplattingConfig, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            k_neighbors: config.k_neighbors,
            grid_size: config.initial_estimation_grid_size,
            max_splat_pixels: config.max_splat_pixels as f32,
            fallback_radius: config.fallback_radius,
            target_policy: config.target_policy,
        }
    }

    /// Row-major index of a pixel
    pub fn index_of(&self, [x, y]: [u32; 2]) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
