//! Position reconstruction and stream compaction of valid depth samples

use rayon::prelude::*;
use splatcrate_core::{CameraMatrices, DepthBuffer, ExtractedPoint, RenderTarget};

/// Write the world position of every pixel into `positions`
///
/// Pixels with background or non-finite depth, or whose unprojection is
/// degenerate, get the cleared sentinel `[0, 0, 0, 0]`; valid pixels carry
/// `w = 1`.
pub fn reconstruct_positions(
    depth: &DepthBuffer,
    camera: &CameraMatrices,
    positions: &mut RenderTarget<[f32; 4]>,
) {
    let (width, height) = depth.size();
    if width == 0 || height == 0 {
        return;
    }

    positions
        .data_mut()
        .par_chunks_mut(width as usize)
        .zip(depth.data().par_chunks(width as usize))
        .enumerate()
        .for_each(|(y, (row, depth_row))| {
            for (x, (pixel, d)) in row.iter_mut().zip(depth_row).enumerate() {
                *pixel = match camera.unproject(x as u32, y as u32, *d, width, height) {
                    Some(p) => [p.x, p.y, p.z, 1.0],
                    None => [0.0; 4],
                };
            }
        });
}

/// Counters from one extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractionStats {
    pub extracted: usize,
    /// Valid pixels that did not fit the compaction buffer
    pub dropped: usize,
}

/// Compacts valid position pixels into a fixed-capacity point list
///
/// The screen is split into square blocks visited in row-major order, and
/// pixels inside a block are visited row-major too. Blocks are counted in
/// parallel and an exclusive prefix sum over the counts gives every block
/// its output offset, so the point order is deterministic. Once the buffer
/// is full the remaining points are dropped.
#[derive(Debug, Clone)]
pub struct PointExtractor {
    block_size: u32,
    capacity: usize,
    points: Vec<ExtractedPoint>,
}

impl PointExtractor {
    pub fn new(block_size: u32, capacity: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            capacity,
            points: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Points from the last extraction
    pub fn points(&self) -> &[ExtractedPoint] {
        &self.points
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Replace the point list with the valid pixels of `positions`
    pub fn extract(&mut self, positions: &RenderTarget<[f32; 4]>, camera: &CameraMatrices) -> ExtractionStats {
        self.points.clear();

        let (width, height) = positions.size();
        let block = self.block_size;
        let blocks_x = width.div_ceil(block);
        let blocks_y = height.div_ceil(block);
        let num_blocks = blocks_x as usize * blocks_y as usize;

        let block_pixels = move |b: usize| {
            let bx = (b % blocks_x as usize) as u32 * block;
            let by = (b / blocks_x as usize) as u32 * block;
            (by..(by + block).min(height))
                .flat_map(move |y| (bx..(bx + block).min(width)).map(move |x| [x, y]))
        };
        let is_occupied = |pixel: &[u32; 2]| positions[*pixel][3] != 0.0;

        let counts: Vec<usize> = (0..num_blocks)
            .into_par_iter()
            .map(|b| block_pixels(b).filter(is_occupied).count())
            .collect();
        let total: usize = counts.iter().sum();

        // blocks whose offset is below capacity contribute at least one point
        let mut offset = 0;
        let kept_blocks = counts
            .iter()
            .take_while(|count| {
                let fits = offset < self.capacity;
                offset += **count;
                fits
            })
            .count();

        let compacted: Vec<ExtractedPoint> = (0..kept_blocks)
            .into_par_iter()
            .flat_map_iter(move |b| {
                block_pixels(b).filter(is_occupied).map(move |pixel| {
                    let [x, y, z, _] = positions[pixel];
                    let position = nalgebra::Point3::new(x, y, z);
                    ExtractedPoint {
                        pixel,
                        position,
                        pixels_per_unit: camera.pixels_per_unit(&position, height).unwrap_or(0.0),
                    }
                })
            })
            .collect();

        self.points.extend(compacted.into_iter().take(self.capacity));

        ExtractionStats {
            extracted: self.points.len(),
            dropped: total - self.points.len(),
        }
    }
}
