//! Point types produced by the extraction pass

use bytemuck::{Pod, Zeroable};
use nalgebra::Point3;

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// One compacted surface sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedPoint {
    /// Pixel the sample was read from; every point owns a distinct pixel
    pub pixel: [u32; 2],
    /// World-space position reconstructed from depth
    pub position: Point3f,
    /// Pixels per world unit at the sample, `0.0` when unknown
    pub pixels_per_unit: f32,
}

impl ExtractedPoint {
    /// Disk radius in pixels of a world-space `radius` at this point
    pub fn radius_in_pixels(&self, radius: f32) -> f32 {
        let pixels = radius * self.pixels_per_unit;
        if pixels.is_finite() && pixels > 0.0 {
            pixels
        } else {
            0.0
        }
    }
}

/// Bisection bracket `[lo, hi]` of a point's splat radius, as stored in the
/// bounds targets
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct RadiusBounds {
    pub lo: f32,
    pub hi: f32,
}

impl RadiusBounds {
    pub fn new(lo: f32, hi: f32) -> Self {
        Self { lo, hi }
    }

    /// Candidate radius tested in the next round
    pub fn midpoint(&self) -> f32 {
        0.5 * (self.lo + self.hi)
    }

    pub fn width(&self) -> f32 {
        self.hi - self.lo
    }

    /// `[0, 0]` marks a pixel without a point
    pub fn is_empty(&self) -> bool {
        self.hi <= 0.0
    }
}

impl From<[f32; 2]> for RadiusBounds {
    fn from([lo, hi]: [f32; 2]) -> Self {
        Self { lo, hi }
    }
}

impl From<RadiusBounds> for [f32; 2] {
    fn from(bounds: RadiusBounds) -> Self {
        [bounds.lo, bounds.hi]
    }
}

/// Final per-point state after a `draw`, assembled from the render targets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    pub pixel: [u32; 2],
    pub position: Point3f,
    pub radius_bounds: RadiusBounds,
    pub neighbor_count: f32,
    pub feedback_radius: f32,
}

impl PointRecord {
    /// Splat radius to hand to a surface splatting renderer
    pub fn radius(&self) -> f32 {
        self.radius_bounds.midpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_midpoint_and_width() {
        let bounds = RadiusBounds::new(1.0, 3.0);
        assert_eq!(bounds.midpoint(), 2.0);
        assert_eq!(bounds.width(), 2.0);
        assert!(!bounds.is_empty());
        assert!(RadiusBounds::default().is_empty());
    }

    #[test]
    fn test_radius_in_pixels_handles_unknown_scale() {
        let point = ExtractedPoint {
            pixel: [0, 0],
            position: Point3f::origin(),
            pixels_per_unit: 0.0,
        };
        assert_eq!(point.radius_in_pixels(2.0), 0.0);

        let point = ExtractedPoint { pixels_per_unit: 4.0, ..point };
        assert_eq!(point.radius_in_pixels(2.0), 8.0);
    }
}
