//! Density-based initial radius estimate
//!
//! Points are counted per coarse grid cell; a point whose cell holds `n`
//! points is assumed to share the cell area evenly, which gives a first
//! radius enclosing about `k` neighbors. The bracket `[0, 2r]` seeds the
//! bisection.

use crate::raster::{AtomicAccumulator, BlendOp, PassContext};
use rayon::prelude::*;
use splatcrate_core::{ExtractedPoint, RadiusBounds, RenderTarget};
use std::f32::consts::PI;

/// Count the points falling into each `grid_size x grid_size` cell
pub fn accumulate_density(points: &[ExtractedPoint], grid_size: u32, grid: &mut RenderTarget<f32>) {
    let cell = grid_size.max(1);
    let grid_width = grid.width();
    let accumulator = AtomicAccumulator::new(grid.len(), BlendOp::Add);

    points.par_iter().for_each(|point| {
        let [x, y] = point.pixel;
        let index = (y / cell) as usize * grid_width as usize + (x / cell) as usize;
        accumulator.blend(index, 1.0);
    });

    accumulator.resolve_into(grid.data_mut());
}

/// World radius for a point in a cell holding `count` points
///
/// The pixel radius solves `pi r^2 = k * cell_area / count`. A count below
/// one is treated as one. Falls back to `fallback` when the screen scale is
/// unknown or the result is not a positive finite number.
pub fn initial_radius(count: f32, k_neighbors: u32, grid_size: u32, pixels_per_unit: f32, fallback: f32) -> f32 {
    let count = if count.is_finite() { count.max(1.0) } else { 1.0 };
    let cell_area = (grid_size as f32) * (grid_size as f32);
    let radius_pixels = (k_neighbors as f32 * cell_area / (PI * count)).sqrt();

    if !(pixels_per_unit > 0.0) {
        return fallback;
    }
    let radius = radius_pixels / pixels_per_unit;
    if radius.is_finite() && radius > 0.0 {
        radius
    } else {
        fallback
    }
}

/// Write `[0, 2r]` at every point's pixel of `bounds`, clearing the rest
pub fn seed_bounds(
    points: &[ExtractedPoint],
    grid: &RenderTarget<f32>,
    ctx: &PassContext,
    bounds: &mut RenderTarget<RadiusBounds>,
) {
    let cell = ctx.grid_size.max(1);

    let seeds: Vec<(usize, RadiusBounds)> = points
        .par_iter()
        .map(|point| {
            let [x, y] = point.pixel;
            let count = grid.get(x / cell, y / cell).copied().unwrap_or(0.0);
            let radius = initial_radius(
                count,
                ctx.k_neighbors,
                ctx.grid_size,
                point.pixels_per_unit,
                ctx.fallback_radius,
            );
            (ctx.index_of(point.pixel), RadiusBounds::new(0.0, 2.0 * radius))
        })
        .collect();

    bounds.clear();
    for (index, seed) in seeds {
        bounds[index] = seed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use splatcrate_core::{Point3f, SplattingConfig};

    fn point(x: u32, y: u32, pixels_per_unit: f32) -> ExtractedPoint {
        ExtractedPoint {
            pixel: [x, y],
            position: Point3f::new(x as f32, y as f32, -5.0),
            pixels_per_unit,
        }
    }

    #[test]
    fn test_density_counts_per_cell() {
        let points = vec![point(0, 0, 1.0), point(3, 1, 1.0), point(4, 4, 1.0), point(7, 0, 1.0)];
        let mut grid = RenderTarget::filled(2, 2, 9.0);

        accumulate_density(&points, 4, &mut grid);

        assert_eq!(grid.data(), &[2.0, 1.0, 0.0, 1.0]);
        assert_eq!(grid.iter().sum::<f32>(), points.len() as f32);
    }

    #[test]
    fn test_initial_radius_formula() {
        // 64 points in a 32 px cell at 6.4 px per unit
        let radius = initial_radius(64.0, 10, 32, 6.4, 0.05);
        let expected = (10.0f32 / (PI * 2.56)).sqrt();
        assert_relative_eq!(radius, expected, epsilon = 1e-5);
        assert_relative_eq!(radius * 6.4, 7.136, epsilon = 1e-3);
    }

    #[test]
    fn test_initial_radius_fallbacks() {
        assert_eq!(initial_radius(4.0, 10, 32, 0.0, 0.05), 0.05);
        assert_eq!(initial_radius(4.0, 10, 32, f32::NAN, 0.05), 0.05);
        // an empty cell counts as one point
        assert_eq!(initial_radius(0.0, 10, 32, 1.0, 0.05), initial_radius(1.0, 10, 32, 1.0, 0.05));
    }

    #[test]
    fn test_seed_bounds_at_point_pixels() {
        let config = SplattingConfig::default().with_grid_size(4);
        let ctx = PassContext::new(&config, 8, 8);
        let points = vec![point(1, 1, 2.0), point(6, 6, 0.0)];
        let mut grid = RenderTarget::new(2, 2);
        accumulate_density(&points, 4, &mut grid);

        let mut bounds = RenderTarget::filled(8, 8, RadiusBounds::new(1.0, 1.0));
        seed_bounds(&points, &grid, &ctx, &mut bounds);

        let r = initial_radius(1.0, 10, 4, 2.0, 0.05);
        assert_eq!(bounds[[1, 1]], RadiusBounds::new(0.0, 2.0 * r));
        assert_eq!(bounds[[6, 6]], RadiusBounds::new(0.0, 0.1));
        assert_eq!(bounds[[0, 0]], RadiusBounds::default());
        assert_eq!(bounds.iter().filter(|b| !b.is_empty()).count(), 2);
    }
}
