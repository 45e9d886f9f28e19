//! Iterative bisection of the per-point radius bracket
//!
//! Each round tests the bracket midpoint `c` of every point. Two points are
//! neighbors when their disks of radius `c` overlap, so a point `p` counts
//! `q` once `|p - q| <= 2 c_p`. Counting happens in screen space: every
//! point first spreads its reach `2 c` over the pixels its disk covers
//! (max-blended into the feedback target), then splats a disk of its
//! feedback reach and each covered point tests the distance with its own
//! candidate. The count decides which half of the bracket survives.

use crate::raster::{AtomicAccumulator, BlendOp, Disk, PassContext};
use rayon::prelude::*;
use splatcrate_core::{BoundsSlot, ExtractedPoint, RadiusBounds, RenderTarget, RenderTargetSet, TargetCountPolicy};

/// Bracket after observing `count` neighbors at the midpoint of `bounds`
pub fn next_bounds(bounds: RadiusBounds, count: f32, k_neighbors: u32, policy: TargetCountPolicy) -> RadiusBounds {
    let candidate = bounds.midpoint();
    let count = count.round();
    let target = k_neighbors as f32;

    if count < target {
        RadiusBounds::new(candidate, bounds.hi)
    } else if count > target {
        RadiusBounds::new(bounds.lo, candidate)
    } else {
        match policy {
            TargetCountPolicy::Collapse => RadiusBounds::new(candidate, candidate),
            TargetCountPolicy::Shrink => RadiusBounds::new(bounds.lo, candidate),
        }
    }
}

/// Max-blend every point's reach `2 c` over the pixels of its disk
pub fn distribute(
    points: &[ExtractedPoint],
    front: &RenderTarget<RadiusBounds>,
    ctx: &PassContext,
    feedback: &mut RenderTarget<f32>,
) {
    let accumulator = AtomicAccumulator::new(ctx.pixel_count(), BlendOp::Max);

    points.par_iter().for_each(|point| {
        let reach = 2.0 * front[point.pixel].midpoint();
        if !(reach.is_finite() && reach > 0.0) {
            return;
        }
        let disk = Disk::new(point.pixel, point.radius_in_pixels(reach), ctx.max_splat_pixels);
        for pixel in disk.covered_pixels(ctx.width, ctx.height) {
            accumulator.blend(ctx.index_of(pixel), reach);
        }
    });

    accumulator.resolve_into(feedback.data_mut());
}

/// Count, at every point's pixel, the other points its candidate disk overlaps
pub fn gather(
    points: &[ExtractedPoint],
    positions: &RenderTarget<[f32; 4]>,
    feedback: &RenderTarget<f32>,
    front: &RenderTarget<RadiusBounds>,
    ctx: &PassContext,
    counts: &mut RenderTarget<f32>,
) {
    let accumulator = AtomicAccumulator::new(ctx.pixel_count(), BlendOp::Add);

    points.par_iter().for_each(|source| {
        let reach = feedback[source.pixel];
        let disk = Disk::new(source.pixel, source.radius_in_pixels(reach), ctx.max_splat_pixels);

        for pixel in disk.covered_pixels(ctx.width, ctx.height) {
            if pixel == source.pixel {
                continue;
            }
            let index = ctx.index_of(pixel);
            let bounds = front[index];
            if bounds.is_empty() {
                continue;
            }
            let [x, y, z, w] = positions[index];
            if w == 0.0 {
                continue;
            }

            let distance = (nalgebra::Point3::new(x, y, z) - source.position).norm();
            if distance <= 2.0 * bounds.midpoint() {
                accumulator.blend(index, 1.0);
            }
        }
    });

    accumulator.resolve_into(counts.data_mut());
}

/// Write the next bracket of every point into `back`, clearing the rest
pub fn update_bounds(
    points: &[ExtractedPoint],
    counts: &RenderTarget<f32>,
    front: &RenderTarget<RadiusBounds>,
    ctx: &PassContext,
    back: &mut RenderTarget<RadiusBounds>,
) {
    let updates: Vec<(usize, RadiusBounds)> = points
        .par_iter()
        .map(|point| {
            let index = ctx.index_of(point.pixel);
            let bounds = next_bounds(front[index], counts[index], ctx.k_neighbors, ctx.target_policy);
            (index, bounds)
        })
        .collect();

    back.clear();
    for (index, bounds) in updates {
        back[index] = bounds;
    }
}

/// Run refinement round `round`: read the front bounds, write the back ones
pub fn refine_round(round: u32, points: &[ExtractedPoint], targets: &mut RenderTargetSet, ctx: &PassContext) {
    let slot = BoundsSlot::front_for_round(round);
    let [ping, pong] = &mut targets.bounds;
    let (front, back) = match slot {
        BoundsSlot::Ping => (&*ping, pong),
        BoundsSlot::Pong => (&*pong, ping),
    };

    distribute(points, front, ctx, &mut targets.feedback_radius);
    gather(
        points,
        &targets.position,
        &targets.feedback_radius,
        front,
        ctx,
        &mut targets.neighbor_counts,
    );
    update_bounds(points, &targets.neighbor_counts, front, ctx, back);
}

/// Run `rounds` refinement rounds over bounds seeded in the ping buffer and
/// return the slot holding the final brackets
pub fn refine(points: &[ExtractedPoint], targets: &mut RenderTargetSet, ctx: &PassContext, rounds: u32) -> BoundsSlot {
    for round in 0..rounds {
        refine_round(round, points, targets, ctx);
    }
    BoundsSlot::after_rounds(rounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use splatcrate_core::{Point3f, SplattingConfig};

    fn point(x: u32, y: u32, world_x: f32) -> ExtractedPoint {
        ExtractedPoint {
            pixel: [x, y],
            position: Point3f::new(world_x, 0.0, -5.0),
            pixels_per_unit: 1.0,
        }
    }

    fn scene(points: &[ExtractedPoint], bounds: RadiusBounds) -> RenderTargetSet {
        let mut targets = RenderTargetSet::new(16, 4, 1, 1);
        for p in points {
            targets.position[p.pixel] = [p.position.x, p.position.y, p.position.z, 1.0];
            targets.bounds_mut(BoundsSlot::Ping)[p.pixel] = bounds;
        }
        targets
    }

    #[test]
    fn test_next_bounds_branches() {
        let bounds = RadiusBounds::new(0.0, 4.0);
        let collapse = TargetCountPolicy::Collapse;
        assert_eq!(next_bounds(bounds, 3.0, 5, collapse), RadiusBounds::new(2.0, 4.0));
        assert_eq!(next_bounds(bounds, 7.0, 5, collapse), RadiusBounds::new(0.0, 2.0));
        assert_eq!(next_bounds(bounds, 5.0, 5, collapse), RadiusBounds::new(2.0, 2.0));
        assert_eq!(next_bounds(bounds, 5.0, 5, TargetCountPolicy::Shrink), RadiusBounds::new(0.0, 2.0));
        // counts are rounded before the comparison
        assert_eq!(next_bounds(bounds, 4.6, 5, collapse), RadiusBounds::new(2.0, 2.0));
    }

    #[test]
    fn test_bracket_stays_ordered() {
        let mut bounds = RadiusBounds::new(0.0, 8.0);
        for count in [0.0, 20.0, 3.0, 10.0, 11.0, 9.0] {
            let next = next_bounds(bounds, count, 10, TargetCountPolicy::Shrink);
            assert!(next.lo <= next.hi);
            assert!(next.lo >= bounds.lo && next.hi <= bounds.hi);
            bounds = next;
        }
    }

    #[test]
    fn test_distribute_keeps_largest_reach() {
        let points = vec![point(2, 1, 2.0), point(9, 1, 9.0)];
        let mut targets = scene(&points, RadiusBounds::new(0.0, 2.0));
        targets.bounds_mut(BoundsSlot::Ping)[[9, 1]] = RadiusBounds::new(0.0, 5.0);
        let ctx = PassContext::new(&SplattingConfig::default(), 16, 4);
        let front = targets.bounds(BoundsSlot::Ping).clone();

        distribute(&points, &front, &ctx, &mut targets.feedback_radius);

        // reach 2 around (2, 1), reach 5 around (9, 1)
        assert_eq!(targets.feedback_radius[[2, 1]], 2.0);
        assert_eq!(targets.feedback_radius[[0, 1]], 2.0);
        assert_eq!(targets.feedback_radius[[4, 1]], 5.0);
        assert_eq!(targets.feedback_radius[[14, 1]], 5.0);
        assert_eq!(targets.feedback_radius[[15, 1]], 0.0);
    }

    #[test]
    fn test_gather_counts_overlapping_disks() {
        // points 3 units apart: overlap once each candidate reaches 1.5
        let points = vec![point(4, 1, 4.0), point(7, 1, 7.0), point(14, 1, 14.0)];
        let mut targets = scene(&points, RadiusBounds::new(0.0, 4.0));
        let ctx = PassContext::new(&SplattingConfig::default(), 16, 4);
        let front = targets.bounds(BoundsSlot::Ping).clone();

        distribute(&points, &front, &ctx, &mut targets.feedback_radius);
        gather(
            &points,
            &targets.position,
            &targets.feedback_radius,
            &front,
            &ctx,
            &mut targets.neighbor_counts,
        );

        assert_eq!(targets.neighbor_counts[[4, 1]], 1.0);
        assert_eq!(targets.neighbor_counts[[7, 1]], 1.0);
        assert_eq!(targets.neighbor_counts[[14, 1]], 0.0);
    }

    #[test]
    fn test_refine_alternates_buffers() {
        let points = vec![point(4, 1, 4.0), point(7, 1, 7.0)];
        let mut targets = scene(&points, RadiusBounds::new(0.0, 4.0));
        let config = SplattingConfig::default().with_k_neighbors(1);
        let ctx = PassContext::new(&config, 16, 4);

        let slot = refine(&points, &mut targets, &ctx, 1);
        assert_eq!(slot, BoundsSlot::Pong);
        // one neighbor at candidate 2 hits k exactly and collapses
        assert_eq!(targets.bounds(BoundsSlot::Pong)[[4, 1]], RadiusBounds::new(2.0, 2.0));

        let slot = refine(&points, &mut targets, &ctx, 0);
        assert_eq!(slot, BoundsSlot::Ping);
    }
}
