//! Integration tests for splatcrate-splatting
//!
//! These tests drive the full pipeline on synthetic depth buffers of a
//! plane at `z = -5` seen by a 90 degree perspective camera, where one pixel
//! spans `10 / 64` world units on a 64 x 64 screen.

use approx::assert_relative_eq;
use nalgebra::{Matrix4, Perspective3, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use splatcrate_core::{
    BoundsSlot, CameraMatrices, DebugImage, DebugView, DepthBuffer, DrawStatus, FrameInput, RadiusBounds,
    ScreenEffect, SkipReason, SplattingConfig, TargetCountPolicy,
};
use splatcrate_splatting::{initial_radius, ScreenSpaceSplatting};

const SIZE: u32 = 64;

fn projection() -> Matrix4<f32> {
    Perspective3::new(1.0, std::f32::consts::FRAC_PI_2, 0.1, 100.0).to_homogeneous()
}

fn depth_at(z: f32) -> f32 {
    let camera = CameraMatrices::new(Matrix4::identity(), projection()).unwrap();
    camera.project(&Point3::new(0.0, 0.0, z), SIZE, SIZE).unwrap().depth
}

/// Depth buffer of the plane `z = -5` restricted to pixels where `valid` holds
fn plane_depth(valid: impl Fn(u32, u32) -> bool) -> DepthBuffer {
    let depth = depth_at(-5.0);
    DepthBuffer::from_fn(SIZE, SIZE, |x, y| if valid(x, y) { depth } else { 1.0 })
}

fn draw(splatting: &mut ScreenSpaceSplatting, depth: &DepthBuffer) -> DrawStatus {
    let input = FrameInput::new(depth).with_camera(Matrix4::identity(), projection());
    splatting.draw(&input, None).unwrap()
}

fn pipeline(config: SplattingConfig) -> ScreenSpaceSplatting {
    ScreenSpaceSplatting::new(config, SIZE, SIZE).unwrap()
}

#[test]
fn test_uniform_plane_initial_radius() {
    let depth = plane_depth(|x, y| x % 4 == 0 && y % 4 == 0);
    let mut splatting = pipeline(SplattingConfig::default().with_iterations(0));

    let status = draw(&mut splatting, &depth);
    let stats = status.stats().unwrap();
    assert_eq!(stats.extracted_points, Some(256));
    assert_eq!(stats.dropped_points, Some(0));

    // every 32 px cell holds 8 x 8 points
    assert!(splatting.density_grid().iter().all(|count| *count == 64.0));

    // r_px = sqrt(10 * 1024 / (64 pi)) = 7.136 px at 6.4 px per unit
    let expected = (10.0f32 / (std::f32::consts::PI * 2.56)).sqrt();
    assert_eq!(splatting.final_slot(), BoundsSlot::Ping);
    for record in splatting.point_records() {
        assert_eq!(record.radius_bounds.lo, 0.0);
        assert_relative_eq!(record.radius_bounds.hi, 2.0 * expected, epsilon = 1e-3);
    }
}

#[test]
fn test_single_point_grows_radius() {
    let depth = plane_depth(|x, y| (x, y) == (32, 32));
    let mut splatting = pipeline(SplattingConfig::default().with_k_neighbors(10).with_iterations(1));

    let status = draw(&mut splatting, &depth);
    assert_eq!(status.stats().unwrap().extracted_points, Some(1));
    assert_eq!(splatting.density_grid()[[1, 1]], 1.0);
    assert_eq!(splatting.density_grid().iter().sum::<f32>(), 1.0);

    let r0 = initial_radius(1.0, 10, 32, 6.4, 0.05);
    let ping = splatting.targets().bounds(BoundsSlot::Ping)[[32, 32]];
    assert_relative_eq!(ping.hi, 2.0 * r0, epsilon = 1e-3);

    // no neighbors at all: the lower half is ruled out
    assert_eq!(splatting.final_slot(), BoundsSlot::Pong);
    assert_eq!(splatting.neighbor_counts()[[32, 32]], 0.0);
    let bounds = splatting.final_bounds()[[32, 32]];
    assert_relative_eq!(bounds.lo, r0, epsilon = 1e-3);
    assert_relative_eq!(bounds.hi, 2.0 * r0, epsilon = 1e-3);
}

#[test]
fn test_two_points_bracket_half_distance() {
    // 24 px apart on the plane: 3.75 world units
    let depth = plane_depth(|x, y| y == 32 && (x == 20 || x == 44));
    let config = SplattingConfig::default()
        .with_k_neighbors(1)
        .with_iterations(8)
        .with_target_policy(TargetCountPolicy::Shrink);
    let mut splatting = pipeline(config);

    draw(&mut splatting, &depth);

    let r0 = initial_radius(1.0, 1, 32, 6.4, 0.05);
    let records = splatting.point_records();
    assert_eq!(records.len(), 2);
    for record in records {
        let bounds = record.radius_bounds;
        assert!(bounds.lo <= 1.875 + 1e-4, "{:?}", bounds);
        assert!(bounds.hi >= 1.875 - 1e-4, "{:?}", bounds);
        assert!(bounds.width() <= 2.0 * r0 / 256.0 + 1e-5, "{:?}", bounds);
    }
}

#[test]
fn test_exact_count_collapses_bracket() {
    let depth = plane_depth(|x, y| y == 32 && (x == 20 || x == 44));
    let config = SplattingConfig::default().with_k_neighbors(1).with_iterations(3);
    let mut splatting = pipeline(config);

    draw(&mut splatting, &depth);

    // the first candidate already overlaps the other point
    let r0 = initial_radius(1.0, 1, 32, 6.4, 0.05);
    let bounds = splatting.final_bounds()[[20, 32]];
    assert_relative_eq!(bounds.lo, r0, epsilon = 1e-3);
    assert_eq!(bounds.lo, bounds.hi);
}

#[test]
fn test_more_rounds_nest_brackets() {
    let mut rng = StdRng::seed_from_u64(7);
    let near = depth_at(-4.0);
    let far = depth_at(-6.0);
    let depth = DepthBuffer::from_fn(SIZE, SIZE, |_, _| {
        if rng.gen_bool(0.1) {
            rng.gen_range(near..far)
        } else {
            1.0
        }
    });

    let config = SplattingConfig::default().with_k_neighbors(6);
    let mut previous: Option<Vec<RadiusBounds>> = None;

    for rounds in 0..5 {
        let mut splatting = pipeline(config.clone().with_iterations(rounds));
        draw(&mut splatting, &depth);
        let current: Vec<RadiusBounds> = splatting.point_records().iter().map(|r| r.radius_bounds).collect();

        for bounds in &current {
            assert!(bounds.lo <= bounds.hi);
        }
        if let Some(previous) = &previous {
            assert_eq!(previous.len(), current.len());
            for (before, after) in previous.iter().zip(&current) {
                assert!(after.lo >= before.lo && after.hi <= before.hi, "{:?} -> {:?}", before, after);
            }
        }
        previous = Some(current);
    }
}

#[test]
fn test_empty_depth_yields_no_points() {
    let depth = plane_depth(|_, _| false);
    let mut splatting = pipeline(SplattingConfig::default().with_iterations(2));

    let status = draw(&mut splatting, &depth);
    assert_eq!(status.stats().unwrap().extracted_points, Some(0));
    assert!(splatting.points().is_empty());
    assert!(splatting.targets().is_cleared());
}

#[test]
fn test_invalid_depth_values_are_background() {
    let valid = depth_at(-5.0);
    let depth = DepthBuffer::from_fn(SIZE, SIZE, |x, _| match x {
        0 => f32::NAN,
        1 => f32::INFINITY,
        2 => -0.5,
        3 => valid,
        _ => 1.0,
    });
    let mut splatting = pipeline(SplattingConfig::default());

    let status = draw(&mut splatting, &depth);
    assert_eq!(status.stats().unwrap().extracted_points, Some(64));
    assert!(splatting.points().iter().all(|p| p.pixel[0] == 3));
}

#[test]
fn test_overflow_keeps_capacity_points() {
    let depth = plane_depth(|_, _| true);
    let mut splatting = pipeline(SplattingConfig::default());
    assert_eq!(splatting.point_capacity(), 409);

    let status = draw(&mut splatting, &depth);
    let stats = status.stats().unwrap();
    assert_eq!(stats.extracted_points, Some(409));
    assert_eq!(stats.dropped_points, Some(4096 - 409));

    // blocks are consumed in row-major order: 25 full blocks then 9 pixels
    let points = splatting.points();
    assert_eq!(points[0].pixel, [0, 0]);
    assert_eq!(points[16].pixel, [4, 0]);
    assert_eq!(points[408].pixel, [36, 6]);
    assert_eq!(
        splatting.final_bounds().iter().filter(|b| !b.is_empty()).count(),
        409
    );
}

#[test]
fn test_missing_matrices_leave_targets_untouched() {
    let depth = plane_depth(|x, y| x % 4 == 0 && y % 4 == 0);
    let mut splatting = pipeline(SplattingConfig::default());
    draw(&mut splatting, &depth);
    let before = splatting.targets().clone();

    let mut output = DebugImage::filled(SIZE, SIZE, [0.25; 4]);
    let input = FrameInput::new(&depth);
    let status = splatting.draw(&input, Some(&mut output)).unwrap();
    assert_eq!(status, DrawStatus::Skipped(SkipReason::MissingViewMatrix));

    let input = FrameInput {
        view_matrix: Some(Matrix4::identity()),
        ..FrameInput::new(&depth)
    };
    let status = splatting.draw(&input, Some(&mut output)).unwrap();
    assert_eq!(status, DrawStatus::Skipped(SkipReason::MissingProjectionMatrix));

    assert_eq!(splatting.targets(), &before);
    assert!(output.iter().all(|p| *p == [0.25; 4]));
}

#[test]
fn test_set_size_is_idempotent() {
    let depth = plane_depth(|x, y| x % 4 == 0 && y % 4 == 0);
    let mut splatting = pipeline(SplattingConfig::default());
    draw(&mut splatting, &depth);
    let before = splatting.targets().clone();

    splatting.set_size(SIZE, SIZE).unwrap();
    assert_eq!(splatting.targets(), &before);

    splatting.set_size(32, 32).unwrap();
    assert!(splatting.targets().is_cleared());
    assert_eq!(splatting.targets().size(), (32, 32));
}

#[test]
fn test_denser_cells_start_smaller() {
    // left half sampled every 2nd pixel, right half every 8th
    let depth = plane_depth(|x, y| {
        if x < 32 {
            x % 2 == 0 && y % 2 == 0
        } else {
            x % 8 == 0 && y % 8 == 0
        }
    });
    let mut splatting = pipeline(SplattingConfig::default().with_iterations(0).with_capacity_divisor(1));
    draw(&mut splatting, &depth);

    let bounds = splatting.final_bounds();
    assert!(bounds[[0, 0]].hi < bounds[[32, 0]].hi);
}

#[test]
fn test_debug_composite_marks_points() {
    let depth = plane_depth(|x, y| x % 4 == 0 && y % 4 == 0);
    let mut splatting = pipeline(SplattingConfig::default());
    splatting.set_debug_view(DebugView::Composite);

    let mut output = DebugImage::new(SIZE, SIZE);
    let input = FrameInput::new(&depth).with_camera(Matrix4::identity(), projection());
    splatting.draw(&input, Some(&mut output)).unwrap();

    assert_eq!(output[[4, 4]][3], 1.0);
    assert_eq!(output[[5, 4]][3], 0.0);
}
