//! Debug compositing of the intermediate render targets
//!
//! Purely observational: nothing here feeds back into the estimator.

use crate::config::SplattingConfig;
use crate::error::{Error, Result};
use crate::render_target::{ColorBuffer, DebugImage};
use crate::targets::{BoundsSlot, RenderTargetSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which buffer the compositor shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugView {
    /// Ping midpoint in red, pong midpoint in green, neighbor count in blue
    #[default]
    Composite,
    DensityGrid,
    RadiusPing,
    RadiusPong,
    FeedbackRadius,
    NeighborCounts,
    /// The color source handed to `draw`
    Color,
}

/// Render `view` into `output`, which must match the screen size
pub fn compose(
    targets: &RenderTargetSet,
    config: &SplattingConfig,
    view: DebugView,
    color: Option<&ColorBuffer>,
    output: &mut DebugImage,
) -> Result<()> {
    if output.size() != targets.size() {
        return Err(Error::SizeMismatch {
            what: "debug output",
            expected: targets.size(),
            actual: output.size(),
        });
    }

    match view {
        DebugView::Composite => {
            let ping = targets.bounds(BoundsSlot::Ping);
            let pong = targets.bounds(BoundsSlot::Pong);
            let ping_max = max_value(ping.iter().map(|b| b.midpoint()));
            let pong_max = max_value(pong.iter().map(|b| b.midpoint()));
            let count_scale = 2.0 * config.k_neighbors.max(1) as f32;

            for (index, pixel) in output.data_mut().iter_mut().enumerate() {
                let (a, b) = (ping[index], pong[index]);
                let occupied = !a.is_empty() || !b.is_empty();
                *pixel = [
                    normalize(a.midpoint(), ping_max),
                    normalize(b.midpoint(), pong_max),
                    normalize(targets.neighbor_counts[index], count_scale),
                    if occupied { 1.0 } else { 0.0 },
                ];
            }
        }
        DebugView::DensityGrid => {
            let grid = &targets.density_grid;
            let cell = config.initial_estimation_grid_size.max(1);
            let grid_max = max_value(grid.iter().copied());
            let width = output.width();

            for (index, pixel) in output.data_mut().iter_mut().enumerate() {
                let (x, y) = (index as u32 % width, index as u32 / width);
                let count = grid.get(x / cell, y / cell).copied().unwrap_or(0.0);
                *pixel = gray(normalize(count, grid_max));
            }
        }
        DebugView::RadiusPing | DebugView::RadiusPong => {
            let slot = if view == DebugView::RadiusPing {
                BoundsSlot::Ping
            } else {
                BoundsSlot::Pong
            };
            let bounds = targets.bounds(slot);
            let radius_max = max_value(bounds.iter().map(|b| b.midpoint()));
            for (pixel, b) in output.data_mut().iter_mut().zip(bounds.iter()) {
                *pixel = gray(normalize(b.midpoint(), radius_max));
            }
        }
        DebugView::FeedbackRadius => {
            let feedback = &targets.feedback_radius;
            let feedback_max = max_value(feedback.iter().copied());
            for (pixel, value) in output.data_mut().iter_mut().zip(feedback.iter()) {
                *pixel = gray(normalize(*value, feedback_max));
            }
        }
        DebugView::NeighborCounts => {
            let scale = 2.0 * config.k_neighbors.max(1) as f32;
            for (pixel, count) in output.data_mut().iter_mut().zip(targets.neighbor_counts.iter()) {
                *pixel = gray(normalize(*count, scale));
            }
        }
        DebugView::Color => match color {
            Some(color) if color.size() == output.size() => {
                output.data_mut().copy_from_slice(color.data());
            }
            Some(color) => {
                return Err(Error::SizeMismatch {
                    what: "color source",
                    expected: output.size(),
                    actual: color.size(),
                });
            }
            None => output.clear(),
        },
    }

    Ok(())
}

/// Quantize a debug image to 8-bit RGBA
pub fn to_rgba8(image: &DebugImage) -> image::RgbaImage {
    image::RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image[[x, y]];
        image::Rgba([quantize(r), quantize(g), quantize(b), quantize(a)])
    })
}

/// Write a debug image as PNG
pub fn save_png(image: &DebugImage, path: impl AsRef<Path>) -> Result<()> {
    to_rgba8(image).save(path.as_ref())?;
    Ok(())
}

fn max_value(values: impl Iterator<Item = f32>) -> f32 {
    values.filter(|v| v.is_finite()).fold(0.0, f32::max)
}

fn normalize(value: f32, max: f32) -> f32 {
    if max > 0.0 && value.is_finite() {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn gray(value: f32) -> [f32; 4] {
    [value, value, value, 1.0]
}

fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::RadiusBounds;

    #[test]
    fn test_cleared_targets_compose_to_black() {
        let targets = RenderTargetSet::new(8, 8, 1, 1);
        let mut output = DebugImage::filled(8, 8, [0.5; 4]);
        compose(&targets, &SplattingConfig::default(), DebugView::Composite, None, &mut output).unwrap();
        assert!(output.iter().all(|p| *p == [0.0; 4]));
    }

    #[test]
    fn test_composite_marks_points() {
        let mut targets = RenderTargetSet::new(4, 4, 1, 1);
        targets.bounds_mut(BoundsSlot::Ping).set(2, 1, RadiusBounds::new(0.0, 4.0));
        targets.neighbor_counts.set(2, 1, 10.0);

        let mut output = DebugImage::new(4, 4);
        let config = SplattingConfig::default();
        compose(&targets, &config, DebugView::Composite, None, &mut output).unwrap();

        assert_eq!(output[[2, 1]], [1.0, 0.0, 0.5, 1.0]);
        assert_eq!(output[[0, 0]], [0.0; 4]);
    }

    #[test]
    fn test_density_grid_is_upsampled() {
        let mut targets = RenderTargetSet::new(4, 4, 2, 2);
        targets.density_grid.set(1, 0, 3.0);
        let config = SplattingConfig::default().with_grid_size(2);

        let mut output = DebugImage::new(4, 4);
        compose(&targets, &config, DebugView::DensityGrid, None, &mut output).unwrap();
        assert_eq!(output[[3, 1]][0], 1.0);
        assert_eq!(output[[1, 1]][0], 0.0);
    }

    #[test]
    fn test_output_size_must_match() {
        let targets = RenderTargetSet::new(4, 4, 1, 1);
        let mut output = DebugImage::new(3, 4);
        let result = compose(&targets, &SplattingConfig::default(), DebugView::Composite, None, &mut output);
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_rgba8_quantization() {
        let image = DebugImage::filled(2, 1, [1.0, 0.5, 0.0, 2.0]);
        let rgba = to_rgba8(&image);
        assert_eq!(rgba.get_pixel(1, 0).0, [255, 128, 0, 255]);
    }
}
