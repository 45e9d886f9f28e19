//! Camera matrices and the screen/world conversions shared by every pass

use crate::render_target::is_valid_depth;
use nalgebra::{Matrix4, Point3, Vector4};

/// Homogeneous `w` below this magnitude is treated as a degenerate unprojection
pub const MIN_HOMOGENEOUS_W: f32 = 1.0e-8;

/// View and projection matrices of one frame, with the derived products
/// every pass needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrices {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub projection_view: Matrix4<f32>,
    pub inv_projection_view: Matrix4<f32>,
}

/// Where a world point lands on screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPosition {
    /// Continuous pixel coordinates; pixel centres sit on integers
    pub pixel: [f32; 2],
    /// Window-space depth in `[0, 1]` for points inside the clip volume
    pub depth: f32,
    /// Clip-space `w`
    pub w: f32,
}

impl CameraMatrices {
    /// Returns `None` when `projection * view` is not invertible
    pub fn new(view: Matrix4<f32>, projection: Matrix4<f32>) -> Option<Self> {
        let projection_view = projection * view;
        let inv_projection_view = projection_view.try_inverse()?;
        if !inv_projection_view.iter().all(|v| v.is_finite()) {
            return None;
        }

        Some(Self {
            view,
            projection,
            projection_view,
            inv_projection_view,
        })
    }

    /// Reconstruct the world position seen through pixel `(x, y)` at `depth`
    pub fn unproject(&self, x: u32, y: u32, depth: f32, width: u32, height: u32) -> Option<Point3<f32>> {
        if !is_valid_depth(depth) {
            return None;
        }

        let [ndc_x, ndc_y] = pixel_to_ndc(x, y, width, height);
        let world = self.inv_projection_view * Vector4::new(ndc_x, ndc_y, 2.0 * depth - 1.0, 1.0);
        if !(world.w.abs() >= MIN_HOMOGENEOUS_W) {
            return None;
        }

        let point = Point3::new(world.x / world.w, world.y / world.w, world.z / world.w);
        if point.iter().all(|v| v.is_finite()) {
            Some(point)
        } else {
            None
        }
    }

    /// Project a world point onto the screen
    pub fn project(&self, point: &Point3<f32>, width: u32, height: u32) -> Option<ScreenPosition> {
        let clip = self.projection_view * point.to_homogeneous();
        if !(clip.w.abs() >= MIN_HOMOGENEOUS_W) {
            return None;
        }

        let ndc = clip.xyz() / clip.w;
        let pixel = [
            (ndc.x + 1.0) * 0.5 * width as f32 - 0.5,
            (1.0 - ndc.y) * 0.5 * height as f32 - 0.5,
        ];

        Some(ScreenPosition {
            pixel,
            depth: (ndc.z + 1.0) * 0.5,
            w: clip.w,
        })
    }

    /// Pixels per world unit at `point`, or `None` when the point sits behind
    /// the camera or the scale is not finite
    pub fn pixels_per_unit(&self, point: &Point3<f32>, height: u32) -> Option<f32> {
        let clip = self.projection_view * point.to_homogeneous();
        let scale = 0.5 * height as f32 * self.projection[(1, 1)] / clip.w;
        if clip.w > 0.0 && scale.is_finite() && scale > 0.0 {
            Some(scale)
        } else {
            None
        }
    }
}

/// NDC of the centre of pixel `(x, y)`; row 0 is the top of the screen
pub fn pixel_to_ndc(x: u32, y: u32, width: u32, height: u32) -> [f32; 2] {
    [
        2.0 * (x as f32 + 0.5) / width as f32 - 1.0,
        1.0 - 2.0 * (y as f32 + 0.5) / height as f32,
    ]
}
