//! Per-frame inputs and outcomes

use crate::camera::CameraMatrices;
use crate::error::{Error, Result};
use crate::render_target::{ColorBuffer, DebugImage, DepthBuffer};
use nalgebra::Matrix4;

/// Everything one `draw` borrows from the caller
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub depth: &'a DepthBuffer,
    /// Not read numerically; available to the debug compositor
    pub color: Option<&'a ColorBuffer>,
    pub view_matrix: Option<Matrix4<f32>>,
    pub projection_matrix: Option<Matrix4<f32>>,
}

impl<'a> FrameInput<'a> {
    pub fn new(depth: &'a DepthBuffer) -> Self {
        Self {
            depth,
            color: None,
            view_matrix: None,
            projection_matrix: None,
        }
    }

    pub fn with_color(mut self, color: &'a ColorBuffer) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_camera(mut self, view_matrix: Matrix4<f32>, projection_matrix: Matrix4<f32>) -> Self {
        self.view_matrix = Some(view_matrix);
        self.projection_matrix = Some(projection_matrix);
        self
    }

    /// Resolve the camera, or the reason the frame has to be skipped
    pub fn camera(&self) -> std::result::Result<CameraMatrices, SkipReason> {
        let view = self.view_matrix.ok_or(SkipReason::MissingViewMatrix)?;
        let projection = self.projection_matrix.ok_or(SkipReason::MissingProjectionMatrix)?;
        CameraMatrices::new(view, projection).ok_or(SkipReason::SingularProjectionView)
    }

    /// Check every borrowed buffer, and `output` if given, against the screen size
    pub fn check_size(&self, expected: (u32, u32), output: Option<&DebugImage>) -> Result<()> {
        let sizes = [
            ("depth buffer", Some(self.depth.size())),
            ("color buffer", self.color.map(|c| c.size())),
            ("debug output", output.map(|o| o.size())),
        ];
        for (what, actual) in sizes {
            match actual {
                Some(actual) if actual != expected => {
                    return Err(Error::SizeMismatch { what, expected, actual });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Why a frame was skipped without touching any buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingViewMatrix,
    MissingProjectionMatrix,
    SingularProjectionView,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingViewMatrix => write!(f, "view matrix is not set"),
            SkipReason::MissingProjectionMatrix => write!(f, "projection matrix is not set"),
            SkipReason::SingularProjectionView => write!(f, "projection * view is not invertible"),
        }
    }
}

/// Counters describing a completed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Points kept by stream compaction, when known without a readback
    pub extracted_points: Option<usize>,
    /// Valid pixels that did not fit the compaction buffer
    pub dropped_points: Option<usize>,
    /// Refinement rounds executed
    pub iterations: u32,
}

/// Outcome of one `draw`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStatus {
    Completed(FrameStats),
    Skipped(SkipReason),
}

impl DrawStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, DrawStatus::Completed(_))
    }

    pub fn stats(&self) -> Option<&FrameStats> {
        match self {
            DrawStatus::Completed(stats) => Some(stats),
            DrawStatus::Skipped(_) => None,
        }
    }
}
