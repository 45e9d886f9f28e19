//! Core traits for splatcrate

use crate::{frame::*, render_target::DebugImage, Result};

/// A full-screen effect driven once per frame from a depth buffer and camera
pub trait ScreenEffect {
    /// Reallocate every size-dependent buffer; must run before the first
    /// `draw` and whenever the output resolution changes
    fn set_size(&mut self, width: u32, height: u32) -> Result<()>;

    /// Current `(width, height)`
    fn size(&self) -> (u32, u32);

    /// Run the effect for one frame, optionally compositing into `output`
    fn draw(&mut self, input: &FrameInput<'_>, output: Option<&mut DebugImage>) -> Result<DrawStatus>;

    /// Rounds the next `draw` runs
    fn num_iterations(&self) -> u32;

    fn set_num_iterations(&mut self, num_iterations: u32);

    fn increment_iterations(&mut self) {
        let next = self.num_iterations().saturating_add(1);
        self.set_num_iterations(next);
    }

    fn decrement_iterations(&mut self) {
        let next = self.num_iterations().saturating_sub(1);
        self.set_num_iterations(next);
    }
}
