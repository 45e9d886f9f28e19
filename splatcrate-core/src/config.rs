//! Splatting pipeline configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// What the bounds update does when a point gathers exactly `k_neighbors`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetCountPolicy {
    /// The bracket collapses onto the candidate and stays there
    #[default]
    Collapse,
    /// The candidate becomes the new upper bound, so the search keeps moving
    /// toward the smallest radius that still gathers `k_neighbors`
    Shrink,
}

impl TargetCountPolicy {
    /// Stable code used in GPU uniforms
    pub fn code(self) -> u32 {
        match self {
            TargetCountPolicy::Collapse => 0,
            TargetCountPolicy::Shrink => 1,
        }
    }
}

/// Configuration of one splat radius estimator instance
///
/// `initial_estimation_grid_size`, `extraction_block_size` and
/// `capacity_divisor` shape the buffers and are fixed once the pipeline is
/// built. `num_iterations` and `k_neighbors` only steer the next `draw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplattingConfig {
    /// Target neighbor count each radius is calibrated to
    pub k_neighbors: u32,
    /// Side of a coarse density cell in pixels
    pub initial_estimation_grid_size: u32,
    /// Bisection rounds; more rounds give a tighter bracket
    pub num_iterations: u32,
    /// Side of the pixel block one extraction sample covers
    pub extraction_block_size: u32,
    /// The compacted point buffer holds `max points / capacity_divisor`
    /// entries; points beyond that are dropped
    pub capacity_divisor: u32,
    /// World radius used when density or screen scale is degenerate
    pub fallback_radius: f32,
    /// Upper bound on the rasterized disk radius in pixels
    pub max_splat_pixels: u32,
    pub target_policy: TargetCountPolicy,
}

impl Default for SplattingConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 10,
            initial_estimation_grid_size: 32,
            num_iterations: 1,
            extraction_block_size: 4,
            capacity_divisor: 10,
            fallback_radius: 0.05,
            max_splat_pixels: 64,
            target_policy: TargetCountPolicy::Collapse,
        }
    }
}

impl SplattingConfig {
    pub fn with_k_neighbors(mut self, k_neighbors: u32) -> Self {
        self.k_neighbors = k_neighbors;
        self
    }

    pub fn with_grid_size(mut self, grid_size: u32) -> Self {
        self.initial_estimation_grid_size = grid_size;
        self
    }

    pub fn with_iterations(mut self, num_iterations: u32) -> Self {
        self.num_iterations = num_iterations;
        self
    }

    pub fn with_capacity_divisor(mut self, capacity_divisor: u32) -> Self {
        self.capacity_divisor = capacity_divisor;
        self
    }

    pub fn with_fallback_radius(mut self, fallback_radius: f32) -> Self {
        self.fallback_radius = fallback_radius;
        self
    }

    pub fn with_max_splat_pixels(mut self, max_splat_pixels: u32) -> Self {
        self.max_splat_pixels = max_splat_pixels;
        self
    }

    pub fn with_target_policy(mut self, target_policy: TargetCountPolicy) -> Self {
        self.target_policy = target_policy;
        self
    }

    /// Check every field against its documented range
    pub fn validate(&self) -> Result<()> {
        if self.k_neighbors == 0 {
            return Err(Error::InvalidConfig("k_neighbors must be at least 1".to_string()));
        }
        if self.initial_estimation_grid_size == 0 {
            return Err(Error::InvalidConfig(
                "initial_estimation_grid_size must be at least 1".to_string(),
            ));
        }
        if self.extraction_block_size == 0 {
            return Err(Error::InvalidConfig("extraction_block_size must be at least 1".to_string()));
        }
        if self.capacity_divisor == 0 {
            return Err(Error::InvalidConfig("capacity_divisor must be at least 1".to_string()));
        }
        if !(self.fallback_radius.is_finite() && self.fallback_radius > 0.0) {
            return Err(Error::InvalidConfig(
                "fallback_radius must be finite and positive".to_string(),
            ));
        }
        if self.max_splat_pixels == 0 {
            return Err(Error::InvalidConfig("max_splat_pixels must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Number of extracted points the compaction buffer holds for a screen
    /// of `width x height`
    pub fn point_capacity(&self, width: u32, height: u32) -> usize {
        let block = self.extraction_block_size.max(1) as usize;
        let blocks = (width as usize).div_ceil(block) * (height as usize).div_ceil(block);
        let max_points = blocks * block * block;
        (max_points / self.capacity_divisor.max(1) as usize).max(1)
    }

    /// Dimensions of the coarse density grid for a screen of `width x height`
    pub fn grid_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let cell = self.initial_estimation_grid_size.max(1);
        (width.div_ceil(cell), height.div_ceil(cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SplattingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.k_neighbors, 10);
        assert_eq!(config.initial_estimation_grid_size, 32);
        assert_eq!(config.num_iterations, 1);
    }

    #[test]
    fn test_invalid_fields_are_rejected() {
        assert!(SplattingConfig::default().with_k_neighbors(0).validate().is_err());
        assert!(SplattingConfig::default().with_grid_size(0).validate().is_err());
        assert!(SplattingConfig::default().with_capacity_divisor(0).validate().is_err());
        assert!(SplattingConfig::default().with_fallback_radius(f32::NAN).validate().is_err());
        assert!(SplattingConfig::default().with_fallback_radius(0.0).validate().is_err());
        assert!(SplattingConfig::default().with_max_splat_pixels(0).validate().is_err());
    }

    #[test]
    fn test_point_capacity_underestimates_screen() {
        let config = SplattingConfig::default();
        // 16 x 16 blocks of 4 x 4 pixels, one tenth kept
        assert_eq!(config.point_capacity(64, 64), 409);
        // partial blocks round up
        assert_eq!(config.point_capacity(65, 64), 17 * 16 * 16 / 10);
        assert_eq!(config.point_capacity(1, 1), 1);
    }

    #[test]
    fn test_grid_dimensions_round_up() {
        let config = SplattingConfig::default();
        assert_eq!(config.grid_dimensions(64, 64), (2, 2));
        assert_eq!(config.grid_dimensions(65, 33), (3, 2));
    }
}
