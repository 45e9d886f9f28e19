//! # Splatcrate Splatting
//!
//! CPU realisation of the adaptive screen-space splat radius estimator.
//!
//! Every pass scatters over the extracted points with rayon and resolves its
//! per-pixel blend through atomic accumulators, mirroring what a rasterizer
//! with blending does on the GPU.

pub mod extraction;
pub mod initial_radius;
pub mod pipeline;
pub mod raster;
pub mod refinement;

// Re-export commonly used items
pub use extraction::*;
pub use initial_radius::*;
pub use pipeline::*;
pub use raster::*;
pub use refinement::*;
