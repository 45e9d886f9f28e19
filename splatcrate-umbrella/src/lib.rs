//! # Splatcrate
//!
//! Adaptive screen-space splat radius estimation for point clouds.
//!
//! This is the umbrella crate that provides convenient access to all Splatcrate functionality.
//! You can use this crate to get everything in one place, or use individual crates for
//! more granular control over dependencies.
//!
//! ## Features
//!
//! - **Core**: Render targets, camera math, configuration and the `ScreenEffect` trait
//! - **CPU**: Data-parallel pipeline built on rayon
//! - **GPU**: Compute shader pipeline using wgpu
//!
//! ## Quick Start
//!
//! ```rust
//! use splatcrate::prelude::*;
//!
//! let depth = DepthBuffer::filled(64, 64, 1.0);
//! let mut splatting = ScreenSpaceSplatting::new(SplattingConfig::default(), 64, 64).unwrap();
//!
//! let input = FrameInput::new(&depth).with_camera(Matrix4::identity(), Matrix4::identity());
//! let status = splatting.draw(&input, None).unwrap();
//! assert!(status.is_completed());
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables core and cpu
//! - `cpu`: CPU pipeline
//! - `gpu`: GPU pipeline
//! - `all`: Enables all features

// Re-export core functionality
pub use splatcrate_core::*;

// Re-export sub-crates
#[cfg(feature = "cpu")]
pub use splatcrate_splatting as splatting;

#[cfg(feature = "gpu")]
pub use splatcrate_gpu as gpu;

/// Convenient imports for common use cases
pub mod prelude {
    pub use splatcrate_core::*;

    #[cfg(feature = "cpu")]
    pub use splatcrate_splatting::ScreenSpaceSplatting;

    #[cfg(feature = "gpu")]
    pub use splatcrate_gpu::{GpuContext, GpuScreenSpaceSplatting};
}
