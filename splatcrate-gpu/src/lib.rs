//! # Splatcrate GPU
//!
//! wgpu compute realisation of the adaptive splat radius estimator.
//!
//! The passes run as compute shaders over storage buffers that mirror the
//! CPU render targets, so a readback can be compared against
//! `splatcrate-splatting` pixel for pixel.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use splatcrate_gpu::{GpuContext, GpuScreenSpaceSplatting};
//! use splatcrate_core::SplattingConfig;
//!
//! async fn example() -> splatcrate_core::Result<()> {
//!     let gpu_context = Arc::new(GpuContext::new().await?);
//!     let splatting = GpuScreenSpaceSplatting::new(gpu_context, SplattingConfig::default(), 1280, 720).await?;
//!     println!("{} points per frame", splatting.point_capacity());
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod splatting;

// Re-export commonly used items
pub use device::GpuContext;
pub use splatting::{GpuParams, GpuReadback, GpuScreenSpaceSplatting};
