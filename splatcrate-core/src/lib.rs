//! Core data structures and traits for splatcrate
//!
//! This crate provides the render targets, camera conversions, configuration
//! and frame types shared by the CPU and GPU realisations of the adaptive
//! screen-space splat radius estimator.

pub mod camera;
pub mod config;
pub mod debug;
pub mod error;
pub mod frame;
pub mod point;
pub mod render_target;
pub mod targets;
pub mod traits;

pub use camera::*;
pub use config::*;
pub use debug::DebugView;
pub use error::*;
pub use frame::*;
pub use point::*;
pub use render_target::*;
pub use targets::*;
pub use traits::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix4, Point3, Vector3};
