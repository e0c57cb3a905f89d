//! Backend-agnostic graphics capability layer for the Lucent engine.
//!
//! This crate provides:
//! - The provider/instance/device/command-buffer/frame trait set that keeps
//!   application code independent of the concrete graphics backend
//! - Device and swapchain layout descriptions
//! - The shared graphics error taxonomy
//!
//! Exactly one backend implementation is required for a working application,
//! but the trait set is designed so a second backend can be added without
//! touching call sites.

pub mod api;
pub mod error;
pub mod types;

pub use api::{
    GpuCommandBuffer, GpuDevice, GpuFrame, GpuInstance, GpuProvider, PresentationTarget,
};
pub use error::{GraphicsError, Result};
pub use types::{Color, DeviceLayout, FullscreenMode, SurfaceExtent, SwapchainLayout, VsyncMode};
