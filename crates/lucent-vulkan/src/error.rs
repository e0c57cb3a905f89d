//! Vulkan backend error types.

use ash::vk;
use lucent_graphics::GraphicsError;
use thiserror::Error;

/// Vulkan-level errors. Converted into the shared
/// [`GraphicsError`] taxonomy at the capability-layer boundary.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Vulkan loader unavailable.
    #[error("Vulkan loading failed: {0}")]
    Loading(String),

    /// No suitable GPU found.
    #[error("no suitable GPU found")]
    NoSuitableDevice,

    /// No queue family matches the requested capability flags.
    #[error("no queue family matches {0:?}")]
    NoSuitableQueue(vk::QueueFlags),

    /// A layer or extension marked required is not available.
    #[error("required capability missing: {0}")]
    MissingCapability(String),

    /// Surface creation failed.
    #[error("surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Requested swapchain configuration rejected against surface
    /// capabilities.
    #[error("swapchain validation failed: {0}")]
    SwapchainValidation(String),

    /// Backend failed to create the swapchain.
    #[error("swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// The swapchain no longer matches the surface; recreation required.
    #[error("swapchain out of date")]
    SwapchainOutOfDate,

    /// An operation was issued outside its documented protocol.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<GpuError> for GraphicsError {
    fn from(err: GpuError) -> Self {
        match err {
            GpuError::Loading(message) => Self::UnsupportedConfiguration(message),
            GpuError::NoSuitableDevice => {
                Self::UnsupportedConfiguration("no suitable GPU found".to_string())
            }
            GpuError::NoSuitableQueue(_) => Self::NoSuitableQueue,
            GpuError::MissingCapability(name) => Self::RequiredCapabilityMissing(name),
            GpuError::SwapchainValidation(message) => Self::SwapchainValidation(message),
            GpuError::SwapchainOutOfDate => {
                Self::SwapchainValidation("swapchain out of date".to_string())
            }
            GpuError::SwapchainCreation(message) => Self::SwapchainCreation(message),
            GpuError::InvalidState(message) => Self::InvalidState(message),
            GpuError::Vulkan(_) | GpuError::SurfaceCreation(_) => Self::Backend(err.to_string()),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
