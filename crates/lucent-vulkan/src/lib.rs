//! Vulkan backend for the Lucent graphics capability layer.
//!
//! This crate provides:
//! - Instance creation with layer/extension capability requests
//! - Physical-device and queue-family selection
//! - Surface management and swapchain negotiation
//! - The [`VulkanProvider`] implementation of the `lucent-graphics` traits
//!
//! Resource teardown is driven exclusively by the
//! [`ResourceLedger`](lucent_core::ResourceLedger): every acquisition pushes
//! its release at the acquisition site, and nothing here implements `Drop`
//! for GPU handles.

pub mod device;
pub mod error;
pub mod instance;
pub mod provider;
pub mod queue;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use error::{GpuError, Result};
pub use provider::VulkanProvider;
pub use queue::{score_family, QueueFamilyDescriptor, QueueSelector, SelectedQueue};
pub use surface::{SurfaceContext, SurfaceSupport};
pub use swapchain::{validate_config, SwapchainConfig};
