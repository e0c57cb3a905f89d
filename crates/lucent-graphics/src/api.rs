//! The provider/instance/device/command-buffer/frame trait set.
//!
//! Application code talks to the graphics backend exclusively through these
//! traits. Creation methods take the [`ResourceLedger`] so every successful
//! acquisition registers its teardown at the acquisition site, in acquire
//! order, before the next step begins.

use std::any::Any;
use std::fmt;

use lucent_core::ResourceLedger;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::Result;
use crate::types::{Color, DeviceLayout, SurfaceExtent, SwapchainLayout};

/// Anything a backend can create a presentation surface for.
///
/// Windowing toolkits providing raw display and window handles (e.g. winit
/// windows) satisfy this automatically.
pub trait PresentationTarget: HasDisplayHandle + HasWindowHandle {}

impl<T: HasDisplayHandle + HasWindowHandle + ?Sized> PresentationTarget for T {}

/// A backend implementation capable of producing a graphics instance.
///
/// Stateless; queried once at startup.
pub trait GpuProvider {
    /// Human-readable backend name, e.g. `"Vulkan"`.
    fn name(&self) -> &'static str;

    /// Whether this backend can run on the current system.
    fn is_supported(&self) -> bool;

    /// Create a backend connection.
    ///
    /// Callers must check [`GpuProvider::is_supported`] first.
    fn create_instance(&self, ledger: &mut ResourceLedger) -> Result<Box<dyn GpuInstance>>;
}

/// A backend connection used to enumerate hardware and create devices.
pub trait GpuInstance {
    /// Whether the given device layout is realizable on this system.
    fn supports_layout(&self, layout: DeviceLayout) -> bool;

    /// Create a logical device for the given layout.
    ///
    /// Callers must check [`GpuInstance::supports_layout`] first; backends
    /// re-validate and return
    /// [`GraphicsError::UnsupportedConfiguration`](crate::GraphicsError::UnsupportedConfiguration)
    /// when the layout is not realizable.
    fn create_device(
        &self,
        layout: DeviceLayout,
        ledger: &mut ResourceLedger,
    ) -> Result<Box<dyn GpuDevice>>;
}

/// A logical handle to a selected physical GPU.
///
/// Exactly one device is active per application instance.
pub trait GpuDevice {
    /// Bind a presentation surface and negotiate a swapchain for it.
    ///
    /// The requested `layout` is reconciled against hardware-reported
    /// surface capabilities; the extent may be corrected during
    /// negotiation. Must be called exactly once, before the first
    /// [`GpuDevice::begin_frame`].
    fn attach_presentation(
        &mut self,
        target: &dyn PresentationTarget,
        layout: &SwapchainLayout,
        extent: SurfaceExtent,
        ledger: &mut ResourceLedger,
    ) -> Result<()>;

    /// Recreate the swapchain for new surface dimensions.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Allocate a reusable command buffer.
    fn create_command_buffer(
        &mut self,
        ledger: &mut ResourceLedger,
    ) -> Result<Box<dyn GpuCommandBuffer>>;

    /// Start a frame, acquiring the next presentable image.
    ///
    /// When `blocking`, waits indefinitely for an image to become
    /// available; otherwise fails fast when none is ready.
    fn begin_frame(&mut self, blocking: bool) -> Result<Box<dyn GpuFrame>>;

    /// Present the frame. When `blocking`, waits for the submitted work to
    /// complete before returning, so the single command buffer can be
    /// reused immediately.
    fn end_frame(&mut self, frame: Box<dyn GpuFrame>, blocking: bool) -> Result<()>;
}

impl fmt::Debug for dyn GpuDevice + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn GpuDevice")
    }
}

/// A reusable command recording object.
///
/// Recording follows a strict cycle: [`reset`](GpuCommandBuffer::reset),
/// then recording calls, then [`submit`](GpuCommandBuffer::submit).
/// Calling `submit` without a prior `reset` in the current cycle is a
/// precondition violation and is rejected, not silently tolerated.
pub trait GpuCommandBuffer {
    /// Begin a new recording cycle, discarding prior contents.
    fn reset(&mut self) -> Result<()>;

    /// Record a clear of the frame's presentable image to `color`.
    fn clear(&mut self, frame: &dyn GpuFrame, color: Color) -> Result<()>;

    /// Finish recording and submit to the device queue.
    fn submit(&mut self) -> Result<()>;
}

impl fmt::Debug for dyn GpuCommandBuffer + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn GpuCommandBuffer")
    }
}

/// One begin/submit/present cycle's presentable unit of work.
pub trait GpuFrame {
    /// Backend downcast hook.
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn GpuFrame + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn GpuFrame")
    }
}
