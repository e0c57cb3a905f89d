//! Application context shared with `LucentApp` implementations.

use std::sync::Arc;
use std::time::Instant;

use lucent_graphics::{GpuCommandBuffer, GpuDevice, SurfaceExtent};
use winit::window::Window;

/// Everything an application needs each frame: the window, the active
/// device, and the shared command buffer.
pub struct AppContext {
    pub window: Arc<Window>,
    pub device: Box<dyn GpuDevice>,
    /// The single reusable command buffer; reset and submitted by the
    /// shell around [`LucentApp::render`](crate::LucentApp::render).
    pub command_buffer: Box<dyn GpuCommandBuffer>,
    /// Current surface extent as accepted by the last negotiation.
    pub extent: SurfaceExtent,
    pub last_frame_time: Instant,
    pub frame_count: u64,
}
