//! `LucentApp` trait definition.

use lucent_graphics::GpuFrame;
use winit::event::WindowEvent;

use crate::context::AppContext;

/// Trait for Lucent applications.
///
/// The shell handles window creation, backend bring-up, swapchain
/// negotiation, the frame protocol, and teardown. Applications record
/// commands into the context's command buffer between the shell's reset
/// and submit.
pub trait LucentApp: Sized {
    /// Called once after the device and presentation surface are ready.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Called every frame before rendering with the delta time in seconds.
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record this frame's commands. The command buffer has been reset and
    /// will be submitted by the shell after this returns.
    fn render(&mut self, ctx: &mut AppContext, frame: &dyn GpuFrame) -> anyhow::Result<()>;

    /// Called after the swapchain has been recreated for a new size.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle a window event. Return `true` to consume it.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }
}
