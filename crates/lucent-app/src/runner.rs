//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lucent_core::ResourceLedger;
use lucent_graphics::{
    DeviceLayout, GpuProvider, GraphicsError, SurfaceExtent, SwapchainLayout, VsyncMode,
};
use lucent_vulkan::VulkanProvider;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::LucentApp;
use crate::context::AppContext;

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Lucent".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: true,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }
}

/// Run a [`LucentApp`] with the given configuration.
///
/// Initializes logging, creates the window and device, and runs the event
/// loop until the application exits. Every GPU resource acquired during
/// bring-up is released through the ledger on shutdown, newest first.
pub fn run_app<A: LucentApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };

    event_loop.run_app(&mut runner)?;

    Ok(())
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner<A: LucentApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

/// Internal application state.
struct AppState<A: LucentApp> {
    ctx: AppContext,
    app: A,
    ledger: ResourceLedger,
    target_frame_time: Option<Duration>,
}

impl<A: LucentApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                info!("application ready");
                self.state = Some(state);
            }
            Err(e) => {
                error!("failed to initialize application: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let mut failed = false;
                if let Some(state) = &mut self.state {
                    match state.render_frame() {
                        Ok(()) => state.ctx.window.request_redraw(),
                        Err(e) => {
                            // A frame abandoned between begin and end cannot
                            // be presented, and the device rejects every
                            // begin after it. Stop and release everything
                            // instead of spinning on a wedged protocol.
                            error!("render error, shutting down: {e}");
                            failed = true;
                        }
                    }
                }
                if failed {
                    if let Some(mut state) = self.state.take() {
                        state.cleanup();
                    }
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("resize error: {e}");
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: LucentApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let mut ledger = ResourceLedger::new();
        let initialized = self
            .bring_up(Arc::clone(&window), &mut ledger)
            .and_then(|mut ctx| {
                let app = A::init(&mut ctx)?;
                Ok((ctx, app))
            });

        match initialized {
            Ok((ctx, app)) => {
                let target_frame_time = self
                    .config
                    .target_fps
                    .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)));

                Ok(AppState {
                    ctx,
                    app,
                    ledger,
                    target_frame_time,
                })
            }
            Err(e) => {
                // Partial bring-up still unwinds everything acquired so far.
                if let Err(teardown) = ledger.unwind_all() {
                    error!("teardown after failed bring-up: {teardown}");
                }
                Err(e)
            }
        }
    }

    fn bring_up(
        &self,
        window: Arc<Window>,
        ledger: &mut ResourceLedger,
    ) -> anyhow::Result<AppContext> {
        let provider = VulkanProvider::new();
        if !provider.is_supported() {
            anyhow::bail!("{} backend is not supported on this system", provider.name());
        }

        let instance = provider.create_instance(ledger)?;

        let layout = DeviceLayout::SimpleForward;
        if !instance.supports_layout(layout) {
            anyhow::bail!("device layout {layout:?} is not realizable");
        }
        let mut device = instance.create_device(layout, ledger)?;

        let size = window.inner_size();
        let extent = SurfaceExtent::new(size.width, size.height);
        let swapchain_layout = SwapchainLayout {
            vsync_mode: if self.config.vsync {
                VsyncMode::DoubleBuffer
            } else {
                VsyncMode::Off
            },
            ..Default::default()
        };
        device.attach_presentation(window.as_ref(), &swapchain_layout, extent, ledger)?;

        let command_buffer = device.create_command_buffer(ledger)?;

        Ok(AppContext {
            window,
            device,
            command_buffer,
            extent,
            last_frame_time: Instant::now(),
            frame_count: 0,
        })
    }
}

/// A stale surface is the one frame error the loop recovers from in
/// place; anything else ends the run.
fn recoverable(err: &GraphicsError) -> bool {
    matches!(err, GraphicsError::SwapchainValidation(_))
}

impl<A: LucentApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();
        let dt = frame_start
            .duration_since(self.ctx.last_frame_time)
            .as_secs_f32();
        self.ctx.last_frame_time = frame_start;

        self.app.update(&self.ctx, dt);

        let frame = match self.ctx.device.begin_frame(true) {
            Ok(frame) => frame,
            // The surface changed under us; recreate and draw next frame.
            Err(e) if recoverable(&e) => {
                tracing::debug!("swapchain stale at acquire: {e}");
                let size = self.ctx.window.inner_size();
                return self.handle_resize(size.width, size.height);
            }
            Err(e) => return Err(e.into()),
        };

        self.ctx.command_buffer.reset()?;
        self.app.render(&mut self.ctx, frame.as_ref())?;
        self.ctx.command_buffer.submit()?;

        match self.ctx.device.end_frame(frame, true) {
            Ok(()) => {}
            Err(e) if recoverable(&e) => {
                tracing::debug!("swapchain stale at present: {e}");
                let size = self.ctx.window.inner_size();
                self.handle_resize(size.width, size.height)?;
            }
            Err(e) => return Err(e.into()),
        }

        self.ctx.frame_count += 1;

        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        // Minimized; nothing to rebuild until the surface has area again.
        if width == 0 || height == 0 {
            return Ok(());
        }

        self.ctx.device.resize(width, height)?;
        self.ctx.extent = SurfaceExtent::new(width, height);
        self.app.on_resize(&mut self.ctx, width, height)
    }

    fn cleanup(&mut self) {
        info!("releasing {} acquired resources", self.ledger.len());
        if let Err(teardown) = self.ledger.unwind_all() {
            error!("teardown finished with failures: {teardown}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_swapchain_is_recoverable_in_place() {
        assert!(recoverable(&GraphicsError::SwapchainValidation(
            "surface out of date".to_string()
        )));
    }

    #[test]
    fn mid_frame_protocol_errors_end_the_run() {
        assert!(!recoverable(&GraphicsError::InvalidState(
            "begin_frame while a frame is already open".to_string()
        )));
        assert!(!recoverable(&GraphicsError::Backend(
            "device lost".to_string()
        )));
    }
}
