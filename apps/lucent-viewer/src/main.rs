//! Lucent clear-color demo
//!
//! Brings up the Vulkan backend through the capability layer and presents
//! a clear color that cycles over time. Useful as a smoke test for
//! instance/device bring-up, swapchain negotiation, and teardown.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use lucent_app::{run_app, AppConfig, AppContext, LucentApp};
use lucent_graphics::{Color, GpuFrame};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

struct ClearDemo {
    elapsed: f32,
}

impl LucentApp for ClearDemo {
    fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
        Ok(Self { elapsed: 0.0 })
    }

    fn update(&mut self, _ctx: &AppContext, dt: f32) {
        self.elapsed += dt;
    }

    fn render(&mut self, ctx: &mut AppContext, frame: &dyn GpuFrame) -> anyhow::Result<()> {
        let phase = self.elapsed * 0.5;
        let color = Color::new(
            phase.sin().mul_add(0.5, 0.5),
            (phase + 2.0).sin().mul_add(0.5, 0.5),
            (phase + 4.0).sin().mul_add(0.5, 0.5),
            1.0,
        );
        ctx.command_buffer.clear(frame, color)?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    run_app::<ClearDemo>(
        AppConfig::new("Lucent Clear Demo")
            .with_size(WIDTH, HEIGHT)
            .with_vsync(true),
    )
}
