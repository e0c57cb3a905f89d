//! Layout descriptions and plain value types used across backends.

/// An opaque tag describing a rendering topology the application wants a
/// device for. Backends report whether a layout is realizable before the
/// device is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceLayout {
    /// Single forward pass.
    SimpleForward,
    /// Geometry + lighting passes.
    SimpleDeferred,
}

/// Window presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenMode {
    Fullscreen,
    WindowedFullscreen,
    Windowed,
}

/// Vertical synchronization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VsyncMode {
    Off,
    DoubleBuffer,
    TripleBuffer,
}

/// Requested presentation configuration.
#[derive(Debug, Clone)]
pub struct SwapchainLayout {
    pub fullscreen_mode: FullscreenMode,
    /// Index of the target monitor.
    pub screen: u32,
    pub vsync_mode: VsyncMode,
    /// Refresh divisor applied when vsync is on.
    pub vsync_rate: f32,
    /// Reserved for future layout fallback; currently never resolved.
    pub fallback: Option<Box<SwapchainLayout>>,
}

impl Default for SwapchainLayout {
    fn default() -> Self {
        Self {
            fullscreen_mode: FullscreenMode::Windowed,
            screen: 0,
            vsync_mode: VsyncMode::DoubleBuffer,
            vsync_rate: 1.0,
            fallback: None,
        }
    }
}

/// Surface dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceExtent {
    pub width: u32,
    pub height: u32,
}

impl SurfaceExtent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Linear RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Self = Self::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Self = Self::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Self = Self::new(0.0, 0.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Color components as an array, in RGBA order.
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}
