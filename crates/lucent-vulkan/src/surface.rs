//! Surface management for windowed rendering.
//!
//! Wraps Vulkan surface creation behind the raw-window-handle traits so
//! callers never touch platform-specific surface extensions directly.

use ash::vk;
use lucent_graphics::PresentationTarget;

use crate::error::{GpuError, Result};

/// A Vulkan surface plus its extension loader.
pub struct SurfaceContext {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
}

impl SurfaceContext {
    /// Create a surface for a presentation target.
    ///
    /// # Safety
    /// The instance must be valid and the target's handles must outlive the
    /// surface.
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        target: &dyn PresentationTarget,
    ) -> Result<Self> {
        let display = target
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("no display handle: {e}")))?;
        let window = target
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("no window handle: {e}")))?;

        let surface =
            ash_window::create_surface(entry, instance, display.as_raw(), window.as_raw(), None)
                .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        Ok(Self {
            surface,
            surface_loader,
        })
    }

    /// Query the surface's current capabilities, formats, and present
    /// modes. Queried fresh per negotiation attempt since capabilities
    /// change across window resizes.
    ///
    /// # Safety
    /// The physical device must be valid.
    pub unsafe fn query_support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        let capabilities = self
            .surface_loader
            .get_physical_device_surface_capabilities(physical_device, self.surface)?;
        let formats = self
            .surface_loader
            .get_physical_device_surface_formats(physical_device, self.surface)?;
        let present_modes = self
            .surface_loader
            .get_physical_device_surface_present_modes(physical_device, self.surface)?;

        Ok(SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Whether a queue family can present to this surface.
    ///
    /// # Safety
    /// The physical device must be valid.
    pub unsafe fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> bool {
        self.surface_loader
            .get_physical_device_surface_support(physical_device, queue_family, self.surface)
            .unwrap_or(false)
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}

/// Hardware-reported presentation support for one surface.
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Select the preferred surface format, favoring SRGB.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    for format in available {
        if format.format == vk::Format::B8G8R8A8_SRGB
            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        {
            return *format;
        }
    }

    available[0]
}

/// Select the best present mode for the requested vsync policy.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        // FIFO is always supported.
        vk::PresentModeKHR::FIFO
    } else {
        for &mode in available {
            if mode == vk::PresentModeKHR::MAILBOX {
                return mode;
            }
        }
        for &mode in available {
            if mode == vk::PresentModeKHR::IMMEDIATE {
                return mode;
            }
        }
        vk::PresentModeKHR::FIFO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_srgb_format() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            select_surface_format(&formats).format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn vsync_always_picks_fifo() {
        let available = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(
            select_present_mode(&available, true),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn no_vsync_prefers_mailbox_then_immediate() {
        let with_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            select_present_mode(&with_mailbox, false),
            vk::PresentModeKHR::MAILBOX
        );

        let without_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            select_present_mode(&without_mailbox, false),
            vk::PresentModeKHR::IMMEDIATE
        );
    }
}
