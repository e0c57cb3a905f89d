//! Swapchain negotiation and presentation resource management.
//!
//! A requested [`SwapchainConfig`] is reconciled against hardware-reported
//! surface capabilities before creation; the extent may be auto-corrected
//! and the inherit pre-transform resolved. Creation then builds the full
//! presentation chain (swapchain, image views, render pass, framebuffers),
//! registering one teardown per resource kind on the ledger, in acquire
//! order. Teardown actions release through shared slots and null them, so
//! recreation after a resize replaces slot contents without new ledger
//! entries.

use std::slice;
use std::sync::Arc;

use ash::vk;
use lucent_core::ResourceLedger;
use parking_lot::Mutex;

use crate::error::{GpuError, Result};
use crate::surface::SurfaceSupport;

/// Requested presentation configuration. Extent and pre-transform may be
/// auto-corrected during validation.
#[derive(Debug, Clone)]
pub struct SwapchainConfig {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub array_layers: u32,
    pub usage: vk::ImageUsageFlags,
    /// Queue families that will touch swapchain images. A single entry
    /// selects exclusive sharing.
    pub queue_family_indices: Vec<u32>,
    /// `INHERIT` resolves to the surface's current transform during
    /// validation.
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub clipped: bool,
    /// Previous swapchain, passed as a recreation hint so the backend may
    /// reuse internal resources.
    pub old_swapchain: vk::SwapchainKHR,
}

impl SwapchainConfig {
    /// A standard color-attachment request for one queue family.
    pub fn request(
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
        min_image_count: u32,
        queue_family: u32,
    ) -> Self {
        Self {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode,
            extent,
            min_image_count,
            array_layers: 1,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            queue_family_indices: vec![queue_family],
            pre_transform: vk::SurfaceTransformFlagsKHR::INHERIT,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            clipped: false,
            old_swapchain: vk::SwapchainKHR::null(),
        }
    }
}

/// Clamp a desired image count into the surface's reported range. A
/// `max_image_count` of zero means the surface imposes no upper bound.
pub fn clamp_image_count(desired: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = desired.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Validate and adjust `config` against the surface's reported
/// capabilities.
///
/// Checks, in order: presentation support for every sharing queue family
/// (fail fast), the (format, color space) pair against the supported
/// format list, extent clamping into the reported range when `fix_extent`
/// is set, inherit pre-transform resolution, then final acceptance of
/// image count, array layers, transform/alpha/usage subsets, and the
/// (post-clamp) extent bounds.
pub fn validate_config(
    config: &mut SwapchainConfig,
    capabilities: &vk::SurfaceCapabilitiesKHR,
    formats: &[vk::SurfaceFormatKHR],
    supports_present: impl Fn(u32) -> bool,
    fix_extent: bool,
) -> Result<()> {
    for &family in &config.queue_family_indices {
        if !supports_present(family) {
            return Err(GpuError::SwapchainValidation(format!(
                "queue family {family} cannot present to the surface"
            )));
        }
    }

    let format_supported = formats
        .iter()
        .any(|f| f.format == config.format && f.color_space == config.color_space);
    if !format_supported {
        return Err(GpuError::SwapchainValidation(format!(
            "format {:?} with color space {:?} is not supported",
            config.format, config.color_space
        )));
    }

    if fix_extent {
        config.extent.width = config.extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        );
        config.extent.height = config.extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        );
    }

    if config.pre_transform == vk::SurfaceTransformFlagsKHR::INHERIT {
        config.pre_transform = capabilities.current_transform;
    }

    if config.min_image_count < capabilities.min_image_count
        || (capabilities.max_image_count > 0
            && config.min_image_count > capabilities.max_image_count)
    {
        return Err(GpuError::SwapchainValidation(format!(
            "image count {} outside [{}, {}]",
            config.min_image_count, capabilities.min_image_count, capabilities.max_image_count
        )));
    }
    if config.array_layers > capabilities.max_image_array_layers {
        return Err(GpuError::SwapchainValidation(format!(
            "array layers {} exceed maximum {}",
            config.array_layers, capabilities.max_image_array_layers
        )));
    }
    if !capabilities
        .supported_transforms
        .contains(config.pre_transform)
    {
        return Err(GpuError::SwapchainValidation(format!(
            "pre-transform {:?} is not supported",
            config.pre_transform
        )));
    }
    if !capabilities
        .supported_composite_alpha
        .contains(config.composite_alpha)
    {
        return Err(GpuError::SwapchainValidation(format!(
            "composite alpha {:?} is not supported",
            config.composite_alpha
        )));
    }
    if !capabilities.supported_usage_flags.contains(config.usage) {
        return Err(GpuError::SwapchainValidation(format!(
            "usage {:?} is not supported",
            config.usage
        )));
    }
    let extent_ok = config.extent.width >= capabilities.min_image_extent.width
        && config.extent.width <= capabilities.max_image_extent.width
        && config.extent.height >= capabilities.min_image_extent.height
        && config.extent.height <= capabilities.max_image_extent.height;
    if !extent_ok {
        return Err(GpuError::SwapchainValidation(format!(
            "extent {}x{} outside supported range",
            config.extent.width, config.extent.height
        )));
    }

    Ok(())
}

/// Presentation resources, held in nullable slots so ledger teardown and
/// swapchain recreation can release and replace them independently.
#[derive(Default)]
pub struct PresentSlots {
    pub swapchain: vk::SwapchainKHR,
    /// Backend-owned; enumerated, never individually freed.
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl PresentSlots {
    pub fn is_attached(&self) -> bool {
        self.swapchain != vk::SwapchainKHR::null()
    }
}

unsafe fn create_swapchain(
    swapchain_loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    config: &SwapchainConfig,
) -> Result<vk::SwapchainKHR> {
    let sharing_mode = if config.queue_family_indices.len() > 1 {
        vk::SharingMode::CONCURRENT
    } else {
        vk::SharingMode::EXCLUSIVE
    };

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(config.min_image_count)
        .image_format(config.format)
        .image_color_space(config.color_space)
        .image_extent(config.extent)
        .image_array_layers(config.array_layers)
        .image_usage(config.usage)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(&config.queue_family_indices)
        .pre_transform(config.pre_transform)
        .composite_alpha(config.composite_alpha)
        .present_mode(config.present_mode)
        .clipped(config.clipped)
        .old_swapchain(config.old_swapchain);

    swapchain_loader
        .create_swapchain(&create_info, None)
        .map_err(|e| GpuError::SwapchainCreation(e.to_string()))
}

unsafe fn create_image_views(
    device: &ash::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>> {
    images
        .iter()
        .map(|&image| {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            // SAFETY: image and format come from the live swapchain.
            unsafe { device.create_image_view(&view_info, None) }.map_err(GpuError::from)
        })
        .collect()
}

unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let attachment = vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let color_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(slice::from_ref(&color_ref));

    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(slice::from_ref(&attachment))
        .subpasses(slice::from_ref(&subpass))
        .dependencies(slice::from_ref(&dependency));

    device
        .create_render_pass(&create_info, None)
        .map_err(GpuError::from)
}

unsafe fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    image_views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    image_views
        .iter()
        .map(|view| {
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(slice::from_ref(view))
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            // SAFETY: the render pass and views belong to this device.
            unsafe { device.create_framebuffer(&create_info, None) }.map_err(GpuError::from)
        })
        .collect()
}

/// Negotiate and build the full presentation chain, registering one
/// teardown per resource kind on the ledger before the next acquisition.
///
/// Returns the (possibly clamped) extent actually used.
///
/// # Safety
/// All handles must be valid; `slots` must be empty (first attachment).
#[allow(clippy::too_many_arguments)]
pub unsafe fn initialize_present_targets(
    device: &ash::Device,
    swapchain_loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    support: &SurfaceSupport,
    supports_present: impl Fn(u32) -> bool,
    mut config: SwapchainConfig,
    slots: &Arc<Mutex<PresentSlots>>,
    ledger: &mut ResourceLedger,
) -> Result<vk::Extent2D> {
    validate_config(
        &mut config,
        &support.capabilities,
        &support.formats,
        supports_present,
        true,
    )?;

    let swapchain = create_swapchain(swapchain_loader, surface, &config)?;
    {
        let mut locked = slots.lock();
        locked.swapchain = swapchain;
        locked.format = config.format;
        locked.extent = config.extent;
    }
    {
        let slots = Arc::clone(slots);
        let loader = swapchain_loader.clone();
        ledger.push("swapchain", move || {
            let handle = std::mem::take(&mut slots.lock().swapchain);
            if handle != vk::SwapchainKHR::null() {
                unsafe { loader.destroy_swapchain(handle, None) };
            }
            Ok(())
        });
    }

    let images = swapchain_loader.get_swapchain_images(swapchain)?;
    tracing::info!(
        "swapchain created: {}x{} ({} images)",
        config.extent.width,
        config.extent.height,
        images.len()
    );
    let image_views = create_image_views(device, &images, config.format)?;
    {
        let mut locked = slots.lock();
        locked.images = images;
        locked.image_views = image_views;
    }
    {
        let slots = Arc::clone(slots);
        let device = device.clone();
        ledger.push("swapchain image views", move || {
            for view in std::mem::take(&mut slots.lock().image_views) {
                unsafe { device.destroy_image_view(view, None) };
            }
            Ok(())
        });
    }

    let render_pass = create_render_pass(device, config.format)?;
    slots.lock().render_pass = render_pass;
    {
        let slots = Arc::clone(slots);
        let device = device.clone();
        ledger.push("render pass", move || {
            let handle = std::mem::take(&mut slots.lock().render_pass);
            if handle != vk::RenderPass::null() {
                unsafe { device.destroy_render_pass(handle, None) };
            }
            Ok(())
        });
    }

    let framebuffers = {
        let locked = slots.lock();
        create_framebuffers(device, render_pass, &locked.image_views, config.extent)?
    };
    slots.lock().framebuffers = framebuffers;
    {
        let slots = Arc::clone(slots);
        let device = device.clone();
        ledger.push("framebuffers", move || {
            for framebuffer in std::mem::take(&mut slots.lock().framebuffers) {
                unsafe { device.destroy_framebuffer(framebuffer, None) };
            }
            Ok(())
        });
    }

    Ok(config.extent)
}

/// Replace the presentation chain after a resize, passing the old
/// swapchain as a recreation hint. The ledger entries registered by
/// [`initialize_present_targets`] keep tearing down whatever the slots
/// currently hold, so no new entries are pushed here.
///
/// # Safety
/// The device must be idle and the old chain not in use.
pub unsafe fn recreate_present_targets(
    device: &ash::Device,
    swapchain_loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    support: &SurfaceSupport,
    supports_present: impl Fn(u32) -> bool,
    mut config: SwapchainConfig,
    slots: &Arc<Mutex<PresentSlots>>,
) -> Result<vk::Extent2D> {
    config.old_swapchain = slots.lock().swapchain;

    validate_config(
        &mut config,
        &support.capabilities,
        &support.formats,
        supports_present,
        true,
    )?;

    let swapchain = create_swapchain(swapchain_loader, surface, &config)?;

    // The new chain exists; release everything from the old one.
    let old = std::mem::take(&mut *slots.lock());
    for framebuffer in old.framebuffers {
        device.destroy_framebuffer(framebuffer, None);
    }
    if old.render_pass != vk::RenderPass::null() {
        device.destroy_render_pass(old.render_pass, None);
    }
    for view in old.image_views {
        device.destroy_image_view(view, None);
    }
    if old.swapchain != vk::SwapchainKHR::null() {
        swapchain_loader.destroy_swapchain(old.swapchain, None);
    }

    let images = swapchain_loader.get_swapchain_images(swapchain)?;
    let image_views = create_image_views(device, &images, config.format)?;
    let render_pass = create_render_pass(device, config.format)?;
    let framebuffers = create_framebuffers(device, render_pass, &image_views, config.extent)?;

    {
        let mut locked = slots.lock();
        locked.swapchain = swapchain;
        locked.images = images;
        locked.image_views = image_views;
        locked.render_pass = render_pass;
        locked.framebuffers = framebuffers;
        locked.format = config.format;
        locked.extent = config.extent;
    }

    tracing::info!(
        "swapchain recreated: {}x{}",
        config.extent.width,
        config.extent.height
    );

    Ok(config.extent)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    fn capabilities() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            ..Default::default()
        }
    }

    fn config(width: u32, height: u32) -> SwapchainConfig {
        SwapchainConfig::request(
            FORMAT,
            vk::PresentModeKHR::FIFO,
            vk::Extent2D { width, height },
            2,
            0,
        )
    }

    #[test]
    fn image_count_is_clamped_into_reported_range() {
        let mut caps = capabilities();
        caps.max_image_count = 2;
        // Triple buffering degrades to the surface maximum instead of
        // failing negotiation outright.
        assert_eq!(clamp_image_count(3, &caps), 2);
        assert_eq!(clamp_image_count(1, &caps), 2);
    }

    #[test]
    fn image_count_passes_through_with_unbounded_maximum() {
        let mut caps = capabilities();
        caps.max_image_count = 0;
        assert_eq!(clamp_image_count(3, &caps), 3);
    }

    #[test]
    fn oversized_extent_is_clamped_when_fixing() {
        let mut config = config(4000, 4000);
        validate_config(&mut config, &capabilities(), &[FORMAT], |_| true, true).unwrap();
        assert_eq!(config.extent.width, 1920);
        assert_eq!(config.extent.height, 1080);
    }

    #[test]
    fn oversized_extent_fails_without_fixing() {
        let mut config = config(4000, 4000);
        let err =
            validate_config(&mut config, &capabilities(), &[FORMAT], |_| true, false).unwrap_err();
        assert!(matches!(err, GpuError::SwapchainValidation(_)));
        // Extent left unmodified.
        assert_eq!(config.extent.width, 4000);
    }

    #[test]
    fn unsupported_format_pair_always_fails() {
        let mut config = config(800, 600);
        config.color_space = vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT;
        let err =
            validate_config(&mut config, &capabilities(), &[FORMAT], |_| true, true).unwrap_err();
        assert!(matches!(err, GpuError::SwapchainValidation(_)));
    }

    #[test]
    fn family_without_present_support_fails_fast() {
        let mut config = config(800, 600);
        config.queue_family_indices = vec![0, 1];
        let err = validate_config(&mut config, &capabilities(), &[FORMAT], |f| f != 1, true)
            .unwrap_err();
        assert!(matches!(err, GpuError::SwapchainValidation(_)));
    }

    #[test]
    fn inherit_pre_transform_resolves_to_current() {
        let mut caps = capabilities();
        caps.supported_transforms =
            vk::SurfaceTransformFlagsKHR::IDENTITY | vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;

        let mut config = config(800, 600);
        assert_eq!(config.pre_transform, vk::SurfaceTransformFlagsKHR::INHERIT);
        validate_config(&mut config, &caps, &[FORMAT], |_| true, true).unwrap();
        assert_eq!(config.pre_transform, vk::SurfaceTransformFlagsKHR::ROTATE_90);
    }

    #[test]
    fn image_count_outside_bounds_fails() {
        let mut config = config(800, 600);
        config.min_image_count = 1;
        let err =
            validate_config(&mut config, &capabilities(), &[FORMAT], |_| true, true).unwrap_err();
        assert!(matches!(err, GpuError::SwapchainValidation(_)));
    }

    #[test]
    fn zero_max_image_count_is_unbounded() {
        let mut caps = capabilities();
        caps.max_image_count = 0;

        let mut config = config(800, 600);
        config.min_image_count = 64;
        validate_config(&mut config, &caps, &[FORMAT], |_| true, true).unwrap();
    }

    #[test]
    fn unsupported_usage_fails() {
        let mut config = config(800, 600);
        config.usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::STORAGE;
        let err =
            validate_config(&mut config, &capabilities(), &[FORMAT], |_| true, true).unwrap_err();
        assert!(matches!(err, GpuError::SwapchainValidation(_)));
    }

    #[test]
    fn valid_request_passes_unmodified() {
        let mut config = config(1280, 720);
        validate_config(&mut config, &capabilities(), &[FORMAT], |_| true, true).unwrap();
        assert_eq!(config.extent.width, 1280);
        assert_eq!(config.extent.height, 720);
        assert_eq!(config.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }
}
