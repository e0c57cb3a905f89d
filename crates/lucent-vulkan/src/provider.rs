//! The Vulkan implementation of the `lucent-graphics` trait set.
//!
//! Ownership follows the ledger discipline: every Vulkan handle acquired
//! here registers its release on the caller's [`ResourceLedger`] at the
//! acquisition site. No type in this module implements `Drop` for a GPU
//! handle.

use std::any::Any;
use std::sync::Arc;

use ash::vk;
use lucent_core::ResourceLedger;
use lucent_graphics::{
    Color, DeviceLayout, GpuCommandBuffer, GpuDevice, GpuFrame, GpuInstance, GpuProvider,
    GraphicsError, PresentationTarget, SurfaceExtent, SwapchainLayout, VsyncMode,
};
use parking_lot::Mutex;

use crate::device::{create_command_pool, create_logical_device, general_queue_flags};
use crate::error::GpuError;
use crate::instance::{self, name_from_raw, CapabilityRequest};
use crate::queue::QueueSelector;
use crate::surface::{select_present_mode, select_surface_format, SurfaceContext};
use crate::swapchain::{
    clamp_image_count, initialize_present_targets, recreate_present_targets, PresentSlots,
    SwapchainConfig,
};
use crate::sync::{wait_for_fence, FrameSync};

/// Entry point for Vulkan-backed rendering.
#[derive(Debug, Default)]
pub struct VulkanProvider;

impl VulkanProvider {
    pub fn new() -> Self {
        Self
    }
}

impl GpuProvider for VulkanProvider {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn is_supported(&self) -> bool {
        // SAFETY: loading the Vulkan library has no preconditions.
        unsafe { ash::Entry::load().is_ok() }
    }

    fn create_instance(
        &self,
        ledger: &mut ResourceLedger,
    ) -> lucent_graphics::Result<Box<dyn GpuInstance>> {
        // SAFETY: no Vulkan calls have been made yet.
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GraphicsError::from(GpuError::Loading(e.to_string())))?;

        let requests = instance::common_requests();
        // SAFETY: entry is a freshly loaded, valid entry point.
        let instance = unsafe { instance::create_instance(&entry, "Lucent", &requests) }
            .map_err(GraphicsError::from)?;
        tracing::info!("Vulkan instance created");

        {
            let instance = instance.clone();
            ledger.push("vulkan instance", move || {
                // SAFETY: ledger order guarantees all child objects are
                // already released.
                unsafe { instance.destroy_instance(None) };
                Ok(())
            });
        }

        Ok(Box::new(VulkanInstance {
            entry,
            instance,
            requests,
            selector: Mutex::new(QueueSelector::new()),
        }))
    }
}

/// A live Vulkan instance with its capability requests and the queue
/// selector shared across layout queries and device creation.
pub struct VulkanInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    requests: Vec<CapabilityRequest>,
    selector: Mutex<QueueSelector>,
}

impl VulkanInstance {
    /// Whether a physical device exists whose best queue family covers
    /// graphics, compute, and transfer in one.
    fn find_capable_device(&self) -> Option<vk::PhysicalDevice> {
        // SAFETY: the instance is valid for the lifetime of self.
        let physical_device = unsafe { instance::select_physical_device(&self.instance) }.ok()?;
        let selected = unsafe {
            self.selector.lock().select_on_device(
                &self.instance,
                physical_device,
                general_queue_flags(),
            )
        };
        selected.map(|_| physical_device)
    }
}

impl GpuInstance for VulkanInstance {
    fn supports_layout(&self, layout: DeviceLayout) -> bool {
        match layout {
            // Both topologies run on any general-purpose queue family.
            DeviceLayout::SimpleForward | DeviceLayout::SimpleDeferred => {
                self.find_capable_device().is_some()
            }
        }
    }

    fn create_device(
        &self,
        layout: DeviceLayout,
        ledger: &mut ResourceLedger,
    ) -> lucent_graphics::Result<Box<dyn GpuDevice>> {
        // Re-validated here even though callers are documented to check
        // first.
        if !self.supports_layout(layout) {
            return Err(GraphicsError::UnsupportedConfiguration(format!(
                "device layout {layout:?} is not realizable"
            )));
        }

        // SAFETY: the instance is valid.
        let physical_device = unsafe { instance::select_physical_device(&self.instance) }
            .map_err(GraphicsError::from)?;
        // SAFETY: physical_device is an enumerated, valid handle.
        let properties = unsafe { self.instance.get_physical_device_properties(physical_device) };
        tracing::info!(
            layout = ?layout,
            "creating device on {}",
            name_from_raw(&properties.device_name)
        );

        let mut selector = self.selector.lock();
        // SAFETY: both handles are valid.
        let logical = unsafe {
            create_logical_device(
                &self.instance,
                physical_device,
                &mut selector,
                &self.requests,
            )
        }
        .map_err(GraphicsError::from)?;
        drop(selector);

        {
            let device = logical.device.clone();
            ledger.push("logical device", move || {
                // SAFETY: everything created from the device tears down
                // earlier on the ledger.
                unsafe { device.destroy_device(None) };
                Ok(())
            });
        }

        // SAFETY: the device is valid and the family index is its own.
        let command_pool = unsafe { create_command_pool(&logical.device, logical.queue_family) }
            .map_err(GraphicsError::from)?;
        {
            let device = logical.device.clone();
            ledger.push("command pool", move || {
                unsafe { device.destroy_command_pool(command_pool, None) };
                Ok(())
            });
        }

        // SAFETY: the device is valid.
        let sync = unsafe { FrameSync::new(&logical.device) }.map_err(GraphicsError::from)?;
        {
            let device = logical.device.clone();
            ledger.push("frame sync", move || {
                unsafe { sync.destroy(&device) };
                Ok(())
            });
        }

        let swapchain_loader =
            ash::khr::swapchain::Device::new(&self.instance, &logical.device);

        let shared = Arc::new(DeviceShared {
            entry: self.entry.clone(),
            instance: self.instance.clone(),
            physical_device,
            device: logical.device,
            queue_family: logical.queue_family,
            queue: logical.queue,
            command_pool,
            swapchain_loader,
            sync,
            surface: Mutex::new(None),
            slots: Arc::new(Mutex::new(PresentSlots::default())),
            negotiated: Mutex::new(None),
            frame_open: Mutex::new(false),
        });

        Ok(Box::new(VulkanDevice { shared }))
    }
}

/// State shared between the device and its command buffers.
struct DeviceShared {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    swapchain_loader: ash::khr::swapchain::Device,
    sync: FrameSync,
    surface: Mutex<Option<SurfaceContext>>,
    slots: Arc<Mutex<PresentSlots>>,
    /// Accepted configuration from the last negotiation, reused with a new
    /// extent on resize.
    negotiated: Mutex<Option<SwapchainConfig>>,
    frame_open: Mutex<bool>,
}

pub struct VulkanDevice {
    shared: Arc<DeviceShared>,
}

impl VulkanDevice {
    fn map_acquire_error(err: vk::Result) -> GpuError {
        match err {
            vk::Result::ERROR_OUT_OF_DATE_KHR => GpuError::SwapchainOutOfDate,
            other => GpuError::Vulkan(other),
        }
    }
}

impl GpuDevice for VulkanDevice {
    fn attach_presentation(
        &mut self,
        target: &dyn PresentationTarget,
        layout: &SwapchainLayout,
        extent: SurfaceExtent,
        ledger: &mut ResourceLedger,
    ) -> lucent_graphics::Result<()> {
        if self.shared.surface.lock().is_some() {
            return Err(GraphicsError::InvalidState(
                "presentation is already attached".to_string(),
            ));
        }

        let shared = &self.shared;
        // SAFETY: entry/instance are valid; the caller keeps the target
        // alive for the device's lifetime.
        let context = unsafe { SurfaceContext::new(&shared.entry, &shared.instance, target) }
            .map_err(GraphicsError::from)?;
        // SAFETY: the physical device was enumerated from this instance.
        let support = unsafe { context.query_support(shared.physical_device) }
            .map_err(GraphicsError::from)?;

        let surface_handle = context.surface;
        let surface_loader = context.surface_loader.clone();
        *shared.surface.lock() = Some(context);
        {
            let shared = Arc::clone(&self.shared);
            ledger.push("surface", move || {
                if let Some(context) = shared.surface.lock().take() {
                    // SAFETY: the swapchain tears down earlier on the
                    // ledger.
                    unsafe { context.destroy() };
                }
                Ok(())
            });
        }

        let vsync = layout.vsync_mode != VsyncMode::Off;
        let desired_images = match layout.vsync_mode {
            VsyncMode::TripleBuffer => 3,
            _ => 2,
        };
        let surface_format = select_surface_format(&support.formats);
        let present_mode = select_present_mode(&support.present_modes, vsync);
        let min_image_count = clamp_image_count(desired_images, &support.capabilities);

        let config = SwapchainConfig::request(
            surface_format,
            present_mode,
            vk::Extent2D {
                width: extent.width,
                height: extent.height,
            },
            min_image_count,
            shared.queue_family,
        );

        let physical_device = shared.physical_device;
        let supports_present = |family: u32| {
            // SAFETY: handles are valid for the duration of negotiation.
            unsafe {
                surface_loader
                    .get_physical_device_surface_support(physical_device, family, surface_handle)
            }
            .unwrap_or(false)
        };

        // SAFETY: all handles are valid and the slots are empty.
        let accepted_extent = unsafe {
            initialize_present_targets(
                &shared.device,
                &shared.swapchain_loader,
                surface_handle,
                &support,
                supports_present,
                config.clone(),
                &shared.slots,
                ledger,
            )
        }
        .map_err(GraphicsError::from)?;

        let mut accepted = config;
        accepted.extent = accepted_extent;
        accepted.pre_transform = vk::SurfaceTransformFlagsKHR::INHERIT;
        *shared.negotiated.lock() = Some(accepted);

        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> lucent_graphics::Result<()> {
        let shared = &self.shared;
        let mut config = shared
            .negotiated
            .lock()
            .clone()
            .ok_or_else(|| {
                GraphicsError::InvalidState("resize before presentation attach".to_string())
            })?;
        config.extent = vk::Extent2D { width, height };

        let surface_guard = shared.surface.lock();
        let context = surface_guard.as_ref().ok_or_else(|| {
            GraphicsError::InvalidState("resize before presentation attach".to_string())
        })?;

        // SAFETY: the device is valid; nothing is recorded between frames.
        unsafe { shared.device.device_wait_idle() }
            .map_err(|e| GraphicsError::from(GpuError::from(e)))?;

        // SAFETY: the physical device is valid.
        let support = unsafe { context.query_support(shared.physical_device) }
            .map_err(GraphicsError::from)?;

        let surface_handle = context.surface;
        let surface_loader = context.surface_loader.clone();
        let physical_device = shared.physical_device;
        let supports_present = |family: u32| {
            // SAFETY: handles are valid for the duration of negotiation.
            unsafe {
                surface_loader
                    .get_physical_device_surface_support(physical_device, family, surface_handle)
            }
            .unwrap_or(false)
        };

        // SAFETY: the device is idle and the old chain unused.
        let accepted_extent = unsafe {
            recreate_present_targets(
                &shared.device,
                &shared.swapchain_loader,
                surface_handle,
                &support,
                supports_present,
                config.clone(),
                &shared.slots,
            )
        }
        .map_err(GraphicsError::from)?;

        config.extent = accepted_extent;
        config.pre_transform = vk::SurfaceTransformFlagsKHR::INHERIT;
        config.old_swapchain = vk::SwapchainKHR::null();
        *shared.negotiated.lock() = Some(config);

        Ok(())
    }

    fn create_command_buffer(
        &mut self,
        ledger: &mut ResourceLedger,
    ) -> lucent_graphics::Result<Box<dyn GpuCommandBuffer>> {
        let shared = &self.shared;
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(shared.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        // SAFETY: the pool belongs to this device.
        let buffers = unsafe { shared.device.allocate_command_buffers(&allocate_info) }
            .map_err(|e| GraphicsError::from(GpuError::from(e)))?;
        let command_buffer = buffers[0];

        {
            let device = shared.device.clone();
            let command_pool = shared.command_pool;
            ledger.push("command buffer", move || {
                // The buffer may still be pending on the queue at shutdown;
                // everything popped after this entry relies on the idle too.
                // SAFETY: the device and pool outlive this entry on the
                // ledger.
                unsafe { device.device_wait_idle() }.map_err(|e| e.to_string())?;
                unsafe { device.free_command_buffers(command_pool, &[command_buffer]) };
                Ok(())
            });
        }

        Ok(Box::new(VulkanCommandBuffer {
            shared: Arc::clone(&self.shared),
            command_buffer,
            recording: false,
        }))
    }

    fn begin_frame(&mut self, blocking: bool) -> lucent_graphics::Result<Box<dyn GpuFrame>> {
        let shared = &self.shared;
        if !shared.slots.lock().is_attached() {
            return Err(GraphicsError::InvalidState(
                "begin_frame before presentation attach".to_string(),
            ));
        }
        {
            let mut open = shared.frame_open.lock();
            if *open {
                return Err(GraphicsError::InvalidState(
                    "begin_frame while a frame is already open".to_string(),
                ));
            }
            *open = true;
        }

        let begin = || -> crate::error::Result<u32> {
            // SAFETY: fence and device are valid.
            unsafe { wait_for_fence(&shared.device, shared.sync.in_flight, blocking) }?;

            let timeout = if blocking { u64::MAX } else { 0 };
            let swapchain = shared.slots.lock().swapchain;
            // SAFETY: the swapchain and semaphore are valid.
            let (image_index, suboptimal) = unsafe {
                shared.swapchain_loader.acquire_next_image(
                    swapchain,
                    timeout,
                    shared.sync.image_available,
                    vk::Fence::null(),
                )
            }
            .map_err(Self::map_acquire_error)?;
            if suboptimal {
                tracing::debug!("acquired image from suboptimal swapchain");
            }

            // SAFETY: the fence is not in use after the wait above.
            unsafe { shared.device.reset_fences(&[shared.sync.in_flight]) }?;

            Ok(image_index)
        };

        match begin() {
            Ok(image_index) => Ok(Box::new(VulkanFrame { image_index })),
            Err(err) => {
                *shared.frame_open.lock() = false;
                Err(GraphicsError::from(err))
            }
        }
    }

    fn end_frame(
        &mut self,
        frame: Box<dyn GpuFrame>,
        blocking: bool,
    ) -> lucent_graphics::Result<()> {
        let shared = &self.shared;
        let frame = frame
            .as_any()
            .downcast_ref::<VulkanFrame>()
            .ok_or_else(|| {
                GraphicsError::InvalidState("frame does not belong to this backend".to_string())
            })?;

        {
            let mut open = shared.frame_open.lock();
            if !*open {
                return Err(GraphicsError::InvalidState(
                    "end_frame without an open frame".to_string(),
                ));
            }
            *open = false;
        }

        let swapchain = shared.slots.lock().swapchain;
        let wait_semaphores = [shared.sync.render_finished];
        let swapchains = [swapchain];
        let image_indices = [frame.image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: the queue and swapchain are valid and the image was
        // acquired this frame.
        let present = unsafe { shared.swapchain_loader.queue_present(shared.queue, &present_info) };
        match present {
            Ok(suboptimal) => {
                if suboptimal {
                    tracing::debug!("presented to suboptimal swapchain");
                }
            }
            Err(err) => return Err(GraphicsError::from(Self::map_acquire_error(err))),
        }

        if blocking {
            // SAFETY: the fence was handed to the last submit.
            unsafe { wait_for_fence(&shared.device, shared.sync.in_flight, true) }
                .map_err(GraphicsError::from)?;
        }

        Ok(())
    }
}

pub struct VulkanCommandBuffer {
    shared: Arc<DeviceShared>,
    command_buffer: vk::CommandBuffer,
    recording: bool,
}

impl GpuCommandBuffer for VulkanCommandBuffer {
    fn reset(&mut self) -> lucent_graphics::Result<()> {
        let device = &self.shared.device;
        // SAFETY: the buffer came from a pool with individual reset.
        unsafe {
            device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(GpuError::from)
                .map_err(GraphicsError::from)?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(GpuError::from)
                .map_err(GraphicsError::from)?;
        }

        self.recording = true;
        Ok(())
    }

    fn clear(&mut self, frame: &dyn GpuFrame, color: Color) -> lucent_graphics::Result<()> {
        if !self.recording {
            return Err(GraphicsError::InvalidState(
                "clear recorded without a prior reset".to_string(),
            ));
        }
        let frame = frame
            .as_any()
            .downcast_ref::<VulkanFrame>()
            .ok_or_else(|| {
                GraphicsError::InvalidState("frame does not belong to this backend".to_string())
            })?;

        let slots = self.shared.slots.lock();
        let framebuffer = slots
            .framebuffers
            .get(frame.image_index as usize)
            .copied()
            .ok_or_else(|| {
                GraphicsError::InvalidState(format!(
                    "no framebuffer for image index {}",
                    frame.image_index
                ))
            })?;

        let clear_value = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: color.to_array(),
            },
        };
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(slots.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: slots.extent,
            })
            .clear_values(std::slice::from_ref(&clear_value));

        // SAFETY: the buffer is recording and all handles are valid. The
        // load op clears; no draw commands are needed.
        unsafe {
            self.shared.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
            self.shared.device.cmd_end_render_pass(self.command_buffer);
        }

        Ok(())
    }

    fn submit(&mut self) -> lucent_graphics::Result<()> {
        if !self.recording {
            return Err(GraphicsError::InvalidState(
                "submit without a prior reset".to_string(),
            ));
        }
        self.recording = false;

        let shared = &self.shared;
        // SAFETY: the buffer is in the recording state.
        unsafe { shared.device.end_command_buffer(self.command_buffer) }
            .map_err(|e| GraphicsError::from(GpuError::from(e)))?;

        let wait_semaphores = [shared.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [shared.sync.render_finished];
        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the queue is valid; the in-flight fence was reset by
        // begin_frame.
        unsafe {
            shared
                .device
                .queue_submit(shared.queue, &[submit_info], shared.sync.in_flight)
        }
        .map_err(|e| GraphicsError::from(GpuError::from(e)))?;

        Ok(())
    }
}

/// One acquired swapchain image.
pub struct VulkanFrame {
    pub image_index: u32,
}

impl GpuFrame for VulkanFrame {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
