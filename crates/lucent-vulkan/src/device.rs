//! Logical device creation.

use ash::vk;

use crate::error::{GpuError, Result};
use crate::instance::{pick_device_extensions, CapabilityRequest};
use crate::queue::QueueSelector;

/// A logical device with its general-purpose queue.
pub struct LogicalDevice {
    pub device: ash::Device,
    pub queue_family: u32,
    pub queue: vk::Queue,
}

/// The flags every device created here must serve from one family.
pub fn general_queue_flags() -> vk::QueueFlags {
    vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER
}

/// Create a logical device on the family the selector scores highest for
/// graphics, compute, and transfer work.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    selector: &mut QueueSelector,
    requests: &[CapabilityRequest],
) -> Result<LogicalDevice> {
    let requested = general_queue_flags();
    let selected = selector
        .select_on_device(instance, physical_device, requested)
        .ok_or(GpuError::NoSuitableQueue(requested))?;

    tracing::debug!(
        family = selected.family_index,
        score = selected.score,
        "queue family selected"
    );

    let queue_priorities = [1.0f32];
    let queue_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(selected.family_index)
        .queue_priorities(&queue_priorities);

    let extensions = pick_device_extensions(instance, physical_device, requests)?;
    let extension_ptrs: Vec<*const std::ffi::c_char> =
        extensions.iter().map(|name| name.as_ptr()).collect();

    let features = vk::PhysicalDeviceFeatures::default();
    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_info))
        .enabled_extension_names(&extension_ptrs)
        .enabled_features(&features);

    let device = instance.create_device(physical_device, &create_info, None)?;
    let queue = device.get_device_queue(selected.family_index, 0);

    Ok(LogicalDevice {
        device,
        queue_family: selected.family_index,
        queue,
    })
}

/// Create a command pool whose buffers can be individually reset.
///
/// # Safety
/// The device must be valid and `queue_family` one of its families.
pub unsafe fn create_command_pool(
    device: &ash::Device,
    queue_family: u32,
) -> Result<vk::CommandPool> {
    let create_info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family);

    device
        .create_command_pool(&create_info, None)
        .map_err(GpuError::from)
}
