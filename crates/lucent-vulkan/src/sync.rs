//! Frame synchronization primitives for a single frame in flight.

use ash::vk;

use crate::error::Result;

/// Synchronization objects for one frame in flight.
#[derive(Clone, Copy)]
pub struct FrameSync {
    /// Signaled when a swapchain image is ready for rendering.
    pub image_available: vk::Semaphore,
    /// Signaled when command buffer execution finishes.
    pub render_finished: vk::Semaphore,
    /// Signaled when the previous frame's work has completed on the GPU.
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// # Safety
    /// `device` must be a valid logical device.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let image_available = device.create_semaphore(&semaphore_info, None)?;
        let render_finished = device.create_semaphore(&semaphore_info, None)?;

        // Created signaled so the first frame does not wait forever.
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let in_flight = device.create_fence(&fence_info, None)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// # Safety
    /// No queue may still reference these objects.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_available, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_fence(self.in_flight, None);
    }
}

/// Wait for the in-flight fence. `blocking` waits indefinitely; otherwise
/// the fence is polled once and a timeout reported as an error.
///
/// # Safety
/// `fence` must belong to `device`.
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, blocking: bool) -> Result<()> {
    let timeout = if blocking { u64::MAX } else { 0 };
    device.wait_for_fences(&[fence], true, timeout)?;
    Ok(())
}
