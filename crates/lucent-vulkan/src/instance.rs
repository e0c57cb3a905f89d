//! Vulkan instance creation and physical-device selection.

use std::ffi::{c_char, CStr, CString};

use ash::vk;

use crate::error::{GpuError, Result};

/// What a [`CapabilityRequest`] asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Layer,
    InstanceExtension,
    DeviceExtension,
}

/// A layer or extension the application wants enabled.
///
/// Optional requests are enabled when present and logged when absent;
/// required requests fail instance/device creation when absent.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRequest {
    pub kind: CapabilityKind,
    pub name: &'static CStr,
    pub required: bool,
}

/// The standard request set for presenting to a window.
pub fn common_requests() -> Vec<CapabilityRequest> {
    let mut requests = vec![
        CapabilityRequest {
            kind: CapabilityKind::Layer,
            name: c"VK_LAYER_KHRONOS_validation",
            required: false,
        },
        CapabilityRequest {
            kind: CapabilityKind::InstanceExtension,
            name: ash::khr::surface::NAME,
            required: true,
        },
        CapabilityRequest {
            kind: CapabilityKind::DeviceExtension,
            name: ash::khr::swapchain::NAME,
            required: true,
        },
    ];

    #[cfg(target_os = "windows")]
    requests.push(CapabilityRequest {
        kind: CapabilityKind::InstanceExtension,
        name: ash::khr::win32_surface::NAME,
        required: true,
    });
    #[cfg(target_os = "linux")]
    requests.extend([
        CapabilityRequest {
            kind: CapabilityKind::InstanceExtension,
            name: ash::khr::xlib_surface::NAME,
            required: false,
        },
        CapabilityRequest {
            kind: CapabilityKind::InstanceExtension,
            name: ash::khr::wayland_surface::NAME,
            required: false,
        },
    ]);
    #[cfg(target_os = "macos")]
    requests.extend([
        CapabilityRequest {
            kind: CapabilityKind::InstanceExtension,
            name: ash::ext::metal_surface::NAME,
            required: true,
        },
        CapabilityRequest {
            kind: CapabilityKind::InstanceExtension,
            name: ash::khr::portability_enumeration::NAME,
            required: true,
        },
    ]);

    requests
}

/// Filter `requests` of `kind` against the names the implementation
/// reports.
///
/// Returns the names to enable; a required request absent from
/// `available` raises [`GpuError::MissingCapability`] with the
/// capability name.
pub fn pick_supported(
    requests: &[CapabilityRequest],
    kind: CapabilityKind,
    available: &[String],
) -> Result<Vec<&'static CStr>> {
    let mut picked = Vec::new();
    for request in requests.iter().filter(|r| r.kind == kind) {
        let name = request.name.to_string_lossy();
        let present = available.iter().any(|a| a.as_str() == name);
        if present {
            picked.push(request.name);
        } else if request.required {
            return Err(GpuError::MissingCapability(name.into_owned()));
        } else {
            tracing::warn!("optional capability {name} not available, skipping");
        }
    }
    Ok(picked)
}

pub(crate) fn name_from_raw(raw: &[c_char]) -> String {
    // SAFETY: Vulkan property name arrays are NUL-terminated.
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Create a Vulkan instance with the requested layers and extensions.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    requests: &[CapabilityRequest],
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|_| GpuError::InvalidState("application name contains NUL".to_string()))?;
    let engine_name = c"Lucent";

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(engine_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_1);

    let available_layers: Vec<String> = entry
        .enumerate_instance_layer_properties()?
        .iter()
        .map(|props| name_from_raw(&props.layer_name))
        .collect();
    let layers = pick_supported(requests, CapabilityKind::Layer, &available_layers)?;
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    let available_extensions: Vec<String> = entry
        .enumerate_instance_extension_properties(None)?
        .iter()
        .map(|props| name_from_raw(&props.extension_name))
        .collect();
    let extensions = pick_supported(
        requests,
        CapabilityKind::InstanceExtension,
        &available_extensions,
    )?;
    let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_names)
        .enabled_extension_names(&extension_names)
        .flags(create_flags);

    let instance = entry.create_instance(&create_info, None)?;

    Ok(instance)
}

/// Pick the device extensions to enable for a physical device.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn pick_device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    requests: &[CapabilityRequest],
) -> Result<Vec<&'static CStr>> {
    let available: Vec<String> = instance
        .enumerate_device_extension_properties(physical_device)?
        .iter()
        .map(|props| name_from_raw(&props.extension_name))
        .collect();
    pick_supported(requests, CapabilityKind::DeviceExtension, &available)
}

/// Select the best physical device.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    let devices = instance.enumerate_physical_devices()?;

    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice);
    }

    let mut best_device = None;
    let mut best_score = 0i32;

    for device in devices {
        let score = score_physical_device(instance, device);
        if score > best_score {
            best_score = score;
            best_device = Some(device);
        }
    }

    best_device.ok_or(GpuError::NoSuitableDevice)
}

/// Score a physical device for selection.
unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i32 {
    let properties = instance.get_physical_device_properties(device);

    let mut score = 0;

    // Prefer discrete GPUs
    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => score += 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => score += 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => score += 50,
        _ => score += 1,
    }

    // Prefer more VRAM
    let memory = instance.get_physical_device_memory_properties(device);
    let vram_mb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size / (1024 * 1024))
        .sum();
    score += (vram_mb / 1024) as i32; // +1 per GB

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requests() -> Vec<CapabilityRequest> {
        vec![
            CapabilityRequest {
                kind: CapabilityKind::Layer,
                name: c"VK_LAYER_KHRONOS_validation",
                required: false,
            },
            CapabilityRequest {
                kind: CapabilityKind::InstanceExtension,
                name: c"VK_KHR_surface",
                required: true,
            },
            CapabilityRequest {
                kind: CapabilityKind::DeviceExtension,
                name: c"VK_KHR_swapchain",
                required: true,
            },
        ]
    }

    #[test]
    fn picks_only_matching_kind() {
        let available = vec!["VK_KHR_surface".to_string(), "VK_KHR_swapchain".to_string()];
        let picked =
            pick_supported(&requests(), CapabilityKind::InstanceExtension, &available).unwrap();
        assert_eq!(picked, vec![c"VK_KHR_surface"]);
    }

    #[test]
    fn missing_required_capability_is_named() {
        let err = pick_supported(&requests(), CapabilityKind::InstanceExtension, &[]).unwrap_err();
        match err {
            GpuError::MissingCapability(name) => assert_eq!(name, "VK_KHR_surface"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_optional_capability_is_skipped() {
        let picked = pick_supported(&requests(), CapabilityKind::Layer, &[]).unwrap();
        assert!(picked.is_empty());
    }

    #[test]
    fn common_requests_mark_swapchain_required() {
        let requests = common_requests();
        let swapchain = requests
            .iter()
            .find(|r| r.kind == CapabilityKind::DeviceExtension)
            .unwrap();
        assert_eq!(swapchain.name, ash::khr::swapchain::NAME);
        assert!(swapchain.required);
    }
}
