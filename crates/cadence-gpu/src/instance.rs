//! Vulkan instance creation and physical device selection.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;
use std::ffi::{CStr, CString};

/// Required instance extensions for presenting to a window.
pub fn required_instance_extensions() -> Vec<&'static CStr> {
    let extensions = vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_enumeration::NAME,
    ];

    extensions
}

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Cadence")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_2);

    let extension_names: Vec<*const i8> = required_instance_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let requested = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    // Missing layers are skipped rather than failing instance creation
    let available_layers = entry
        .enumerate_instance_layer_properties()
        .context("vkEnumerateInstanceLayerProperties")?;
    let layers: Vec<&CStr> = requested
        .into_iter()
        .filter(|layer| {
            let found = available_layers
                .iter()
                .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == *layer);
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect();

    let layer_names: Vec<*const i8> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    entry
        .create_instance(&create_info, None)
        .context("vkCreateInstance")
}

/// Select the best physical device that meets the renderer's requirements.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
) -> Result<(vk::PhysicalDevice, GpuCapabilities)> {
    let devices = instance
        .enumerate_physical_devices()
        .context("vkEnumeratePhysicalDevices")?;

    devices
        .into_iter()
        .map(|device| (device, GpuCapabilities::query(instance, device)))
        .filter(|(_, caps)| {
            let ok = caps.meets_requirements();
            if !ok {
                tracing::debug!("Skipping unsuitable GPU: {}", caps.summary());
            }
            ok
        })
        .max_by_key(|(_, caps)| score_device(caps))
        .ok_or(GpuError::NoSuitableDevice)
}

/// Score a device that already meets requirements.
fn score_device(caps: &GpuCapabilities) -> u64 {
    let type_score = match caps.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    };

    // +1 per GB of VRAM
    type_score + caps.device_local_memory_mb / 1024
}
