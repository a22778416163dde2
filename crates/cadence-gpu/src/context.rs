//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result, VkResultExt};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
///
/// The allocator sits behind a mutex: per-frame uploads happen on the frame
/// thread, but long-lived allocations (textures, staging) may come from
/// asset-loading tasks.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,

    pub(crate) graphics_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the graphics queue (also used for presentation).
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("vkDeviceWaitIdle")
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            // This frees all VkDeviceMemory allocations
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Cadence".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        let (physical_device, capabilities) = unsafe { select_physical_device(&instance) }?;

        tracing::info!("Selected GPU: {}", capabilities.summary());

        let graphics_queue_family = unsafe { find_graphics_queue_family(&instance, physical_device) }?;

        let (device, graphics_queue) =
            unsafe { create_device(&instance, physical_device, graphics_queue_family)? };

        let device = Arc::new(device);

        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;

        Ok(GpuContext {
            entry,
            instance,
            physical_device,
            device,
            capabilities,
            allocator: Mutex::new(allocator),
            graphics_queue_family,
            graphics_queue,
        })
    }
}

/// Find the first queue family with graphics support.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    instance
        .get_physical_device_queue_family_properties(physical_device)
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Create the logical device and retrieve the graphics queue.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
) -> Result<(ash::Device, vk::Queue)> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let extension_names = [ash::khr::swapchain::NAME.as_ptr()];

    let features = vk::PhysicalDeviceFeatures::default();

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .context("vkCreateDevice")?;

    let graphics_queue = device.get_device_queue(graphics_queue_family, 0);

    Ok((device, graphics_queue))
}
