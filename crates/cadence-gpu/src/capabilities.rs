//! GPU capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// Minimum Vulkan version the renderer records against.
pub const MIN_API_VERSION: u32 = vk::API_VERSION_1_1;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,
    /// Discrete, integrated, virtual or CPU device
    pub device_type: vk::PhysicalDeviceType,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Whether some memory type is both host-visible and host-coherent.
    ///
    /// Per-frame uniform and vertex rings are written through persistent
    /// mappings without explicit flushes, so this is required.
    pub has_host_coherent_memory: bool,

    /// Maximum descriptor sets bound at once
    pub max_bound_descriptor_sets: u32,
    /// Required alignment for uniform buffer offsets
    pub min_uniform_buffer_offset_alignment: u64,
    /// Maximum 2D image dimension (texture size limit)
    pub max_image_dimension_2d: u32,

    // Available extensions
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        let extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default();

        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let coherent =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let has_host_coherent_memory = memory_properties
            .memory_types
            .iter()
            .take(memory_properties.memory_type_count as usize)
            .any(|ty| ty.property_flags.contains(coherent));

        let limits = &properties.limits;

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_type: properties.device_type,
            device_local_memory_mb,
            has_host_coherent_memory,
            max_bound_descriptor_sets: limits.max_bound_descriptor_sets,
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            max_image_dimension_2d: limits.max_image_dimension2_d,
            available_extensions,
        }
    }

    /// Whether the device supports presenting through a swapchain.
    pub fn supports_swapchain(&self) -> bool {
        self.available_extensions
            .contains(ash::khr::swapchain::NAME.to_str().unwrap_or_default())
    }

    /// Check if the GPU meets minimum requirements for the renderer.
    pub fn meets_requirements(&self) -> bool {
        let api_major = vk::api_version_major(self.api_version);
        let api_minor = vk::api_version_minor(self.api_version);
        let min_major = vk::api_version_major(MIN_API_VERSION);
        let min_minor = vk::api_version_minor(MIN_API_VERSION);

        if (api_major, api_minor) < (min_major, min_minor) {
            return false;
        }

        if !self.supports_swapchain() || !self.has_host_coherent_memory {
            return false;
        }

        // Set 0 holds the coordinate space, set 1 the texture
        self.max_bound_descriptor_sets >= 2
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capable() -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Amd,
            device_name: "Test GPU".to_string(),
            api_version: vk::API_VERSION_1_2,
            driver_version: 0,
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            device_local_memory_mb: 4096,
            has_host_coherent_memory: true,
            max_bound_descriptor_sets: 8,
            min_uniform_buffer_offset_alignment: 256,
            max_image_dimension_2d: 16384,
            available_extensions: HashSet::from(["VK_KHR_swapchain".to_string()]),
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn requirements_met() {
        assert!(capable().meets_requirements());
    }

    #[test]
    fn requirements_reject_old_api() {
        let caps = GpuCapabilities {
            api_version: vk::API_VERSION_1_0,
            ..capable()
        };
        assert!(!caps.meets_requirements());
    }

    #[test]
    fn requirements_reject_missing_swapchain() {
        let caps = GpuCapabilities {
            available_extensions: HashSet::new(),
            ..capable()
        };
        assert!(!caps.supports_swapchain());
        assert!(!caps.meets_requirements());
    }

    #[test]
    fn requirements_reject_incoherent_memory() {
        let caps = GpuCapabilities {
            has_host_coherent_memory: false,
            ..capable()
        };
        assert!(!caps.meets_requirements());
    }
}
