//! GPU memory management.
//!
//! Individual buffers and images are sub-allocated out of larger device
//! memory blocks by `gpu-allocator`, which pools blocks per memory type.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Live allocation counters, useful for leak checks at shutdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocationStats {
    /// Buffers currently allocated.
    pub buffers: u32,
    /// Images currently allocated.
    pub images: u32,
    /// Bytes requested by live allocations.
    pub bytes: u64,
}

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
    stats: AllocationStats,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
            stats: AllocationStats::default(),
        })
    }

    /// Current allocation counters.
    pub fn stats(&self) -> AllocationStats {
        self.stats
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator not initialized".to_string()))
    }

    /// Allocate a buffer.
    ///
    /// `CpuToGpu` buffers stay persistently mapped. If no memory type
    /// satisfies `location` the call fails with `AllocationFailed`.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .context("vkCreateBuffer")?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocated = self.inner()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(GpuError::AllocationFailed(format!("{name}: {e}")));
            }
        };

        unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .context("vkBindBufferMemory")?;
        }

        self.stats.buffers += 1;
        self.stats.bytes += size;

        Ok(GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
        })
    }

    /// Free a buffer allocation.
    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        if let Some(allocation) = buffer.allocation.take() {
            self.inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
            self.stats.buffers = self.stats.buffers.saturating_sub(1);
            self.stats.bytes = self.stats.bytes.saturating_sub(buffer.size);
        }

        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
        }
        buffer.buffer = vk::Buffer::null();

        Ok(())
    }

    /// Allocate an image.
    pub fn create_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        let image =
            unsafe { self.device.create_image(create_info, None) }.context("vkCreateImage")?;

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocated = self.inner()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(GpuError::AllocationFailed(format!("{name}: {e}")));
            }
        };

        unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .context("vkBindImageMemory")?;
        }

        self.stats.images += 1;
        self.stats.bytes += requirements.size;

        Ok(GpuImage {
            image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
        })
    }

    /// Free an image allocation.
    pub fn free_image(&mut self, image: &mut GpuImage) -> Result<()> {
        if let Some(allocation) = image.allocation.take() {
            let size = allocation.size();
            self.inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
            self.stats.images = self.stats.images.saturating_sub(1);
            self.stats.bytes = self.stats.bytes.saturating_sub(size);
        }

        unsafe {
            self.device.destroy_image(image.image, None);
        }
        image.image = vk::Image::null();

        Ok(())
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&mut self) {
        if self.allocator.is_none() {
            return;
        }
        if self.stats.buffers > 0 || self.stats.images > 0 {
            tracing::warn!(
                buffers = self.stats.buffers,
                images = self.stats.images,
                "GPU allocations still live at allocator shutdown"
            );
        }
        // gpu_allocator::Allocator's Drop calls vkFreeMemory
        drop(self.allocator.take());
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A GPU buffer with its allocation.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
}

impl GpuBuffer {
    /// Pointer to the persistent host mapping, if the memory is host-visible.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Write raw bytes to the buffer at the given offset (must be host-visible).
    ///
    /// Host-coherent memory needs no flush afterwards.
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(format!(
                "Write of {} bytes at {offset} exceeds buffer size {}",
                data.len(),
                self.size
            )));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }

        Ok(())
    }
}

/// A GPU image with its allocation.
pub struct GpuImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}
