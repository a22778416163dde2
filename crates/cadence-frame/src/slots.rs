//! The per-frame buffer set: N parallel copies of everything a frame owns.

use ash::vk;
use cadence_core::{CoordinateSpace, MAX_FRAMES_IN_FLIGHT};
use cadence_gpu::Result;

use crate::device::FrameDevice;

/// Resources owned by one frame slot.
pub struct FrameSlot<D: FrameDevice> {
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by the presentation engine when the acquired image is ready.
    pub image_available: vk::Semaphore,
    /// Signaled by the queue when this slot's commands finished.
    pub render_finished: vk::Semaphore,
    /// Signaled when all GPU work of the slot's last submission completed.
    pub fence: vk::Fence,
    /// Host-coherent copy of the coordinate space for this slot.
    pub uniform: D::Buffer,
    /// Set 0, pointing at `uniform`.
    pub descriptor_set: vk::DescriptorSet,
}

impl<D: FrameDevice> FrameSlot<D> {
    /// Create a slot. On failure the handles created so far are released.
    fn new(device: &D, index: usize) -> Result<Self> {
        let uniform = device.create_host_buffer(
            CoordinateSpace::SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            &format!("coordinate space {index}"),
        )?;
        let mut slot = Self {
            command_buffer: vk::CommandBuffer::null(),
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            fence: vk::Fence::null(),
            uniform,
            descriptor_set: vk::DescriptorSet::null(),
        };

        if let Err(e) = slot.create_handles(device) {
            if let Err(cleanup) = slot.destroy(device) {
                tracing::warn!(slot = index, "Failed to release partial frame slot: {cleanup}");
            }
            return Err(e);
        }
        Ok(slot)
    }

    fn create_handles(&mut self, device: &D) -> Result<()> {
        self.descriptor_set = device.create_uniform_descriptor(&self.uniform, CoordinateSpace::SIZE)?;
        self.command_buffer = device.allocate_command_buffer()?;
        self.image_available = device.create_semaphore()?;
        self.render_finished = device.create_semaphore()?;
        // Signaled so the first wait on every slot returns immediately
        self.fence = device.create_fence(true)?;
        Ok(())
    }

    /// Release every handle that was created. Null handles are skipped.
    fn destroy(self, device: &D) -> Result<()> {
        if self.fence != vk::Fence::null() {
            device.destroy_fence(self.fence);
        }
        for semaphore in [self.render_finished, self.image_available] {
            if semaphore != vk::Semaphore::null() {
                device.destroy_semaphore(semaphore);
            }
        }
        if self.command_buffer != vk::CommandBuffer::null() {
            device.free_command_buffer(self.command_buffer);
        }
        let freed = if self.descriptor_set == vk::DescriptorSet::null() {
            Ok(())
        } else {
            device.free_descriptor_set(self.descriptor_set)
        };
        let destroyed = device.destroy_buffer(self.uniform);
        freed.and(destroyed)
    }
}

/// Fixed array of [`MAX_FRAMES_IN_FLIGHT`] frame slots.
///
/// Created once with the scheduler and destroyed together, after every fence
/// has been waited on.
pub struct FrameSlots<D: FrameDevice> {
    slots: Vec<FrameSlot<D>>,
}

impl<D: FrameDevice> FrameSlots<D> {
    /// Allocate all slots. On failure the slots created so far are released.
    pub fn new(device: &D) -> Result<Self> {
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for index in 0..MAX_FRAMES_IN_FLIGHT {
            match FrameSlot::new(device, index) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    if let Err(cleanup) = (Self { slots }).destroy(device) {
                        tracing::warn!("Failed to release frame slots: {cleanup}");
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self { slots })
    }

    /// Number of slots (always N).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot `index`. Panics if `index >= N`.
    pub fn get(&self, index: usize) -> &FrameSlot<D> {
        &self.slots[index]
    }

    /// Every slot's fence, in slot order.
    pub fn fences(&self) -> Vec<vk::Fence> {
        self.slots.iter().map(|slot| slot.fence).collect()
    }

    /// Release every slot. The caller has waited on every fence a
    /// submission will still signal.
    pub fn destroy(self, device: &D) -> Result<()> {
        let mut first_error = None;
        for slot in self.slots {
            if let Err(e) = slot.destroy(device) {
                tracing::warn!("Failed to release frame slot: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<D: FrameDevice> std::ops::Index<usize> for FrameSlots<D> {
    type Output = FrameSlot<D>;

    fn index(&self, index: usize) -> &FrameSlot<D> {
        &self.slots[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SimDevice, SimFault};
    use cadence_gpu::GpuError;

    fn assert_nothing_live(sim: &SimDevice) {
        assert_eq!(sim.live_sync_objects(), 0);
        assert_eq!(sim.live_buffers(), 0);
        assert_eq!(sim.live_descriptor_sets(), 0);
    }

    #[test]
    fn slots_start_signaled() {
        let sim = SimDevice::new();
        let slots = FrameSlots::new(&sim).unwrap();

        assert_eq!(slots.len(), MAX_FRAMES_IN_FLIGHT);
        for fence in slots.fences() {
            assert!(sim.fence_signaled(fence).unwrap());
        }
        slots.destroy(&sim).unwrap();
        assert_nothing_live(&sim);
    }

    #[test]
    fn creation_failure_releases_what_was_created() {
        let faults = [
            SimFault::CreateHostBuffer,
            SimFault::CreateUniformDescriptor,
            SimFault::AllocateCommandBuffer,
            SimFault::CreateSemaphore,
            SimFault::CreateFence,
        ];
        for fault in faults {
            // First slot, then partway into the second
            for succeed_first in [0, 1] {
                let sim = SimDevice::new();
                sim.fail_call(fault, succeed_first);

                let result = FrameSlots::new(&sim);
                assert!(
                    matches!(result, Err(GpuError::Call { .. })),
                    "{fault:?} after {succeed_first}"
                );
                assert_nothing_live(&sim);
                assert!(sim.violations().is_empty());
            }
        }
    }
}
