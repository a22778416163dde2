//! Per-frame-slot GPU buffers for transient geometry.

use ash::vk;
use bytemuck::Pod;
use cadence_core::MAX_FRAMES_IN_FLIGHT;
use cadence_frame::FrameDevice;
use cadence_gpu::{GpuError, Result};

/// Smallest buffer a ring allocates.
const MIN_CAPACITY: u64 = 256;

/// One host-visible buffer per frame slot.
///
/// [`FrameRing::upload`] for slot `i` overwrites what slot `i` uploaded N
/// frames earlier. The scheduler only hands out slot `i` after its fence
/// signaled, so the GPU is done reading the old contents and an outgrown
/// buffer can be destroyed on the spot.
pub struct FrameRing<D: FrameDevice> {
    label: &'static str,
    usage: vk::BufferUsageFlags,
    buffers: [Option<D::Buffer>; MAX_FRAMES_IN_FLIGHT],
}

impl<D: FrameDevice> FrameRing<D> {
    pub fn new(label: &'static str, usage: vk::BufferUsageFlags) -> Self {
        Self {
            label,
            usage,
            buffers: std::array::from_fn(|_| None),
        }
    }

    /// Copy `bytes` into the buffer of `frame_index`, growing it to the next
    /// power of two if it is too small.
    pub fn upload(&mut self, device: &D, frame_index: usize, bytes: &[u8]) -> Result<&D::Buffer> {
        let needed = bytes.len() as u64;
        let slot = &mut self.buffers[frame_index];

        let buffer = match slot.take() {
            Some(buffer) if device.buffer_size(&buffer) >= needed => buffer,
            outgrown => {
                if let Some(old) = outgrown {
                    tracing::debug!(
                        label = self.label,
                        frame_index,
                        old = device.buffer_size(&old),
                        needed,
                        "Growing frame buffer"
                    );
                    device.destroy_buffer(old)?;
                }
                let capacity = needed.next_power_of_two().max(MIN_CAPACITY);
                let name = format!("{} {frame_index}", self.label);
                device.create_host_buffer(capacity, self.usage, &name)?
            }
        };

        let buffer = slot.insert(buffer);
        device.write_buffer(buffer, 0, bytes)?;
        Ok(buffer)
    }

    /// Buffer of `frame_index`, if one was uploaded.
    pub fn get(&self, frame_index: usize) -> Option<&D::Buffer> {
        self.buffers[frame_index].as_ref()
    }

    /// Capacity of the buffer of `frame_index`, 0 if none exists.
    pub fn capacity(&self, device: &D, frame_index: usize) -> u64 {
        self.get(frame_index)
            .map_or(0, |buffer| device.buffer_size(buffer))
    }

    /// Destroy every slot's buffer. The GPU must be idle.
    pub fn destroy(&mut self, device: &D) -> Result<()> {
        let mut first_error = None;
        for buffer in self.buffers.iter_mut().filter_map(Option::take) {
            if let Err(e) = device.destroy_buffer(buffer) {
                tracing::warn!(label = self.label, "Failed to destroy frame buffer: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Vertex and index rings of one drawing pipeline.
///
/// A slot's buffers hold one upload per frame: draws recorded earlier in
/// the frame read them when the GPU executes, so a second upload in the
/// same frame would change what those draws see. [`GeometryRings::claim`]
/// refuses it.
pub struct GeometryRings<D: FrameDevice> {
    vertices: FrameRing<D>,
    indices: FrameRing<D>,
    claimed_by: [Option<u64>; MAX_FRAMES_IN_FLIGHT],
}

impl<D: FrameDevice> GeometryRings<D> {
    pub fn new(vertex_label: &'static str, index_label: &'static str) -> Self {
        Self {
            vertices: FrameRing::new(vertex_label, vk::BufferUsageFlags::VERTEX_BUFFER),
            indices: FrameRing::new(index_label, vk::BufferUsageFlags::INDEX_BUFFER),
            claimed_by: [None; MAX_FRAMES_IN_FLIGHT],
        }
    }

    /// Reserve the buffers of `frame_index` for frame `frame_number`. Fails
    /// if that frame already claimed them.
    pub fn claim(&mut self, frame_index: usize, frame_number: u64) -> Result<()> {
        let claimed = &mut self.claimed_by[frame_index];
        if *claimed == Some(frame_number) {
            return Err(GpuError::InvalidState(format!(
                "{} already uploaded in frame {frame_number}; flush once per frame",
                self.vertices.label
            )));
        }
        *claimed = Some(frame_number);
        Ok(())
    }

    /// Upload a frame's geometry into the slot's buffers and bind them.
    pub fn bind<V: Pod>(
        &mut self,
        device: &D,
        frame_index: usize,
        command_buffer: vk::CommandBuffer,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<()> {
        let vertex_buffer = self
            .vertices
            .upload(device, frame_index, bytemuck::cast_slice(vertices))?;
        device.bind_vertex_buffer(command_buffer, vertex_buffer);

        let index_buffer = self
            .indices
            .upload(device, frame_index, bytemuck::cast_slice(indices))?;
        device.bind_index_buffer(command_buffer, index_buffer);
        Ok(())
    }

    pub fn vertices(&self) -> &FrameRing<D> {
        &self.vertices
    }

    pub fn indices(&self) -> &FrameRing<D> {
        &self.indices
    }

    pub fn destroy(&mut self, device: &D) -> Result<()> {
        let vertices = self.vertices.destroy(device);
        let indices = self.indices.destroy(device);
        vertices.and(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_frame::testing::SimDevice;

    #[test]
    fn grows_to_power_of_two_and_reuses() {
        let sim = SimDevice::new();
        let mut ring = FrameRing::<SimDevice>::new("vertices", vk::BufferUsageFlags::VERTEX_BUFFER);

        ring.upload(&sim, 0, &[1; 100]).unwrap();
        assert_eq!(ring.capacity(&sim, 0), MIN_CAPACITY);
        let first = ring.get(0).unwrap().id();

        ring.upload(&sim, 0, &[2; 200]).unwrap();
        assert_eq!(ring.get(0).unwrap().id(), first);

        ring.upload(&sim, 0, &[3; 300]).unwrap();
        assert_eq!(ring.capacity(&sim, 0), 512);
        let grown = ring.get(0).unwrap().id();
        assert_ne!(grown, first);
        assert_eq!(sim.destroyed_buffers(), vec![first]);
        assert_eq!(&sim.buffer_bytes(grown).unwrap()[..300], &[3; 300][..]);
    }

    #[test]
    fn slots_are_independent() {
        let sim = SimDevice::new();
        let mut ring = FrameRing::<SimDevice>::new("indices", vk::BufferUsageFlags::INDEX_BUFFER);

        ring.upload(&sim, 1, &[7; 16]).unwrap();
        assert!(ring.get(0).is_none());
        assert!(ring.get(2).is_none());
        assert_eq!(sim.buffer_bytes(ring.get(1).unwrap().id()).unwrap()[0], 7);

        ring.destroy(&sim).unwrap();
        assert!(ring.get(1).is_none());
        assert_eq!(sim.live_buffers(), 0);
    }

    #[test]
    fn one_claim_per_slot_and_frame() {
        let mut rings = GeometryRings::<SimDevice>::new("vertices", "indices");

        rings.claim(0, 0).unwrap();
        assert!(matches!(rings.claim(0, 0), Err(GpuError::InvalidState(_))));
        rings.claim(1, 1).unwrap();
        // The slot comes round again N frames later
        rings.claim(0, MAX_FRAMES_IN_FLIGHT as u64).unwrap();
    }
}
