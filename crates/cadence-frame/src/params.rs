//! Per-render parameter bundle handed to drawing pipelines.

use ash::vk;

use crate::device::FrameDevice;
use crate::scheduler::FrameScheduler;

/// The active command buffer and frame slot, valid for one `bind` call.
///
/// Pipelines must record only into `command_buffer` and must only touch
/// their buffers for `frame_index`.
pub struct RenderParameters<'a, D: FrameDevice> {
    pub scheduler: &'a FrameScheduler<D>,
    pub command_buffer: vk::CommandBuffer,
    pub frame_index: usize,
}

impl<'a, D: FrameDevice> RenderParameters<'a, D> {
    /// The device to record with.
    pub fn device(&self) -> &'a D {
        self.scheduler.device()
    }
}

impl<D: FrameDevice> Clone for RenderParameters<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: FrameDevice> Copy for RenderParameters<'_, D> {}
