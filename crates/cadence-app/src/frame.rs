//! Per-frame context for rendering.

use cadence_frame::{FrameScheduler, VulkanDevice};
use winit::window::Window;

/// Context for the frame being recorded.
pub struct FrameContext<'a> {
    /// The scheduler, in the recording state.
    pub scheduler: &'a FrameScheduler<VulkanDevice>,
    pub window: &'a Window,
    /// Frame slot being recorded.
    pub slot: usize,
    /// Frames presented before this one.
    pub frame_number: u64,
    /// Delta time since last frame in seconds.
    pub dt: f32,
}

impl<'a> FrameContext<'a> {
    pub fn scheduler(&self) -> &'a FrameScheduler<VulkanDevice> {
        self.scheduler
    }

    pub fn device(&self) -> &'a VulkanDevice {
        self.scheduler.device()
    }
}
