//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use cadence_core::CoordinateSpace;
use cadence_frame::{FrameScheduler, SchedulerConfig, VulkanDevice};
use cadence_gpu::GpuContext;
use winit::window::Window;

/// Application context shared across all app methods.
pub struct AppContext {
    /// Frame scheduler owning the Vulkan device. Declared before `window`
    /// so the surface is destroyed before the window it was created for.
    pub(crate) scheduler: FrameScheduler<VulkanDevice>,
    /// The window handle.
    pub window: Arc<Window>,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
    pub(crate) quit_requested: bool,
}

impl AppContext {
    /// Create the Vulkan device and the frame scheduler for `window`.
    ///
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        vsync: bool,
        config: SchedulerConfig,
    ) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        // SAFETY: the device is owned by the scheduler, which is dropped before the window
        let device = unsafe { VulkanDevice::new(Arc::new(gpu), window.as_ref(), width, height, vsync)? };
        let scheduler = FrameScheduler::new(device, config)?;

        Ok(Self {
            scheduler,
            window,
            last_frame_time: Instant::now(),
            quit_requested: false,
        })
    }

    /// The device to create renderers, buffers and textures with.
    pub fn device(&self) -> &VulkanDevice {
        self.scheduler.device()
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        self.scheduler.device().gpu()
    }

    pub fn scheduler(&self) -> &FrameScheduler<VulkanDevice> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut FrameScheduler<VulkanDevice> {
        &mut self.scheduler
    }

    /// Coordinate space used from the next frame on.
    pub fn set_coordinate_space(&mut self, space: CoordinateSpace) {
        self.scheduler.set_coordinate_space(space);
    }

    /// Current drawable size.
    pub fn extent(&self) -> vk::Extent2D {
        self.scheduler.drawable_extent()
    }

    /// Whether the drawable is zero-sized and frames are skipped.
    pub fn is_minimized(&self) -> bool {
        let extent = self.extent();
        extent.width == 0 || extent.height == 0
    }

    /// Frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.scheduler.frame_number()
    }

    /// Ask the framework to shut down after the current frame.
    pub fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }
}
