//! Command buffer management.

use crate::error::{Result, VkResultExt};
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = device
            .create_command_pool(&create_info, None)
            .context("vkCreateCommandPool")?;

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate primary command buffers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffers(
        &self,
        device: &ash::Device,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        device
            .allocate_command_buffers(&alloc_info)
            .context("vkAllocateCommandBuffers")
    }

    /// Return command buffers to the pool.
    ///
    /// # Safety
    /// The command buffers must not be pending execution.
    pub unsafe fn free_command_buffers(&self, device: &ash::Device, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            device.free_command_buffers(self.pool, buffers);
        }
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Reset a command buffer and begin recording it for a single submission.
///
/// # Safety
/// The command buffer must come from a pool created with
/// `RESET_COMMAND_BUFFER` and must not be pending execution.
pub unsafe fn begin_one_time_commands(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device
        .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        .context("vkResetCommandBuffer")?;

    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device
        .begin_command_buffer(cmd, &begin_info)
        .context("vkBeginCommandBuffer")
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd).context("vkEndCommandBuffer")
}

/// Submit one frame's command buffer.
///
/// Waits on `wait_semaphore` at `wait_stage`, signals `signal_semaphore`
/// on completion and `fence` once all work of the submission finished. A
/// null `signal_semaphore` signals nothing.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_frame(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait_semaphore: vk::Semaphore,
    wait_stage: vk::PipelineStageFlags,
    signal_semaphore: vk::Semaphore,
    fence: vk::Fence,
) -> Result<()> {
    let command_buffers = [cmd];
    let wait_semaphores = [wait_semaphore];
    let wait_stages = [wait_stage];
    let signal_semaphores: &[vk::Semaphore] = if signal_semaphore == vk::Semaphore::null() {
        &[]
    } else {
        std::slice::from_ref(&signal_semaphore)
    };

    let submit_info = vk::SubmitInfo::default()
        .command_buffers(&command_buffers)
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages)
        .signal_semaphores(signal_semaphores);

    device
        .queue_submit(queue, &[submit_info], fence)
        .context("vkQueueSubmit")
}

/// Execute a single-time command buffer and wait for it to finish.
///
/// Used for uploads outside the frame loop (textures, static data).
///
/// # Safety
/// All handles must be valid and the queue must be externally synchronized.
pub unsafe fn execute_single_time_commands<F>(
    device: &ash::Device,
    pool: &CommandPool,
    queue: vk::Queue,
    f: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = pool.allocate_command_buffers(device, 1)?[0];

    let result = (|| {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device
            .begin_command_buffer(cmd, &begin_info)
            .context("vkBeginCommandBuffer")?;
        f(cmd);
        end_command_buffer(device, cmd)?;

        let cmd_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&cmd_buffers);
        device
            .queue_submit(queue, &[submit_info], vk::Fence::null())
            .context("vkQueueSubmit")?;
        device.queue_wait_idle(queue).context("vkQueueWaitIdle")
    })();

    pool.free_command_buffers(device, &[cmd]);

    result
}
