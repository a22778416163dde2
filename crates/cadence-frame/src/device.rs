//! The boundary between the frame engine and the native graphics API.
//!
//! Everything the scheduler, the per-frame slots and the drawing pipelines
//! need from the GPU goes through [`FrameDevice`]. [`crate::VulkanDevice`]
//! implements it with ash; tests drive the same code against a simulated GPU.

use ash::vk;
use cadence_gpu::{GraphicsPipeline, GraphicsPipelineConfig, Result};

pub use cadence_gpu::{AcquireOutcome, PresentOutcome};

/// Native operations used by the frame engine.
///
/// Recording calls (`bind_*`, `draw_indexed`, `end_render_pass`) cannot fail
/// on the API side and return nothing. Every other call checks its
/// native status and turns anything but the designed transient outcomes into
/// a [`cadence_gpu::GpuError`] naming the call.
pub trait FrameDevice {
    /// Host-visible buffer handle, owned by the caller until destroyed.
    type Buffer;
    /// Sampled texture handle, owned by the caller until destroyed.
    type Texture;

    // Synchronization objects

    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Non-blocking fence poll.
    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;
    /// Block until every fence is signaled.
    fn wait_for_fences(&self, fences: &[vk::Fence]) -> Result<()>;

    // Command buffers

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer>;
    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer);
    /// Reset the command buffer and begin recording.
    fn begin_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    fn end_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    /// Begin the presentation render pass on the framebuffer of
    /// `image_index`, clearing to `clear`, with a full-extent viewport and
    /// scissor. Fails without recording anything if the swapchain has no
    /// image `image_index`.
    fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        clear: [f32; 4],
    ) -> Result<()>;
    fn end_render_pass(&self, command_buffer: vk::CommandBuffer);
    /// Submit to the graphics queue, waiting on `wait` at the top of the
    /// pipe and signaling `signal` and `fence` on completion. A null
    /// `signal` signals no semaphore.
    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()>;

    // Swap chain

    /// Acquire the next presentable image without blocking, signaling
    /// `signal` once it is available.
    fn acquire_next_image(&self, signal: vk::Semaphore) -> Result<AcquireOutcome>;
    /// Queue `image_index` for presentation once `wait` is signaled.
    fn present(&self, image_index: u32, wait: vk::Semaphore) -> Result<PresentOutcome>;
    fn swapchain_extent(&self) -> vk::Extent2D;
    /// Rebuild the swap chain for a drawable extent. Returns the extent the
    /// surface actually granted. The caller guarantees no frame is in flight.
    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> Result<vk::Extent2D>;

    // Binding and drawing

    fn bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: &GraphicsPipeline);
    fn bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: &GraphicsPipeline,
        set_index: u32,
        set: vk::DescriptorSet,
    );
    fn bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: &Self::Buffer);
    /// Bind a buffer of `u32` indices.
    fn bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: &Self::Buffer);
    fn draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    );

    // Buffers

    /// Create a persistently mapped, host-coherent buffer.
    fn create_host_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Self::Buffer>;
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, bytes: &[u8]) -> Result<()>;
    fn buffer_size(&self, buffer: &Self::Buffer) -> u64;
    fn destroy_buffer(&self, buffer: Self::Buffer) -> Result<()>;
    /// Allocate a set-0 descriptor set pointing at the first `range` bytes
    /// of a uniform buffer.
    fn create_uniform_descriptor(&self, buffer: &Self::Buffer, range: u64)
        -> Result<vk::DescriptorSet>;
    fn free_descriptor_set(&self, set: vk::DescriptorSet) -> Result<()>;

    // Textures

    /// Upload tightly packed RGBA8 texels into a new sampled texture.
    fn create_texture(
        &self,
        width: u32,
        height: u32,
        rgba: &[u8],
        name: &str,
    ) -> Result<Self::Texture>;
    /// Set-1 descriptor set binding the texture and its sampler.
    fn texture_descriptor(&self, texture: &Self::Texture) -> vk::DescriptorSet;
    fn destroy_texture(&self, texture: Self::Texture) -> Result<()>;

    // Pipelines

    fn create_graphics_pipeline(&self, config: &GraphicsPipelineConfig)
        -> Result<GraphicsPipeline>;
    fn destroy_pipeline(&self, pipeline: GraphicsPipeline);

    fn wait_idle(&self) -> Result<()>;
}
