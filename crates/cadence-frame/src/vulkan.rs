//! [`FrameDevice`] implemented on top of ash.

use std::sync::Arc;

use ash::vk;
use cadence_core::MAX_FRAMES_IN_FLIGHT;
use cadence_gpu::command::{self, CommandPool};
use cadence_gpu::descriptors::write_uniform_buffer;
use cadence_gpu::render_pass::{
    create_framebuffers, create_present_render_pass, destroy_framebuffers, full_scissor,
    full_viewport,
};
use cadence_gpu::sync;
use cadence_gpu::{
    AcquireOutcome, DescriptorPool, DescriptorSetLayoutBuilder, GpuBuffer, GpuContext, GpuError,
    GpuTexture, GraphicsPipeline, GraphicsPipelineConfig, PresentOutcome, Result, SurfaceContext,
    Swapchain,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::device::FrameDevice;

/// Maximum live descriptor sets: per-frame uniform sets plus one per texture.
pub const DESCRIPTOR_SET_BUDGET: u32 = 256;

/// Native frame device for one window.
///
/// Owns the surface, swapchain, presentation render pass and framebuffers,
/// the command pools, and the descriptor pool with its two set layouts:
/// set 0 is the coordinate-space uniform block, set 1 a sampled image plus
/// sampler.
///
/// Submission, presentation and uploads share the graphics queue; they are
/// serialized through `queue_lock` so textures can be created from outside
/// the frame thread.
pub struct VulkanDevice {
    gpu: Arc<GpuContext>,
    surface: SurfaceContext,
    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    frame_pool: CommandPool,
    upload_pool: Mutex<CommandPool>,
    queue_lock: Mutex<()>,
    descriptor_pool: Mutex<DescriptorPool>,
    uniform_layout: vk::DescriptorSetLayout,
    texture_layout: vk::DescriptorSetLayout,
    vsync: bool,
}

impl VulkanDevice {
    /// Create the device for a window with the given drawable extent.
    ///
    /// # Safety
    /// The window must outlive the returned device.
    pub unsafe fn new<W>(
        gpu: Arc<GpuContext>,
        window: &W,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let surface = unsafe { SurfaceContext::from_window(&gpu, window) }?;
        let swapchain = unsafe { surface.create_swapchain(&gpu, width, height, vsync, None) }?;
        let device = gpu.device();

        let render_pass = unsafe { create_present_render_pass(device, swapchain.format) }?;
        let framebuffers = unsafe {
            create_framebuffers(device, render_pass, &swapchain.image_views, swapchain.extent)
        }?;

        let (frame_pool, upload_pool) = unsafe {
            (
                CommandPool::new(
                    device,
                    gpu.graphics_queue_family(),
                    vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                )?,
                CommandPool::new(
                    device,
                    gpu.graphics_queue_family(),
                    vk::CommandPoolCreateFlags::TRANSIENT,
                )?,
            )
        };

        let uniform_layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
                .build(device)
        }?;
        let texture_layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .sampled_image(0, vk::ShaderStageFlags::FRAGMENT)
                .sampler(1, vk::ShaderStageFlags::FRAGMENT)
                .build(device)
        }?;

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: (MAX_FRAMES_IN_FLIGHT * 4) as u32,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: DESCRIPTOR_SET_BUDGET,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: DESCRIPTOR_SET_BUDGET,
            },
        ];
        let descriptor_pool =
            unsafe { DescriptorPool::new(device, DESCRIPTOR_SET_BUDGET, &pool_sizes) }?;

        tracing::info!(
            width = swapchain.extent.width,
            height = swapchain.extent.height,
            images = swapchain.image_count(),
            format = ?swapchain.format,
            "Frame device ready"
        );

        Ok(Self {
            gpu,
            surface,
            swapchain,
            render_pass,
            framebuffers,
            frame_pool,
            upload_pool: Mutex::new(upload_pool),
            queue_lock: Mutex::new(()),
            descriptor_pool: Mutex::new(descriptor_pool),
            uniform_layout,
            texture_layout,
            vsync,
        })
    }

    /// The GPU context this device renders with.
    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    /// Presentation render pass every pipeline is created against.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Colour format of the swapchain images.
    pub fn swapchain_format(&self) -> vk::Format {
        self.swapchain.format
    }

    /// Number of presentable images (M, independent of frames in flight).
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn device(&self) -> &ash::Device {
        self.gpu.device()
    }
}

impl FrameDevice for VulkanDevice {
    type Buffer = GpuBuffer;
    type Texture = GpuTexture;

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        unsafe { sync::create_semaphore(self.device()) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device().destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        unsafe { sync::create_fence(self.device(), signaled) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device().destroy_fence(fence, None) };
    }

    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool> {
        unsafe { sync::fence_status(self.device(), fence) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { sync::reset_fence(self.device(), fence) }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        unsafe { sync::wait_for_fences(self.device(), fences, u64::MAX) }
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        let buffers = unsafe { self.frame_pool.allocate_command_buffers(self.device(), 1) }?;
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::Other("Command buffer allocation returned nothing".into()))
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.frame_pool
                .free_command_buffers(self.device(), &[command_buffer]);
        }
    }

    fn begin_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe { command::begin_one_time_commands(self.device(), command_buffer) }
    }

    fn end_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe { command::end_command_buffer(self.device(), command_buffer) }
    }

    fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        clear: [f32; 4],
    ) -> Result<()> {
        let &framebuffer = self.framebuffers.get(image_index as usize).ok_or_else(|| {
            GpuError::InvalidState(format!(
                "no framebuffer for swapchain image {image_index} of {}",
                self.framebuffers.len()
            ))
        })?;
        let extent = self.swapchain.extent;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear },
        }];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(full_scissor(extent))
            .clear_values(&clear_values);

        let device = self.device();
        unsafe {
            device.cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(command_buffer, 0, &[full_viewport(extent)]);
            device.cmd_set_scissor(command_buffer, 0, &[full_scissor(extent)]);
        }
        Ok(())
    }

    fn end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device().cmd_end_render_pass(command_buffer) };
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let _queue = self.queue_lock.lock();
        unsafe {
            command::submit_frame(
                self.device(),
                self.gpu.graphics_queue(),
                command_buffer,
                wait,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                signal,
                fence,
            )
        }
    }

    fn acquire_next_image(&self, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        unsafe {
            self.swapchain
                .acquire_next_image(&self.surface.swapchain_loader, signal, 0)
        }
    }

    fn present(&self, image_index: u32, wait: vk::Semaphore) -> Result<PresentOutcome> {
        let _queue = self.queue_lock.lock();
        unsafe {
            self.swapchain.present(
                &self.surface.swapchain_loader,
                self.gpu.graphics_queue(),
                image_index,
                &[wait],
            )
        }
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> Result<vk::Extent2D> {
        self.gpu.wait_idle()?;

        let new_swapchain = unsafe {
            self.surface.create_swapchain(
                &self.gpu,
                extent.width,
                extent.height,
                self.vsync,
                Some(self.swapchain.swapchain),
            )
        }?;

        let device = self.gpu.device();
        let old_swapchain = std::mem::replace(&mut self.swapchain, new_swapchain);
        unsafe {
            destroy_framebuffers(device, &self.framebuffers);
            self.framebuffers.clear();
            old_swapchain.destroy(device, &self.surface.swapchain_loader);
        }

        if self.swapchain.format != old_swapchain.format {
            return Err(GpuError::SwapchainCreation(format!(
                "Surface format changed from {:?} to {:?}",
                old_swapchain.format, self.swapchain.format
            )));
        }

        self.framebuffers = unsafe {
            create_framebuffers(
                device,
                self.render_pass,
                &self.swapchain.image_views,
                self.swapchain.extent,
            )
        }?;

        Ok(self.swapchain.extent)
    }

    fn bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: &GraphicsPipeline) {
        unsafe {
            self.device().cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.pipeline,
            );
        }
    }

    fn bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: &GraphicsPipeline,
        set_index: u32,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                set_index,
                &[set],
                &[],
            );
        }
    }

    fn bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: &GpuBuffer) {
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(command_buffer, 0, &[buffer.buffer], &[0]);
        }
    }

    fn bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: &GpuBuffer) {
        unsafe {
            self.device().cmd_bind_index_buffer(
                command_buffer,
                buffer.buffer,
                0,
                vk::IndexType::UINT32,
            );
        }
    }

    fn draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) {
        unsafe {
            self.device().cmd_draw_indexed(
                command_buffer,
                index_count,
                1,
                first_index,
                vertex_offset,
                0,
            );
        }
    }

    fn create_host_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<GpuBuffer> {
        self.gpu
            .allocator()
            .lock()
            .create_buffer(size, usage, MemoryLocation::CpuToGpu, name)
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, bytes: &[u8]) -> Result<()> {
        buffer.write_bytes(offset, bytes)
    }

    fn buffer_size(&self, buffer: &GpuBuffer) -> u64 {
        buffer.size
    }

    fn destroy_buffer(&self, mut buffer: GpuBuffer) -> Result<()> {
        self.gpu.allocator().lock().free_buffer(&mut buffer)
    }

    fn create_uniform_descriptor(&self, buffer: &GpuBuffer, range: u64) -> Result<vk::DescriptorSet> {
        let device = self.device();
        let sets = unsafe {
            self.descriptor_pool
                .lock()
                .allocate(device, &[self.uniform_layout])
        }?;
        let set = sets
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::Other("Descriptor allocation returned nothing".into()))?;

        unsafe { write_uniform_buffer(device, set, 0, buffer.buffer, 0, range) };
        Ok(set)
    }

    fn free_descriptor_set(&self, set: vk::DescriptorSet) -> Result<()> {
        unsafe { self.descriptor_pool.lock().free(self.device(), &[set]) }
    }

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        rgba: &[u8],
        name: &str,
    ) -> Result<GpuTexture> {
        let _queue = self.queue_lock.lock();
        let upload_pool = self.upload_pool.lock();
        GpuTexture::upload(
            &self.gpu,
            &upload_pool,
            &mut self.descriptor_pool.lock(),
            self.texture_layout,
            width,
            height,
            rgba,
            name,
        )
    }

    fn texture_descriptor(&self, texture: &GpuTexture) -> vk::DescriptorSet {
        texture.descriptor_set
    }

    fn destroy_texture(&self, mut texture: GpuTexture) -> Result<()> {
        texture.destroy(&self.gpu, &mut self.descriptor_pool.lock());
        Ok(())
    }

    fn create_graphics_pipeline(&self, config: &GraphicsPipelineConfig) -> Result<GraphicsPipeline> {
        let layouts = [self.uniform_layout, self.texture_layout];
        let count = config.descriptor_set_count() as usize;
        unsafe { GraphicsPipeline::new(self.device(), config, self.render_pass, &layouts[..count]) }
    }

    fn destroy_pipeline(&self, pipeline: GraphicsPipeline) {
        unsafe { pipeline.destroy(self.device()) };
    }

    fn wait_idle(&self) -> Result<()> {
        self.gpu.wait_idle()
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let device = self.gpu.device();
        unsafe {
            if let Err(e) = device.device_wait_idle() {
                tracing::error!("Failed to wait idle before device teardown: {e}");
            }

            destroy_framebuffers(device, &self.framebuffers);
            self.swapchain
                .destroy(device, &self.surface.swapchain_loader);
            device.destroy_render_pass(self.render_pass, None);

            let pool = self.descriptor_pool.lock();
            if pool.used() > 0 {
                tracing::warn!(sets = pool.used(), "Descriptor sets still live at teardown");
            }
            pool.destroy(device);
            drop(pool);
            device.destroy_descriptor_set_layout(self.uniform_layout, None);
            device.destroy_descriptor_set_layout(self.texture_layout, None);

            self.upload_pool.lock().destroy(device);
            self.frame_pool.destroy(device);
            self.surface.destroy();
        }
    }
}
