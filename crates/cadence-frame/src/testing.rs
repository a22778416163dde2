//! A simulated GPU implementing [`FrameDevice`] for tests.
//!
//! Handles are plain counters. Submitted work stays in flight until the test
//! completes it ([`SimDevice::complete_oldest`], [`SimDevice::complete_all`])
//! or auto-completion is switched on. Completion happens in submission
//! order, like a single queue.
//!
//! Every boundary call is appended to a log, and misuse that a real driver
//! would not catch (resetting a fence or command buffer that is still in
//! flight, writing or destroying a buffer or texture a pending submission
//! references) is recorded as a violation instead of failing the call.
//!
//! [`SimDevice::fail_call`] makes a chosen fallible call fail, for driving
//! error paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use ash::vk::{self, Handle};
use cadence_gpu::{GpuError, GraphicsPipeline, GraphicsPipelineConfig, Result};
use parking_lot::Mutex;

use crate::device::{AcquireOutcome, FrameDevice, PresentOutcome};

/// One recorded boundary call.
#[derive(Clone, Debug, PartialEq)]
pub enum SimCall {
    AcquireNextImage,
    ResetFence(vk::Fence),
    BeginCommands(vk::CommandBuffer),
    BeginRenderPass { image_index: u32, clear: [f32; 4] },
    EndRenderPass,
    EndCommands,
    Submit {
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
    },
    Present { image_index: u32 },
    RecreateSwapchain(vk::Extent2D),
    BindPipeline(vk::Pipeline),
    BindDescriptorSet { set_index: u32, set: vk::DescriptorSet },
    BindVertexBuffer(u64),
    BindIndexBuffer(u64),
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    },
    WriteBuffer { buffer: u64, offset: u64, len: usize },
    DestroyBuffer(u64),
    DestroyTexture(u64),
}

/// A fallible call that [`SimDevice::fail_call`] can make fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimFault {
    CreateSemaphore,
    CreateFence,
    AllocateCommandBuffer,
    BeginCommands,
    EndCommands,
    Submit,
    CreateHostBuffer,
    WriteBuffer,
    CreateUniformDescriptor,
}

/// Buffer handle of the simulated device.
#[derive(Debug)]
pub struct SimBuffer {
    id: u64,
    size: u64,
}

impl SimBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Texture handle of the simulated device.
#[derive(Debug)]
pub struct SimTexture {
    id: u64,
    descriptor: vk::DescriptorSet,
}

impl SimTexture {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CommandState {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Resource {
    Buffer(u64),
    Texture(u64),
}

struct Submission {
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    references: HashSet<Resource>,
}

struct SimState {
    next_handle: u64,
    fences: HashMap<vk::Fence, bool>,
    semaphores: HashSet<vk::Semaphore>,
    command_buffers: HashMap<vk::CommandBuffer, CommandState>,
    recording_refs: HashMap<vk::CommandBuffer, HashSet<Resource>>,
    in_flight: VecDeque<Submission>,
    descriptor_targets: HashMap<vk::DescriptorSet, Resource>,
    descriptor_sets: HashSet<vk::DescriptorSet>,
    buffers: HashMap<u64, Vec<u8>>,
    textures: HashSet<u64>,
    pipelines: usize,
    destroyed_buffers: Vec<u64>,
    destroyed_textures: Vec<u64>,
    calls: Vec<SimCall>,
    violations: Vec<String>,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    image_count: u32,
    next_image: u32,
    extent: vk::Extent2D,
    auto_complete: bool,
    faults: HashMap<SimFault, usize>,
}

impl SimState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Count down a scheduled fault, failing the call when it reaches zero.
    fn check_fault(&mut self, fault: SimFault) -> Result<()> {
        let Some(remaining) = self.faults.get_mut(&fault) else {
            return Ok(());
        };
        if *remaining > 0 {
            *remaining -= 1;
            return Ok(());
        }
        self.faults.remove(&fault);
        Err(GpuError::Call {
            call: "simulated",
            result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        })
    }

    fn violation(&mut self, message: String) {
        tracing::error!("{message}");
        self.violations.push(message);
    }

    fn in_flight_references(&self, resource: Resource) -> bool {
        self.in_flight
            .iter()
            .any(|submission| submission.references.contains(&resource))
    }

    fn fence_in_flight(&self, fence: vk::Fence) -> bool {
        self.in_flight.iter().any(|submission| submission.fence == fence)
    }

    fn complete_oldest(&mut self) -> bool {
        let Some(submission) = self.in_flight.pop_front() else {
            return false;
        };
        self.fences.insert(submission.fence, true);
        if let Some(state) = self.command_buffers.get_mut(&submission.command_buffer) {
            *state = CommandState::Executable;
        }
        true
    }

    fn reference(&mut self, command_buffer: vk::CommandBuffer, resource: Resource) {
        self.recording_refs
            .entry(command_buffer)
            .or_default()
            .insert(resource);
    }
}

/// Simulated GPU. Clones share state, so a test keeps one clone for
/// inspection while the scheduler owns another.
#[derive(Clone)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    /// A device with a 1280x720 swapchain of three images.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                next_handle: 0,
                fences: HashMap::new(),
                semaphores: HashSet::new(),
                command_buffers: HashMap::new(),
                recording_refs: HashMap::new(),
                in_flight: VecDeque::new(),
                descriptor_targets: HashMap::new(),
                descriptor_sets: HashSet::new(),
                buffers: HashMap::new(),
                textures: HashSet::new(),
                pipelines: 0,
                destroyed_buffers: Vec::new(),
                destroyed_textures: Vec::new(),
                calls: Vec::new(),
                violations: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                image_count: 3,
                next_image: 0,
                extent: vk::Extent2D {
                    width: 1280,
                    height: 720,
                },
                auto_complete: false,
                faults: HashMap::new(),
            })),
        }
    }

    /// Complete every submission as soon as it is made.
    pub fn set_auto_complete(&self, enabled: bool) {
        self.state.lock().auto_complete = enabled;
    }

    /// Make the `fault` call fail once, after `succeed_first` more calls of
    /// that kind succeeded.
    pub fn fail_call(&self, fault: SimFault, succeed_first: usize) {
        self.state.lock().faults.insert(fault, succeed_first);
    }

    /// Queue the outcome of a future acquire. Unscripted acquires succeed,
    /// cycling through the swapchain images.
    pub fn script_acquire(&self, outcome: AcquireOutcome) {
        self.state.lock().acquire_script.push_back(outcome);
    }

    /// Queue the outcome of a future present. Unscripted presents succeed.
    pub fn script_present(&self, outcome: PresentOutcome) {
        self.state.lock().present_script.push_back(outcome);
    }

    /// Finish the oldest in-flight submission. Returns `false` if none.
    pub fn complete_oldest(&self) -> bool {
        self.state.lock().complete_oldest()
    }

    /// Finish all in-flight submissions. Returns how many completed.
    pub fn complete_all(&self) -> usize {
        let mut state = self.state.lock();
        let mut completed = 0;
        while state.complete_oldest() {
            completed += 1;
        }
        completed
    }

    /// Submissions not yet completed.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    pub fn destroyed_buffers(&self) -> Vec<u64> {
        self.state.lock().destroyed_buffers.clone()
    }

    pub fn destroyed_textures(&self) -> Vec<u64> {
        self.state.lock().destroyed_textures.clone()
    }

    /// Current contents of a live buffer.
    pub fn buffer_bytes(&self, id: u64) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&id).cloned()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    pub fn live_descriptor_sets(&self) -> usize {
        self.state.lock().descriptor_sets.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.state.lock().pipelines
    }

    /// Fences, semaphores and command buffers not yet destroyed.
    pub fn live_sync_objects(&self) -> usize {
        let state = self.state.lock();
        state.fences.len() + state.semaphores.len() + state.command_buffers.len()
    }

    fn record(&self, call: SimCall) {
        self.state.lock().calls.push(call);
    }
}

impl FrameDevice for SimDevice {
    type Buffer = SimBuffer;
    type Texture = SimTexture;

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let mut state = self.state.lock();
        state.check_fault(SimFault::CreateSemaphore)?;
        let semaphore = vk::Semaphore::from_raw(state.handle());
        state.semaphores.insert(semaphore);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.lock().semaphores.remove(&semaphore);
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let mut state = self.state.lock();
        state.check_fault(SimFault::CreateFence)?;
        let fence = vk::Fence::from_raw(state.handle());
        state.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        if state.fence_in_flight(fence) {
            state.violation(format!("fence {fence:?} destroyed while in flight"));
        }
        state.fences.remove(&fence);
    }

    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool> {
        self.state
            .lock()
            .fences
            .get(&fence)
            .copied()
            .ok_or_else(|| GpuError::ResourceNotFound(format!("fence {fence:?}")))
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock();
        if state.fence_in_flight(fence) {
            state.violation(format!("fence {fence:?} reset while in flight"));
        }
        state.fences.insert(fence, false);
        state.calls.push(SimCall::ResetFence(fence));
        Ok(())
    }

    fn wait_for_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            let pending = fences
                .iter()
                .find(|fence| !state.fences.get(fence).copied().unwrap_or(true))
                .copied();
            let Some(fence) = pending else {
                return Ok(());
            };
            if !state.fence_in_flight(fence) {
                return Err(GpuError::InvalidState(format!(
                    "waiting on fence {fence:?} that no submission will signal"
                )));
            }
            state.complete_oldest();
        }
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        let mut state = self.state.lock();
        state.check_fault(SimFault::AllocateCommandBuffer)?;
        let command_buffer = vk::CommandBuffer::from_raw(state.handle());
        state
            .command_buffers
            .insert(command_buffer, CommandState::Initial);
        Ok(command_buffer)
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        let mut state = self.state.lock();
        if state.command_buffers.get(&command_buffer) == Some(&CommandState::Pending) {
            state.violation(format!(
                "command buffer {command_buffer:?} freed while in flight"
            ));
        }
        state.command_buffers.remove(&command_buffer);
        state.recording_refs.remove(&command_buffer);
    }

    fn begin_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        state.check_fault(SimFault::BeginCommands)?;
        match state.command_buffers.get(&command_buffer).copied() {
            None => {
                return Err(GpuError::ResourceNotFound(format!(
                    "command buffer {command_buffer:?}"
                )))
            }
            Some(CommandState::Pending) => state.violation(format!(
                "command buffer {command_buffer:?} reset while in flight"
            )),
            Some(_) => {}
        }
        state
            .command_buffers
            .insert(command_buffer, CommandState::Recording);
        state.recording_refs.remove(&command_buffer);
        state.calls.push(SimCall::BeginCommands(command_buffer));
        Ok(())
    }

    fn end_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        state.check_fault(SimFault::EndCommands)?;
        if state.command_buffers.get(&command_buffer) != Some(&CommandState::Recording) {
            return Err(GpuError::InvalidState(format!(
                "command buffer {command_buffer:?} is not recording"
            )));
        }
        state
            .command_buffers
            .insert(command_buffer, CommandState::Executable);
        state.calls.push(SimCall::EndCommands);
        Ok(())
    }

    fn begin_render_pass(
        &self,
        _command_buffer: vk::CommandBuffer,
        image_index: u32,
        clear: [f32; 4],
    ) -> Result<()> {
        let mut state = self.state.lock();
        if image_index >= state.image_count {
            return Err(GpuError::InvalidState(format!(
                "no framebuffer for swapchain image {image_index} of {}",
                state.image_count
            )));
        }
        state.calls.push(SimCall::BeginRenderPass { image_index, clear });
        Ok(())
    }

    fn end_render_pass(&self, _command_buffer: vk::CommandBuffer) {
        self.record(SimCall::EndRenderPass);
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        _wait: vk::Semaphore,
        _signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.check_fault(SimFault::Submit)?;
        if state.command_buffers.get(&command_buffer) != Some(&CommandState::Executable) {
            return Err(GpuError::InvalidState(format!(
                "command buffer {command_buffer:?} submitted before recording ended"
            )));
        }
        if state.fences.get(&fence).copied().unwrap_or(false) {
            state.violation(format!("fence {fence:?} submitted while signaled"));
        }

        state
            .command_buffers
            .insert(command_buffer, CommandState::Pending);
        let references = state
            .recording_refs
            .remove(&command_buffer)
            .unwrap_or_default();
        state.in_flight.push_back(Submission {
            command_buffer,
            fence,
            references,
        });
        state.calls.push(SimCall::Submit {
            command_buffer,
            fence,
        });

        if state.auto_complete {
            while state.complete_oldest() {}
        }
        Ok(())
    }

    fn acquire_next_image(&self, _signal: vk::Semaphore) -> Result<AcquireOutcome> {
        let mut state = self.state.lock();
        state.calls.push(SimCall::AcquireNextImage);
        if let Some(outcome) = state.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let image_index = state.next_image;
        state.next_image = (state.next_image + 1) % state.image_count;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn present(&self, image_index: u32, _wait: vk::Semaphore) -> Result<PresentOutcome> {
        let mut state = self.state.lock();
        state.calls.push(SimCall::Present { image_index });
        Ok(state
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.state.lock().extent
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> Result<vk::Extent2D> {
        let mut state = self.state.lock();
        if !state.in_flight.is_empty() {
            state.violation("swapchain recreated with frames in flight".to_string());
        }
        state.extent = extent;
        state.next_image = 0;
        state.calls.push(SimCall::RecreateSwapchain(extent));
        Ok(extent)
    }

    fn bind_pipeline(&self, _command_buffer: vk::CommandBuffer, pipeline: &GraphicsPipeline) {
        self.record(SimCall::BindPipeline(pipeline.pipeline));
    }

    fn bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        _pipeline: &GraphicsPipeline,
        set_index: u32,
        set: vk::DescriptorSet,
    ) {
        let mut state = self.state.lock();
        if let Some(&resource) = state.descriptor_targets.get(&set) {
            state.reference(command_buffer, resource);
        }
        state
            .calls
            .push(SimCall::BindDescriptorSet { set_index, set });
    }

    fn bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: &SimBuffer) {
        let mut state = self.state.lock();
        state.reference(command_buffer, Resource::Buffer(buffer.id));
        state.calls.push(SimCall::BindVertexBuffer(buffer.id));
    }

    fn bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: &SimBuffer) {
        let mut state = self.state.lock();
        state.reference(command_buffer, Resource::Buffer(buffer.id));
        state.calls.push(SimCall::BindIndexBuffer(buffer.id));
    }

    fn draw_indexed(
        &self,
        _command_buffer: vk::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) {
        self.record(SimCall::DrawIndexed {
            index_count,
            first_index,
            vertex_offset,
        });
    }

    fn create_host_buffer(
        &self,
        size: u64,
        _usage: vk::BufferUsageFlags,
        _name: &str,
    ) -> Result<SimBuffer> {
        let mut state = self.state.lock();
        state.check_fault(SimFault::CreateHostBuffer)?;
        let id = state.handle();
        state.buffers.insert(id, vec![0; size as usize]);
        Ok(SimBuffer { id, size })
    }

    fn write_buffer(&self, buffer: &SimBuffer, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.check_fault(SimFault::WriteBuffer)?;
        if state.in_flight_references(Resource::Buffer(buffer.id)) {
            state.violation(format!("buffer {} written while in flight", buffer.id));
        }

        let start = offset as usize;
        let end = start + bytes.len();
        let contents = state
            .buffers
            .get_mut(&buffer.id)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("buffer {}", buffer.id)))?;
        if end > contents.len() {
            return Err(GpuError::InvalidState(format!(
                "write of {} bytes at {offset} exceeds buffer size {}",
                bytes.len(),
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(bytes);

        state.calls.push(SimCall::WriteBuffer {
            buffer: buffer.id,
            offset,
            len: bytes.len(),
        });
        Ok(())
    }

    fn buffer_size(&self, buffer: &SimBuffer) -> u64 {
        buffer.size
    }

    fn destroy_buffer(&self, buffer: SimBuffer) -> Result<()> {
        let mut state = self.state.lock();
        if state.in_flight_references(Resource::Buffer(buffer.id)) {
            state.violation(format!("buffer {} destroyed while in flight", buffer.id));
        }
        state.buffers.remove(&buffer.id);
        state.destroyed_buffers.push(buffer.id);
        state.calls.push(SimCall::DestroyBuffer(buffer.id));
        Ok(())
    }

    fn create_uniform_descriptor(&self, buffer: &SimBuffer, _range: u64) -> Result<vk::DescriptorSet> {
        let mut state = self.state.lock();
        state.check_fault(SimFault::CreateUniformDescriptor)?;
        let set = vk::DescriptorSet::from_raw(state.handle());
        state.descriptor_sets.insert(set);
        state
            .descriptor_targets
            .insert(set, Resource::Buffer(buffer.id));
        Ok(set)
    }

    fn free_descriptor_set(&self, set: vk::DescriptorSet) -> Result<()> {
        let mut state = self.state.lock();
        state.descriptor_sets.remove(&set);
        state.descriptor_targets.remove(&set);
        Ok(())
    }

    fn create_texture(&self, width: u32, height: u32, rgba: &[u8], _name: &str) -> Result<SimTexture> {
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(GpuError::InvalidState(format!(
                "texture data is {} bytes, expected {}",
                rgba.len(),
                width as usize * height as usize * 4
            )));
        }

        let mut state = self.state.lock();
        let id = state.handle();
        let descriptor = vk::DescriptorSet::from_raw(state.handle());
        state.textures.insert(id);
        state.descriptor_sets.insert(descriptor);
        state
            .descriptor_targets
            .insert(descriptor, Resource::Texture(id));
        Ok(SimTexture { id, descriptor })
    }

    fn texture_descriptor(&self, texture: &SimTexture) -> vk::DescriptorSet {
        texture.descriptor
    }

    fn destroy_texture(&self, texture: SimTexture) -> Result<()> {
        let mut state = self.state.lock();
        if state.in_flight_references(Resource::Texture(texture.id)) {
            state.violation(format!("texture {} destroyed while in flight", texture.id));
        }
        state.textures.remove(&texture.id);
        state.descriptor_sets.remove(&texture.descriptor);
        state.descriptor_targets.remove(&texture.descriptor);
        state.destroyed_textures.push(texture.id);
        state.calls.push(SimCall::DestroyTexture(texture.id));
        Ok(())
    }

    fn create_graphics_pipeline(&self, config: &GraphicsPipelineConfig) -> Result<GraphicsPipeline> {
        let mut state = self.state.lock();
        state.pipelines += 1;
        Ok(GraphicsPipeline {
            pipeline: vk::Pipeline::from_raw(state.handle()),
            layout: vk::PipelineLayout::from_raw(state.handle()),
            descriptor_sets: config.descriptor_set_count(),
        })
    }

    fn destroy_pipeline(&self, _pipeline: GraphicsPipeline) {
        let mut state = self.state.lock();
        state.pipelines = state.pipelines.saturating_sub(1);
    }

    fn wait_idle(&self) -> Result<()> {
        self.complete_all();
        Ok(())
    }
}
