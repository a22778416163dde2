//! Frame scheduler: paces the CPU against the GPU and rotates frame slots.
//!
//! Each frame walks `Idle -> Acquiring -> Recording -> Submitted ->
//! Presented -> Idle`, moving to the next of the [`MAX_FRAMES_IN_FLIGHT`]
//! slots on every present. [`FrameScheduler::start`] is the only call that
//! waits: it polls the slot's fence and the swapchain, sleeping the task
//! between polls instead of blocking the thread.

use ash::vk;
use cadence_core::{Colour, CoordinateSpace, MAX_FRAMES_IN_FLIGHT};
use cadence_gpu::{GpuError, GraphicsPipeline};
use parking_lot::Mutex;

use crate::config::SchedulerConfig;
use crate::device::{AcquireOutcome, FrameDevice};
use crate::error::{FrameError, FrameResult};
use crate::observer::FrameObserver;
use crate::params::RenderParameters;
use crate::reclaim::{AutoDeleter, Retired};
use crate::slots::{FrameSlot, FrameSlots};

/// Consecutive out-of-date acquires tolerated within one `start()`.
const MAX_RECREATE_ATTEMPTS: u32 = 3;

/// Where the current frame is in its life cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames.
    Idle,
    /// `start()` is waiting for the slot fence or a swapchain image.
    Acquiring,
    /// Commands are being recorded into the slot's command buffer.
    Recording { image_index: u32 },
    /// Commands were submitted; presentation is pending.
    Submitted,
    /// The image was queued for presentation.
    Presented,
    /// A `start()` failed after resetting the slot fence and nothing could
    /// be submitted to signal it. Only `shutdown()` is accepted.
    Failed,
    /// `shutdown()` ran. Nothing else is accepted.
    ShutDown,
}

/// How far `start()` got opening the frame before a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Opened {
    Nothing,
    Commands,
    RenderPass,
}

/// Owns the frame slots and drives the per-frame protocol.
///
/// ```text
/// let slot = scheduler.start(None).await?;
/// let params = scheduler.bind(&pipeline)?;
/// mesh_pipeline.render(params)?;
/// scheduler.submit_and_present()?;
/// ```
pub struct FrameScheduler<D: FrameDevice> {
    device: D,
    config: SchedulerConfig,
    slots: Option<FrameSlots<D>>,
    current_frame: usize,
    frame_number: u64,
    state: FrameState,
    coordinate_space: CoordinateSpace,
    deleter: Mutex<AutoDeleter<Retired<D>>>,
    observers: Vec<Box<dyn FrameObserver>>,
    drawable_extent: vk::Extent2D,
    swapchain_stale: bool,
    /// Set once the prestart of the current slot ran, so a `start()` that was
    /// cancelled and called again does not rotate reclamation twice.
    prestarted: bool,
    /// Slot whose fence was reset by a failed `start()` with nothing
    /// submitted to signal it.
    unsignaled_slot: Option<usize>,
}

impl<D: FrameDevice> FrameScheduler<D> {
    /// Create the scheduler and its N frame slots.
    pub fn new(device: D, config: SchedulerConfig) -> FrameResult<Self> {
        let slots = FrameSlots::new(&device)?;
        let drawable_extent = device.swapchain_extent();

        tracing::info!(
            frames_in_flight = MAX_FRAMES_IN_FLIGHT,
            width = drawable_extent.width,
            height = drawable_extent.height,
            "Frame scheduler created"
        );

        Ok(Self {
            device,
            config,
            slots: Some(slots),
            current_frame: 0,
            frame_number: 0,
            state: FrameState::Idle,
            coordinate_space: CoordinateSpace::IDENTITY,
            deleter: Mutex::new(AutoDeleter::new()),
            observers: Vec::new(),
            drawable_extent,
            swapchain_stale: false,
            prestarted: false,
            unsignaled_slot: None,
        })
    }

    /// Begin the next frame and return its slot index.
    ///
    /// Waits (cooperatively) until the slot's previous submission finished,
    /// releases resources retired N frames ago, acquires a swapchain image and
    /// opens the render pass cleared to `clear`, or to the configured clear
    /// colour when `None`.
    ///
    /// Cancelling the returned future while it waits leaves the scheduler in
    /// [`FrameState::Acquiring`]; calling `start()` again resumes safely.
    ///
    /// If a native call fails after the slot fence was reset, commands that
    /// were begun are submitted without presenting so the fence signals
    /// again, and the next `start()` retries the slot on a rebuilt swapchain.
    /// When nothing could be submitted the scheduler moves to
    /// [`FrameState::Failed`].
    pub async fn start(&mut self, clear: Option<Colour>) -> FrameResult<usize> {
        match self.state {
            FrameState::Idle | FrameState::Acquiring => {}
            state => {
                return Err(FrameError::InvalidState {
                    operation: "start",
                    state,
                })
            }
        }
        if self.drawable_extent.width == 0 || self.drawable_extent.height == 0 {
            return Err(FrameError::ZeroExtent);
        }

        let slot_index = self.current_frame;
        let (fence, image_available, command_buffer) = {
            let slot = self.slot_checked("start")?;
            (slot.fence, slot.image_available, slot.command_buffer)
        };
        self.state = FrameState::Acquiring;

        while !self.device.fence_signaled(fence)? {
            tracing::trace!(slot = slot_index, "Frame slot still in flight");
            self.notify(|observer| observer.on_fence_wait(slot_index));
            tokio::time::sleep(self.config.retry_interval).await;
        }

        if !self.prestarted {
            self.prestarted = true;
            let expired = self.deleter.lock().on_frame_prestart(slot_index);
            self.release(expired)?;
            let frame_number = self.frame_number;
            self.notify(|observer| observer.on_frame_prestart(slot_index, frame_number));
        }

        let mut out_of_date = 0;
        let image_index = loop {
            if self.swapchain_stale {
                self.recreate_swapchain()?;
            }

            match self.device.acquire_next_image(image_available)? {
                AcquireOutcome::Acquired {
                    image_index,
                    suboptimal,
                } => {
                    if suboptimal {
                        tracing::debug!("Swapchain suboptimal at acquire; recreating next frame");
                        self.swapchain_stale = true;
                    }
                    break image_index;
                }
                AcquireOutcome::NotReady => {
                    tracing::trace!(slot = slot_index, "No swapchain image ready");
                    self.notify(|observer| observer.on_acquire_retry(slot_index));
                    tokio::time::sleep(self.config.retry_interval).await;
                }
                AcquireOutcome::OutOfDate => {
                    out_of_date += 1;
                    if out_of_date > MAX_RECREATE_ATTEMPTS {
                        return Err(GpuError::SwapchainCreation(format!(
                            "swapchain still out of date after {MAX_RECREATE_ATTEMPTS} recreations"
                        ))
                        .into());
                    }
                    tracing::info!("Swapchain out of date at acquire");
                    self.swapchain_stale = true;
                }
            }
        };

        // Only a submission signals the fence after this
        self.device.reset_fence(fence)?;
        if let Err(e) = self.device.begin_commands(command_buffer) {
            return Err(self.recover_failed_start(Opened::Nothing, e.into()));
        }
        let clear = clear.unwrap_or(self.config.clear_colour);
        if let Err(e) = self
            .device
            .begin_render_pass(command_buffer, image_index, clear.to_array())
        {
            return Err(self.recover_failed_start(Opened::Commands, e.into()));
        }
        if let Err(e) = self.upload_coordinate_space() {
            return Err(self.recover_failed_start(Opened::RenderPass, e));
        }

        self.state = FrameState::Recording { image_index };
        Ok(slot_index)
    }

    /// Bind `pipeline` and the frame's coordinate-space descriptor set, and
    /// hand out what a pipeline needs to record its draws.
    pub fn bind(&self, pipeline: &GraphicsPipeline) -> FrameResult<RenderParameters<'_, D>> {
        let FrameState::Recording { .. } = self.state else {
            return Err(FrameError::InvalidState {
                operation: "bind",
                state: self.state,
            });
        };
        let slot = self.slot_checked("bind")?;

        self.device.bind_pipeline(slot.command_buffer, pipeline);
        self.device
            .bind_descriptor_set(slot.command_buffer, pipeline, 0, slot.descriptor_set);

        Ok(RenderParameters {
            scheduler: self,
            command_buffer: slot.command_buffer,
            frame_index: self.current_frame,
        })
    }

    /// Close the render pass, submit the frame and queue it for presentation,
    /// then advance to the next slot.
    pub fn submit_and_present(&mut self) -> FrameResult<()> {
        let FrameState::Recording { image_index } = self.state else {
            return Err(FrameError::InvalidState {
                operation: "submit_and_present",
                state: self.state,
            });
        };
        let (command_buffer, image_available, render_finished, fence) = {
            let slot = self.slot_checked("submit_and_present")?;
            (
                slot.command_buffer,
                slot.image_available,
                slot.render_finished,
                slot.fence,
            )
        };

        self.device.end_render_pass(command_buffer);
        self.device.end_commands(command_buffer)?;
        self.device
            .submit(command_buffer, image_available, render_finished, fence)?;
        self.state = FrameState::Submitted;

        let outcome = self.device.present(image_index, render_finished)?;
        if outcome.needs_recreate() {
            tracing::info!(?outcome, "Swapchain needs recreation after present");
            self.swapchain_stale = true;
        }
        self.state = FrameState::Presented;

        let slot_index = self.current_frame;
        let frame_number = self.frame_number;
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        self.frame_number += 1;
        self.prestarted = false;
        self.state = FrameState::Idle;

        self.notify(|observer| observer.on_frame_presented(slot_index, frame_number));
        Ok(())
    }

    /// Record a new drawable size. The swapchain is rebuilt at the next
    /// `start()`; a zero-sized extent defers that until a non-zero one
    /// arrives.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            tracing::debug!(width, height, "Zero-sized drawable; deferring swapchain recreation");
        }
        self.drawable_extent = vk::Extent2D { width, height };
        self.swapchain_stale = true;
    }

    /// Hand over a resource that in-flight frames may still reference. It is
    /// destroyed once every frame that could have used it has completed.
    pub fn retire(&self, resource: Retired<D>) {
        if self.slots.is_none() {
            // Nothing is in flight after shutdown
            if let Err(e) = resource.release(&self.device) {
                tracing::warn!("Failed to release resource after shutdown: {e}");
            }
            return;
        }
        self.deleter.lock().manage(resource);
    }

    pub fn retire_buffer(&self, buffer: D::Buffer) {
        self.retire(Retired::Buffer(buffer));
    }

    pub fn retire_texture(&self, texture: D::Texture) {
        self.retire(Retired::Texture(texture));
    }

    /// Coordinate space uploaded at the start of every following frame.
    pub fn set_coordinate_space(&mut self, space: CoordinateSpace) {
        self.coordinate_space = space;
    }

    pub fn coordinate_space(&self) -> &CoordinateSpace {
        &self.coordinate_space
    }

    pub fn add_observer(&mut self, observer: Box<dyn FrameObserver>) {
        self.observers.push(observer);
    }

    /// Slot index of the frame being (or about to be) recorded.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Frames presented so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Size the next swapchain will be built for.
    pub fn drawable_extent(&self) -> vk::Extent2D {
        self.drawable_extent
    }

    /// Frame slot `index`, or `None` after shutdown or out of range.
    pub fn slot(&self, index: usize) -> Option<&FrameSlot<D>> {
        self.slots
            .as_ref()
            .filter(|slots| index < slots.len())
            .map(|slots| slots.get(index))
    }

    /// Resources waiting for their frames to complete.
    pub fn retired_count(&self) -> usize {
        self.deleter.lock().len()
    }

    /// Wait for all in-flight frames, release every retired resource and
    /// destroy the frame slots. Safe to call more than once.
    ///
    /// A frame that is still recording is ended and submitted without being
    /// presented, so its fence signals like any other. The fence of a slot
    /// left unsubmitted by a failed `start()` is not waited on.
    pub fn shutdown(&mut self) -> FrameResult<()> {
        let Some(slots) = self.slots.take() else {
            return Ok(());
        };
        tracing::info!(frames = self.frame_number, "Shutting down frame scheduler");

        let abandoned = match self.state {
            FrameState::Recording { .. } => {
                let slot = slots.get(self.current_frame);
                self.device.end_render_pass(slot.command_buffer);
                self.device
                    .end_commands(slot.command_buffer)
                    .and_then(|()| {
                        self.device.submit(
                            slot.command_buffer,
                            slot.image_available,
                            slot.render_finished,
                            slot.fence,
                        )
                    })
                    .map_err(FrameError::from)
            }
            _ => Ok(()),
        };

        let waited = self
            .device
            .wait_for_fences(&self.signalable_fences(&slots));
        let leftovers = self.deleter.get_mut().drain_all();
        let released = self.release(leftovers);
        let destroyed = if waited.is_ok() {
            slots.destroy(&self.device)
        } else {
            tracing::error!("Frame slots leaked: their fences could not be waited on");
            Ok(())
        };
        self.state = FrameState::ShutDown;

        abandoned?;
        waited?;
        released?;
        destroyed?;
        Ok(())
    }

    fn slot_checked(&self, operation: &'static str) -> FrameResult<&FrameSlot<D>> {
        self.slots
            .as_ref()
            .map(|slots| slots.get(self.current_frame))
            .ok_or(FrameError::InvalidState {
                operation,
                state: self.state,
            })
    }

    fn recreate_swapchain(&mut self) -> FrameResult<()> {
        let extent = self.drawable_extent;
        if extent.width == 0 || extent.height == 0 {
            return Err(FrameError::ZeroExtent);
        }

        let fences = self.slot_fences();
        self.device.wait_for_fences(&fences)?;
        let granted = self.device.recreate_swapchain(extent)?;
        self.swapchain_stale = false;

        tracing::info!(
            width = granted.width,
            height = granted.height,
            "Swapchain recreated"
        );
        self.notify(|observer| observer.on_swapchain_recreated(granted));
        Ok(())
    }

    fn slot_fences(&self) -> Vec<vk::Fence> {
        self.slots
            .as_ref()
            .map(|slots| self.signalable_fences(slots))
            .unwrap_or_default()
    }

    /// Slot fences that a submission will still signal.
    fn signalable_fences(&self, slots: &FrameSlots<D>) -> Vec<vk::Fence> {
        slots
            .fences()
            .into_iter()
            .enumerate()
            .filter(|&(index, _)| Some(index) != self.unsignaled_slot)
            .map(|(_, fence)| fence)
            .collect()
    }

    fn upload_coordinate_space(&self) -> FrameResult<()> {
        let uniform = &self.slot_checked("start")?.uniform;
        self.device
            .write_buffer(uniform, 0, self.coordinate_space.as_bytes())?;
        Ok(())
    }

    /// Put the current slot back in order after `start()` failed with its
    /// fence reset, and hand back `error`.
    fn recover_failed_start(&mut self, opened: Opened, error: FrameError) -> FrameError {
        let slot_index = self.current_frame;
        let resubmitted = match (opened, self.slot_checked("start")) {
            (Opened::Nothing, _) | (_, Err(_)) => false,
            (opened, Ok(slot)) => {
                if opened == Opened::RenderPass {
                    self.device.end_render_pass(slot.command_buffer);
                }
                let submitted = self.device.end_commands(slot.command_buffer).and_then(|()| {
                    self.device.submit(
                        slot.command_buffer,
                        slot.image_available,
                        vk::Semaphore::null(),
                        slot.fence,
                    )
                });
                if let Err(e) = &submitted {
                    tracing::error!(slot = slot_index, "Failed to submit discarded frame: {e}");
                }
                submitted.is_ok()
            }
        };

        if resubmitted {
            tracing::warn!(slot = slot_index, "Frame discarded after failed start: {error}");
            // The acquired image is never presented
            self.swapchain_stale = true;
            self.state = FrameState::Idle;
        } else {
            tracing::error!(slot = slot_index, "Slot fence has no submission to signal it: {error}");
            self.unsignaled_slot = Some(slot_index);
            self.state = FrameState::Failed;
        }
        error
    }

    fn release(&self, resources: Vec<Retired<D>>) -> FrameResult<()> {
        if resources.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = resources.len(), "Releasing retired resources");

        let mut first_error = None;
        for resource in resources {
            if let Err(e) = resource.release(&self.device) {
                tracing::warn!("Failed to release retired resource: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    fn notify(&mut self, mut event: impl FnMut(&mut dyn FrameObserver)) {
        for observer in &mut self.observers {
            event(observer.as_mut());
        }
    }
}

impl<D: FrameDevice> Drop for FrameScheduler<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("Frame scheduler shutdown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::FrameCounters;
    use crate::testing::{SimCall, SimDevice, SimFault};
    use cadence_gpu::PresentOutcome;
    use std::sync::Arc;
    use std::time::Duration;

    fn scheduler(sim: &SimDevice) -> FrameScheduler<SimDevice> {
        FrameScheduler::new(sim.clone(), SchedulerConfig::default()).unwrap()
    }

    fn textured_pipeline() -> GraphicsPipeline {
        GraphicsPipeline {
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            descriptor_sets: 2,
        }
    }

    async fn run_frame(scheduler: &mut FrameScheduler<SimDevice>) -> usize {
        let slot = scheduler.start(None).await.unwrap();
        scheduler.submit_and_present().unwrap();
        slot
    }

    fn recreations(sim: &SimDevice) -> Vec<vk::Extent2D> {
        sim.calls()
            .into_iter()
            .filter_map(|call| match call {
                SimCall::RecreateSwapchain(extent) => Some(extent),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn slots_rotate_in_order() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = scheduler(&sim);

        for k in 0..10 {
            assert_eq!(run_frame(&mut scheduler).await, k % MAX_FRAMES_IN_FLIGHT);
        }
        assert_eq!(scheduler.frame_number(), 10);
        assert_eq!(scheduler.current_frame(), 10 % MAX_FRAMES_IN_FLIGHT);
        assert_eq!(scheduler.state(), FrameState::Idle);
        assert!(sim.violations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slot_reuse_waits_for_gpu_with_uneven_timing() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        let counters = FrameCounters::new();
        scheduler.add_observer(Box::new(counters.clone()));

        let gpu = {
            let sim = sim.clone();
            tokio::spawn(async move {
                let delays = [1, 7, 3, 11, 5];
                for delay in delays.iter().cycle() {
                    tokio::time::sleep(Duration::from_millis(*delay)).await;
                    sim.complete_oldest();
                }
            })
        };

        let pipeline = textured_pipeline();
        for _ in 0..30 {
            scheduler.start(None).await.unwrap();
            let params = scheduler.bind(&pipeline).unwrap();
            assert_eq!(params.frame_index, scheduler.current_frame());
            scheduler.submit_and_present().unwrap();
            assert!(sim.in_flight() <= MAX_FRAMES_IN_FLIGHT);
        }
        gpu.abort();

        assert!(counters.fence_waits() > 0);
        assert_eq!(counters.presented(), 30);
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }

    #[tokio::test(start_paused = true)]
    async fn start_blocks_when_all_slots_are_in_flight() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        let counters = FrameCounters::new();
        scheduler.add_observer(Box::new(counters.clone()));

        for k in 0..MAX_FRAMES_IN_FLIGHT {
            assert_eq!(run_frame(&mut scheduler).await, k);
        }
        assert_eq!(sim.in_flight(), MAX_FRAMES_IN_FLIGHT);
        sim.clear_calls();

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), scheduler.start(None)).await;
        assert!(blocked.is_err());
        assert_eq!(scheduler.state(), FrameState::Acquiring);
        assert!(counters.fence_waits() > 0);
        assert!(sim.calls().is_empty(), "no native call while waiting");

        // The GPU finishes the oldest frame a little later
        let gpu = {
            let sim = sim.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                sim.complete_oldest();
            })
        };
        assert_eq!(scheduler.start(None).await.unwrap(), 0);
        gpu.await.unwrap();
        assert!(matches!(scheduler.state(), FrameState::Recording { .. }));
        assert!(sim.violations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retired_texture_outlives_its_frame() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        let pipeline = textured_pipeline();

        let texture = sim.create_texture(1, 1, &[255; 4], "sprite").unwrap();
        let id = texture.id();

        assert_eq!(scheduler.start(None).await.unwrap(), 0);
        {
            let params = scheduler.bind(&pipeline).unwrap();
            let device = params.device();
            device.bind_descriptor_set(
                params.command_buffer,
                &pipeline,
                1,
                device.texture_descriptor(&texture),
            );
        }
        scheduler.retire_texture(texture);
        scheduler.submit_and_present().unwrap();

        for _ in 1..MAX_FRAMES_IN_FLIGHT {
            run_frame(&mut scheduler).await;
            assert!(sim.destroyed_textures().is_empty());
        }

        // Slot 0 comes round again once its submission completed
        sim.complete_oldest();
        assert_eq!(scheduler.start(None).await.unwrap(), 0);
        assert_eq!(sim.destroyed_textures(), vec![id]);
        scheduler.submit_and_present().unwrap();

        sim.complete_all();
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            run_frame(&mut scheduler).await;
            sim.complete_all();
        }
        assert_eq!(sim.destroyed_textures(), vec![id]);
        assert!(sim.violations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn coordinate_space_is_uploaded_per_slot() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = scheduler(&sim);

        let space = CoordinateSpace::for_extent(800, 600, Default::default(), 2.0);
        scheduler.set_coordinate_space(space);
        let slot = scheduler.start(None).await.unwrap();

        let uniform = scheduler.slot(slot).unwrap().uniform.id();
        assert_eq!(sim.buffer_bytes(uniform).unwrap(), space.as_bytes().to_vec());

        // Other slots are untouched until they start
        let other = scheduler.slot(1).unwrap().uniform.id();
        assert_eq!(
            sim.buffer_bytes(other).unwrap(),
            vec![0; CoordinateSpace::SIZE as usize]
        );
        scheduler.submit_and_present().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn clear_colour_defaults_to_config() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let config = SchedulerConfig::new().with_clear_colour(Colour::BLUE);
        let mut scheduler = FrameScheduler::new(sim.clone(), config).unwrap();

        run_frame(&mut scheduler).await;
        scheduler.start(Some(Colour::RED)).await.unwrap();
        scheduler.submit_and_present().unwrap();

        let clears: Vec<[f32; 4]> = sim
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SimCall::BeginRenderPass { clear, .. } => Some(clear),
                _ => None,
            })
            .collect();
        assert_eq!(clears, vec![Colour::BLUE.to_array(), Colour::RED.to_array()]);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_calls_are_rejected() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = scheduler(&sim);
        let pipeline = textured_pipeline();

        assert!(matches!(
            scheduler.bind(&pipeline),
            Err(FrameError::InvalidState {
                operation: "bind",
                state: FrameState::Idle
            })
        ));
        assert!(matches!(
            scheduler.submit_and_present(),
            Err(FrameError::InvalidState { .. })
        ));

        scheduler.start(None).await.unwrap();
        assert!(matches!(
            scheduler.start(None).await,
            Err(FrameError::InvalidState {
                operation: "start",
                state: FrameState::Recording { .. }
            })
        ));

        // The rejected calls changed nothing
        scheduler.submit_and_present().unwrap();
        assert_eq!(scheduler.frame_number(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resize_recreates_swapchain_at_next_start() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = scheduler(&sim);
        let counters = FrameCounters::new();
        scheduler.add_observer(Box::new(counters.clone()));

        run_frame(&mut scheduler).await;
        scheduler.resize(800, 600);
        assert!(recreations(&sim).is_empty());

        run_frame(&mut scheduler).await;
        run_frame(&mut scheduler).await;
        assert_eq!(
            recreations(&sim),
            vec![vk::Extent2D {
                width: 800,
                height: 600
            }]
        );
        assert_eq!(counters.recreations(), 1);
        assert!(sim.violations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_extent_defers_rendering() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = scheduler(&sim);

        scheduler.resize(0, 0);
        assert!(matches!(
            scheduler.start(None).await,
            Err(FrameError::ZeroExtent)
        ));
        assert_eq!(scheduler.state(), FrameState::Idle);
        assert!(recreations(&sim).is_empty());

        scheduler.resize(640, 480);
        run_frame(&mut scheduler).await;
        assert_eq!(recreations(&sim).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_date_acquire_recreates_and_retries() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        sim.script_acquire(AcquireOutcome::OutOfDate);

        scheduler.start(None).await.unwrap();
        assert_eq!(recreations(&sim).len(), 1);
        let acquires = sim
            .calls()
            .iter()
            .filter(|call| **call == SimCall::AcquireNextImage)
            .count();
        assert_eq!(acquires, 2);
        scheduler.submit_and_present().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_out_of_date_is_an_error() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        for _ in 0..=MAX_RECREATE_ATTEMPTS {
            sim.script_acquire(AcquireOutcome::OutOfDate);
        }

        let result = scheduler.start(None).await;
        assert!(matches!(
            result,
            Err(FrameError::Gpu(GpuError::SwapchainCreation(_)))
        ));
        assert_eq!(recreations(&sim).len(), MAX_RECREATE_ATTEMPTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn suboptimal_results_mark_swapchain_stale() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = scheduler(&sim);

        sim.script_present(PresentOutcome::Suboptimal);
        run_frame(&mut scheduler).await;
        assert!(recreations(&sim).is_empty());
        run_frame(&mut scheduler).await;
        assert_eq!(recreations(&sim).len(), 1);

        sim.script_acquire(AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: true,
        });
        scheduler.start(None).await.unwrap();
        assert_eq!(scheduler.state(), FrameState::Recording { image_index: 2 });
        scheduler.submit_and_present().unwrap();
        run_frame(&mut scheduler).await;
        assert_eq!(recreations(&sim).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unready_swapchain_is_retried() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        let counters = FrameCounters::new();
        scheduler.add_observer(Box::new(counters.clone()));

        sim.script_acquire(AcquireOutcome::NotReady);
        sim.script_acquire(AcquireOutcome::NotReady);
        scheduler.start(None).await.unwrap();

        assert_eq!(counters.acquire_retries(), 2);
        scheduler.submit_and_present().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn observers_see_frame_boundaries_in_order() {
        #[derive(Clone, Default)]
        struct Recorder(Arc<Mutex<Vec<String>>>);

        impl FrameObserver for Recorder {
            fn on_frame_prestart(&mut self, slot: usize, frame_number: u64) {
                self.0.lock().push(format!("prestart {slot} {frame_number}"));
            }

            fn on_frame_presented(&mut self, slot: usize, frame_number: u64) {
                self.0.lock().push(format!("presented {slot} {frame_number}"));
            }
        }

        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = scheduler(&sim);
        let recorder = Recorder::default();
        scheduler.add_observer(Box::new(recorder.clone()));

        run_frame(&mut scheduler).await;
        run_frame(&mut scheduler).await;

        assert_eq!(
            *recorder.0.lock(),
            vec!["prestart 0 0", "presented 0 0", "prestart 1 1", "presented 1 1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_start_does_not_prestart_twice() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        let counters = FrameCounters::new();
        scheduler.add_observer(Box::new(counters.clone()));

        // Park in the acquire loop after prestart ran
        for _ in 0..100 {
            sim.script_acquire(AcquireOutcome::NotReady);
        }
        scheduler.retire_buffer(
            sim.create_host_buffer(16, vk::BufferUsageFlags::VERTEX_BUFFER, "old")
                .unwrap(),
        );
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), scheduler.start(None)).await;
        assert!(cancelled.is_err());
        assert_eq!(scheduler.state(), FrameState::Acquiring);
        assert!(counters.acquire_retries() > 0);

        // Drain the script so the retry succeeds
        while matches!(
            sim.acquire_next_image(vk::Semaphore::null()).unwrap(),
            AcquireOutcome::NotReady
        ) {}
        assert_eq!(scheduler.start(None).await.unwrap(), 0);
        scheduler.submit_and_present().unwrap();

        // Retired before slot 0 started, so it belongs to the frame before it
        // and is freed when slot 2 starts
        sim.complete_all();
        run_frame(&mut scheduler).await;
        assert!(sim.destroyed_buffers().is_empty());
        run_frame(&mut scheduler).await;
        assert_eq!(sim.destroyed_buffers().len(), 1);
        assert!(sim.violations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_frame_releases_everything() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);

        run_frame(&mut scheduler).await;
        scheduler.retire_buffer(
            sim.create_host_buffer(64, vk::BufferUsageFlags::INDEX_BUFFER, "indices")
                .unwrap(),
        );
        scheduler.start(None).await.unwrap();

        scheduler.shutdown().unwrap();
        assert_eq!(scheduler.state(), FrameState::ShutDown);
        assert_eq!(sim.in_flight(), 0);
        assert_eq!(sim.live_buffers(), 0);
        assert_eq!(sim.live_descriptor_sets(), 0);
        assert_eq!(sim.live_sync_objects(), 0);
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());

        // Idempotent, and the scheduler refuses new frames
        scheduler.shutdown().unwrap();
        assert!(matches!(
            scheduler.start(None).await,
            Err(FrameError::InvalidState {
                state: FrameState::ShutDown,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retire_after_shutdown_releases_immediately() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        scheduler.shutdown().unwrap();

        let buffer = sim
            .create_host_buffer(8, vk::BufferUsageFlags::VERTEX_BUFFER, "late")
            .unwrap();
        let id = buffer.id();
        scheduler.retire_buffer(buffer);
        assert_eq!(sim.destroyed_buffers().last(), Some(&id));
        assert_eq!(scheduler.retired_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_drains_pending_retirements() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        run_frame(&mut scheduler).await;
        scheduler.retire_texture(sim.create_texture(2, 2, &[0; 16], "t").unwrap());

        drop(scheduler);
        assert_eq!(sim.destroyed_textures().len(), 1);
        assert_eq!(sim.live_sync_objects(), 0);
    }

    #[test]
    fn slot_creation_failure_is_propagated() {
        let sim = SimDevice::new();
        sim.fail_call(SimFault::CreateFence, 2);

        let result = FrameScheduler::new(sim.clone(), SchedulerConfig::default());
        assert!(matches!(result, Err(FrameError::Gpu(GpuError::Call { .. }))));
        assert_eq!(sim.live_sync_objects(), 0);
        assert_eq!(sim.live_buffers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn freed_command_buffer_fails_start_without_hanging() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        let command_buffer = scheduler.slot(0).unwrap().command_buffer;
        sim.free_command_buffer(command_buffer);

        assert!(matches!(
            scheduler.start(None).await,
            Err(FrameError::Gpu(GpuError::ResourceNotFound(_)))
        ));
        assert_eq!(scheduler.state(), FrameState::Failed);

        // Refused at once instead of polling a fence nothing will signal
        let retry =
            tokio::time::timeout(Duration::from_millis(50), scheduler.start(None)).await;
        assert!(matches!(
            retry,
            Ok(Err(FrameError::InvalidState {
                operation: "start",
                state: FrameState::Failed
            }))
        ));

        scheduler.shutdown().unwrap();
        assert_eq!(scheduler.state(), FrameState::ShutDown);
        assert_eq!(sim.live_sync_objects(), 0);
        assert_eq!(sim.live_buffers(), 0);
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_begin_commands_skips_only_that_fence_at_shutdown() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        sim.fail_call(SimFault::BeginCommands, 1);

        assert_eq!(run_frame(&mut scheduler).await, 0);
        assert!(scheduler.start(None).await.is_err());
        assert_eq!(scheduler.state(), FrameState::Failed);
        assert_eq!(sim.in_flight(), 1);

        // Slot 0 is still waited on
        scheduler.shutdown().unwrap();
        assert_eq!(sim.in_flight(), 0);
        assert_eq!(sim.live_sync_objects(), 0);
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_upload_discards_the_frame_and_retries_the_slot() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        sim.fail_call(SimFault::WriteBuffer, 0);

        assert!(matches!(
            scheduler.start(None).await,
            Err(FrameError::Gpu(GpuError::Call { .. }))
        ));
        assert_eq!(scheduler.state(), FrameState::Idle);
        assert_eq!(sim.in_flight(), 1);
        let calls = sim.calls();
        assert!(calls.contains(&SimCall::EndRenderPass));
        assert!(!calls
            .iter()
            .any(|call| matches!(call, SimCall::Present { .. })));

        // The discarded submission signals the fence again
        sim.complete_all();
        assert_eq!(scheduler.start(None).await.unwrap(), 0);
        assert_eq!(recreations(&sim).len(), 1);
        scheduler.submit_and_present().unwrap();
        assert_eq!(scheduler.frame_number(), 1);

        scheduler.shutdown().unwrap();
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }

    #[tokio::test(start_paused = true)]
    async fn unsubmittable_discard_leaves_scheduler_failed() {
        let sim = SimDevice::new();
        let mut scheduler = scheduler(&sim);
        sim.fail_call(SimFault::WriteBuffer, 0);
        sim.fail_call(SimFault::Submit, 0);

        assert!(scheduler.start(None).await.is_err());
        assert_eq!(scheduler.state(), FrameState::Failed);
        assert_eq!(sim.in_flight(), 0);

        scheduler.shutdown().unwrap();
        assert_eq!(sim.live_sync_objects(), 0);
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_swapchain_image_fails_start() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = scheduler(&sim);
        sim.script_acquire(AcquireOutcome::Acquired {
            image_index: 7,
            suboptimal: false,
        });

        assert!(matches!(
            scheduler.start(None).await,
            Err(FrameError::Gpu(GpuError::InvalidState(_)))
        ));
        assert_eq!(scheduler.state(), FrameState::Idle);
        let calls = sim.calls();
        assert!(!calls.iter().any(|call| matches!(
            call,
            SimCall::BeginRenderPass { .. } | SimCall::EndRenderPass
        )));
        assert!(calls
            .iter()
            .any(|call| matches!(call, SimCall::Submit { .. })));

        assert_eq!(run_frame(&mut scheduler).await, 0);
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }
}
