//! Flat-coloured mesh renderer.

use ash::vk;
use cadence_core::Colour;
use cadence_frame::{FrameDevice, RenderParameters};
use cadence_gpu::{GraphicsPipeline, Result};
use cadence_shaders::Space;
use glam::Vec2;

use crate::batch::Batch;
use crate::pipeline::{mesh_pipeline_config, DrawPipeline};
use crate::ring::GeometryRings;
use crate::vertex::MeshVertex;

/// Batches coloured triangles and draws them with a single call per frame.
pub struct MeshRenderer<D: FrameDevice> {
    pipeline: GraphicsPipeline,
    space: Space,
    batch: Batch<MeshVertex>,
    geometry: GeometryRings<D>,
}

impl<D: FrameDevice> MeshRenderer<D> {
    pub fn new(device: &D, space: Space) -> Result<Self> {
        let pipeline = device.create_graphics_pipeline(&mesh_pipeline_config(space))?;
        tracing::debug!(?space, "Mesh renderer created");

        Ok(Self {
            pipeline,
            space,
            batch: Batch::new(),
            geometry: GeometryRings::new("mesh vertices", "mesh indices"),
        })
    }

    pub fn space(&self) -> Space {
        self.space
    }

    pub fn draw(&mut self, vertices: &[MeshVertex], indices: &[u32]) {
        self.batch.draw(vertices, indices);
    }

    pub fn draw_offset(&mut self, vertices: &[MeshVertex], indices: &[u32], offset: Vec2) {
        self.batch.draw_offset(vertices, indices, offset);
    }

    /// Draw a shape given by its outline positions in a single colour.
    pub fn draw_shape(&mut self, positions: &[Vec2], indices: &[u32], offset: Vec2, colour: Colour) {
        self.batch.draw_iter(
            positions
                .iter()
                .map(|&position| MeshVertex::new(position + offset, colour)),
            indices,
        );
    }

    pub fn batch(&self) -> &Batch<MeshVertex> {
        &self.batch
    }
}

impl<D: FrameDevice> DrawPipeline<D> for MeshRenderer<D> {
    fn pipeline(&self) -> &GraphicsPipeline {
        &self.pipeline
    }

    fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    fn bind(
        &mut self,
        device: &D,
        frame_index: usize,
        command_buffer: vk::CommandBuffer,
    ) -> Result<bool> {
        if self.batch.is_empty() {
            return Ok(false);
        }
        self.geometry.bind(
            device,
            frame_index,
            command_buffer,
            self.batch.vertices(),
            self.batch.indices(),
        )?;
        Ok(true)
    }

    fn render(&mut self, params: &RenderParameters<'_, D>) -> Result<()> {
        let device = params.device();
        if !self.batch.is_empty() {
            self.geometry
                .claim(params.frame_index, params.scheduler.frame_number())?;
        }
        if self.bind(device, params.frame_index, params.command_buffer)? {
            device.draw_indexed(params.command_buffer, self.batch.index_count(), 0, 0);
        }
        self.batch.clear();
        Ok(())
    }

    fn destroy(&mut self, device: &D) -> Result<()> {
        let result = self.geometry.destroy(device);
        device.destroy_pipeline(self.pipeline);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_frame::testing::{SimCall, SimDevice};
    use cadence_frame::{FrameError, FrameScheduler, SchedulerConfig};
    use cadence_gpu::GpuError;

    fn triangle() -> [MeshVertex; 3] {
        [
            MeshVertex::new(Vec2::new(0.0, 0.0), Colour::RED),
            MeshVertex::new(Vec2::new(1.0, 0.0), Colour::GREEN),
            MeshVertex::new(Vec2::new(0.0, 1.0), Colour::BLUE),
        ]
    }

    fn draws(sim: &SimDevice) -> Vec<SimCall> {
        sim.calls()
            .into_iter()
            .filter(|call| matches!(call, SimCall::DrawIndexed { .. }))
            .collect()
    }

    #[test]
    fn bind_without_draws_is_a_no_op() {
        let sim = SimDevice::new();
        let mut mesh = MeshRenderer::new(&sim, Space::World).unwrap();

        mesh.draw(&[], &[]);
        assert!(!mesh.bind(&sim, 0, vk::CommandBuffer::null()).unwrap());
        assert_eq!(sim.live_buffers(), 0);
        mesh.destroy(&sim).unwrap();
        assert_eq!(sim.live_pipelines(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn draws_batch_into_one_call() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = FrameScheduler::new(sim.clone(), SchedulerConfig::default()).unwrap();
        let mut mesh = MeshRenderer::new(scheduler.device(), Space::World).unwrap();

        scheduler.start(None).await.unwrap();
        mesh.draw(&triangle(), &[0, 1, 2]);
        mesh.draw_offset(&triangle(), &[0, 1, 2], Vec2::new(2.0, 0.0));
        mesh.draw_shape(
            &[Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y],
            &[0, 1, 2, 2, 3, 0],
            Vec2::ZERO,
            Colour::WHITE,
        );
        assert_eq!(
            mesh.batch().indices(),
            &[0, 1, 2, 3, 4, 5, 6, 7, 8, 8, 9, 6]
        );

        mesh.flush(&scheduler).unwrap();
        assert!(mesh.is_empty());
        assert_eq!(
            draws(&sim),
            vec![SimCall::DrawIndexed {
                index_count: 12,
                first_index: 0,
                vertex_offset: 0
            }]
        );
        scheduler.submit_and_present().unwrap();

        // A frame without draws records nothing for the mesh
        sim.clear_calls();
        scheduler.start(None).await.unwrap();
        mesh.flush(&scheduler).unwrap();
        assert!(draws(&sim).is_empty());
        assert!(!sim
            .calls()
            .iter()
            .any(|call| matches!(call, SimCall::BindPipeline(_))));
        scheduler.submit_and_present().unwrap();

        scheduler.shutdown().unwrap();
        mesh.destroy(scheduler.device()).unwrap();
        assert!(sim.violations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_flush_in_a_frame_keeps_the_first_upload() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = FrameScheduler::new(sim.clone(), SchedulerConfig::default()).unwrap();
        let mut mesh = MeshRenderer::new(scheduler.device(), Space::World).unwrap();

        let slot = scheduler.start(None).await.unwrap();
        mesh.draw(&triangle(), &[0, 1, 2]);
        mesh.flush(&scheduler).unwrap();
        let uploaded = bytemuck::cast_slice::<MeshVertex, u8>(&triangle()).to_vec();
        let vertices = mesh.geometry.vertices().get(slot).unwrap().id();

        mesh.draw_offset(&triangle(), &[0, 1, 2], Vec2::new(5.0, 5.0));
        assert!(matches!(
            mesh.flush(&scheduler),
            Err(FrameError::Gpu(GpuError::InvalidState(_)))
        ));
        assert_eq!(&sim.buffer_bytes(vertices).unwrap()[..uploaded.len()], &uploaded[..]);
        assert_eq!(draws(&sim).len(), 1);
        scheduler.submit_and_present().unwrap();

        // The next frame flushes normally
        scheduler.start(None).await.unwrap();
        mesh.flush(&scheduler).unwrap();
        assert_eq!(draws(&sim).len(), 2);
        scheduler.submit_and_present().unwrap();

        scheduler.shutdown().unwrap();
        mesh.destroy(scheduler.device()).unwrap();
        assert!(sim.violations().is_empty());
    }
}
