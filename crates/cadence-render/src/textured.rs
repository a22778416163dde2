//! Textured triangle renderer.

use ash::vk;
use cadence_frame::{FrameDevice, RenderParameters};
use cadence_gpu::{GraphicsPipeline, Result};
use cadence_shaders::Space;
use glam::Vec2;

use crate::batch::TexturedBatch;
use crate::pipeline::{textured_pipeline_config, DrawPipeline};
use crate::ring::GeometryRings;
use crate::vertex::TexturedVertex;

/// Batches textured triangles; issues one draw call per run of draws that
/// share a texture.
///
/// Textures are passed as their set-1 descriptor
/// ([`FrameDevice::texture_descriptor`]). A texture drawn in a frame must
/// stay alive until that frame completed, so replace textures through
/// [`cadence_frame::FrameScheduler::retire_texture`].
pub struct TexturedRenderer<D: FrameDevice> {
    pipeline: GraphicsPipeline,
    space: Space,
    batch: TexturedBatch<TexturedVertex>,
    geometry: GeometryRings<D>,
}

impl<D: FrameDevice> TexturedRenderer<D> {
    pub fn new(device: &D, space: Space) -> Result<Self> {
        let pipeline = device.create_graphics_pipeline(&textured_pipeline_config(space))?;
        tracing::debug!(?space, "Textured renderer created");

        Ok(Self {
            pipeline,
            space,
            batch: TexturedBatch::new(),
            geometry: GeometryRings::new("textured vertices", "textured indices"),
        })
    }

    pub fn space(&self) -> Space {
        self.space
    }

    pub fn draw(&mut self, texture: vk::DescriptorSet, vertices: &[TexturedVertex], indices: &[u32]) {
        self.batch.draw(texture, vertices, indices);
    }

    pub fn draw_offset(
        &mut self,
        texture: vk::DescriptorSet,
        vertices: &[TexturedVertex],
        indices: &[u32],
        offset: Vec2,
    ) {
        self.batch.draw_offset(texture, vertices, indices, offset);
    }

    /// Append generated vertices.
    pub fn draw_iter<I>(&mut self, texture: vk::DescriptorSet, vertices: I, indices: &[u32])
    where
        I: IntoIterator<Item = TexturedVertex>,
        I::IntoIter: ExactSizeIterator,
    {
        self.batch.draw_iter(texture, vertices, indices);
    }

    pub fn batch(&self) -> &TexturedBatch<TexturedVertex> {
        &self.batch
    }
}

impl<D: FrameDevice> DrawPipeline<D> for TexturedRenderer<D> {
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
        let batch = self.batch.batch();
        self.geometry.bind(
            device,
            frame_index,
            command_buffer,
            batch.vertices(),
            batch.indices(),
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
            for range in self.batch.ranges() {
                device.bind_descriptor_set(params.command_buffer, &self.pipeline, 1, range.texture);
                device.draw_indexed(
                    params.command_buffer,
                    range.range.index_count,
                    range.range.first_index,
                    0,
                );
            }
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
    use cadence_core::{Colour, MAX_FRAMES_IN_FLIGHT};
    use cadence_frame::testing::{SimCall, SimDevice};
    use cadence_frame::{FrameScheduler, SchedulerConfig};
    use std::time::Duration;

    fn quad() -> [TexturedVertex; 4] {
        [
            TexturedVertex::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0), Colour::WHITE),
            TexturedVertex::new(Vec2::new(1.0, 0.0), Vec2::new(1.0, 0.0), Colour::WHITE),
            TexturedVertex::new(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0), Colour::WHITE),
            TexturedVertex::new(Vec2::new(0.0, 1.0), Vec2::new(0.0, 1.0), Colour::WHITE),
        ]
    }

    const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

    #[tokio::test(start_paused = true)]
    async fn one_draw_call_per_texture_run() {
        let sim = SimDevice::new();
        sim.set_auto_complete(true);
        let mut scheduler = FrameScheduler::new(sim.clone(), SchedulerConfig::default()).unwrap();
        let mut textured = TexturedRenderer::new(scheduler.device(), Space::Screen).unwrap();

        let a = sim.create_texture(1, 1, &[255; 4], "a").unwrap();
        let b = sim.create_texture(1, 1, &[0; 4], "b").unwrap();
        let (da, db) = (sim.texture_descriptor(&a), sim.texture_descriptor(&b));

        scheduler.start(None).await.unwrap();
        sim.clear_calls();
        textured.draw(da, &quad(), &QUAD_INDICES);
        textured.draw_offset(da, &quad(), &QUAD_INDICES, Vec2::new(1.0, 0.0));
        textured.draw(db, &quad(), &QUAD_INDICES);
        textured.draw(da, &quad(), &QUAD_INDICES);
        textured.flush(&scheduler).unwrap();
        scheduler.submit_and_present().unwrap();

        let recorded: Vec<SimCall> = sim
            .calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call,
                    SimCall::BindDescriptorSet { set_index: 1, .. } | SimCall::DrawIndexed { .. }
                )
            })
            .collect();
        assert_eq!(
            recorded,
            vec![
                SimCall::BindDescriptorSet { set_index: 1, set: da },
                SimCall::DrawIndexed { index_count: 12, first_index: 0, vertex_offset: 0 },
                SimCall::BindDescriptorSet { set_index: 1, set: db },
                SimCall::DrawIndexed { index_count: 6, first_index: 12, vertex_offset: 0 },
                SimCall::BindDescriptorSet { set_index: 1, set: da },
                SimCall::DrawIndexed { index_count: 6, first_index: 18, vertex_offset: 0 },
            ]
        );

        scheduler.shutdown().unwrap();
        textured.destroy(scheduler.device()).unwrap();
        sim.destroy_texture(a).unwrap();
        sim.destroy_texture(b).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn texture_swaps_under_a_slow_gpu_are_safe() {
        let sim = SimDevice::new();
        let mut scheduler = FrameScheduler::new(sim.clone(), SchedulerConfig::default()).unwrap();
        let mut textured = TexturedRenderer::new(scheduler.device(), Space::World).unwrap();

        let gpu = {
            let sim = sim.clone();
            tokio::spawn(async move {
                for delay in [4, 9, 2, 13].iter().cycle() {
                    tokio::time::sleep(Duration::from_millis(*delay)).await;
                    sim.complete_oldest();
                }
            })
        };

        let mut texture = sim.create_texture(1, 1, &[255; 4], "frame 0").unwrap();
        for frame in 0..20u32 {
            scheduler.start(None).await.unwrap();

            // Growing geometry forces ring buffers to be replaced
            let count = frame as usize + 1;
            for i in 0..count {
                textured.draw_offset(
                    sim.texture_descriptor(&texture),
                    &quad(),
                    &QUAD_INDICES,
                    Vec2::new(i as f32, 0.0),
                );
            }
            textured.flush(&scheduler).unwrap();

            // Replace the texture every other frame while it is in flight
            if frame % 2 == 1 {
                let replacement = sim
                    .create_texture(1, 1, &[frame as u8; 4], "replacement")
                    .unwrap();
                scheduler.retire_texture(std::mem::replace(&mut texture, replacement));
            }
            scheduler.submit_and_present().unwrap();
        }
        gpu.abort();

        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
        assert!(sim.destroyed_textures().len() >= 10 - MAX_FRAMES_IN_FLIGHT);

        scheduler.shutdown().unwrap();
        assert_eq!(sim.destroyed_textures().len(), 10);
        textured.destroy(scheduler.device()).unwrap();
        sim.destroy_texture(texture).unwrap();
        assert_eq!(sim.live_buffers(), 0);
        assert_eq!(sim.live_textures(), 0);
    }
}
