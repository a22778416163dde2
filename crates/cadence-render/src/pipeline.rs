//! The contract shared by drawing pipelines, and their pipeline configs.

use ash::vk;
use cadence_frame::{FrameDevice, FrameResult, FrameScheduler, RenderParameters};
use cadence_gpu::{BlendMode, GraphicsPipeline, GraphicsPipelineConfig, Result};
use cadence_shaders::Space;

use crate::vertex::{MeshVertex, TexturedVertex, Vertex};

/// A pipeline that accumulates draws during a frame and records them in one
/// go.
pub trait DrawPipeline<D: FrameDevice> {
    fn pipeline(&self) -> &GraphicsPipeline;

    /// Whether nothing was drawn since the last `render`.
    fn is_empty(&self) -> bool;

    /// Upload the accumulated geometry into the buffers of `frame_index` and
    /// bind them. Returns `false`, doing nothing, if nothing was drawn.
    fn bind(
        &mut self,
        device: &D,
        frame_index: usize,
        command_buffer: vk::CommandBuffer,
    ) -> Result<bool>;

    /// `bind`, one draw call per batch, then clear the accumulation for the
    /// next frame.
    ///
    /// Records at most once per frame: the slot's geometry buffers hold a
    /// single upload, so a second `render` with draws in the same frame
    /// fails instead of overwriting what the first one recorded.
    fn render(&mut self, params: &RenderParameters<'_, D>) -> Result<()>;

    /// Destroy GPU resources. The GPU must be idle.
    fn destroy(&mut self, device: &D) -> Result<()>;

    /// Bind the pipeline through the scheduler and render, skipping both if
    /// nothing was drawn. Flush each renderer once per frame, after all of
    /// its draws.
    fn flush(&mut self, scheduler: &FrameScheduler<D>) -> FrameResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        let pipeline = *self.pipeline();
        let params = scheduler.bind(&pipeline)?;
        self.render(&params)?;
        Ok(())
    }
}

/// Flat-coloured triangles in the given space.
pub fn mesh_pipeline_config(space: Space) -> GraphicsPipelineConfig {
    GraphicsPipelineConfig {
        label: match space {
            Space::World => "mesh (world)",
            Space::Screen => "mesh (screen)",
        },
        vertex_shader: cadence_shaders::mesh_vert(space).to_vec(),
        fragment_shader: cadence_shaders::mesh_frag().to_vec(),
        vertex_bindings: vec![MeshVertex::binding()],
        vertex_attributes: MeshVertex::attributes(),
        blend: BlendMode::Alpha,
        ..Default::default()
    }
}

/// Textured, tinted triangles in the given space. Declares set 1 for the
/// texture and its sampler.
pub fn textured_pipeline_config(space: Space) -> GraphicsPipelineConfig {
    GraphicsPipelineConfig {
        label: match space {
            Space::World => "textured (world)",
            Space::Screen => "textured (screen)",
        },
        vertex_shader: cadence_shaders::textured_vert(space).to_vec(),
        fragment_shader: cadence_shaders::textured_frag().to_vec(),
        vertex_bindings: vec![TexturedVertex::binding()],
        vertex_attributes: TexturedVertex::attributes(),
        blend: BlendMode::Alpha,
        textured: true,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configs_declare_their_descriptor_sets() {
        let mesh = mesh_pipeline_config(Space::World);
        assert_eq!(mesh.descriptor_set_count(), 1);
        assert_eq!(mesh.vertex_attributes.len(), 2);

        let textured = textured_pipeline_config(Space::Screen);
        assert_eq!(textured.descriptor_set_count(), 2);
        assert_eq!(textured.vertex_bindings[0].stride, 32);
        assert_eq!(
            textured.vertex_shader,
            cadence_shaders::textured_vert(Space::Screen)
        );
    }
}
