//! Graphics pipeline creation.

use crate::error::{GpuError, Result};
use ash::vk;

/// How fragment output combines with the colour attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Overwrite the attachment.
    Opaque,
    /// Straight alpha: `src * a + dst * (1 - a)`.
    #[default]
    Alpha,
}

/// Graphics pipeline configuration.
///
/// Descriptor set 0 always holds the coordinate-space uniform block. When
/// `textured` is set, set 1 holds a sampled image and a sampler.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub label: &'static str,
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub blend: BlendMode,
    pub textured: bool,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            label: "pipeline",
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            blend: BlendMode::Alpha,
            textured: false,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Number of descriptor sets the pipeline layout declares.
    pub fn descriptor_set_count(&self) -> u32 {
        if self.textured {
            2
        } else {
            1
        }
    }
}

/// Graphics pipeline wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_sets: u32,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline compatible with `render_pass`, subpass 0.
    ///
    /// Viewport and scissor are dynamic state.
    ///
    /// # Safety
    /// The device must be valid and shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        render_pass: vk::RenderPass,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Self> {
        let vert_shader_info = vk::ShaderModuleCreateInfo::default().code(&config.vertex_shader);
        let vert_module = device
            .create_shader_module(&vert_shader_info, None)
            .map_err(|e| GpuError::ShaderCompilation(format!("{} vertex: {e}", config.label)))?;

        let frag_shader_info = vk::ShaderModuleCreateInfo::default().code(&config.fragment_shader);
        let frag_module = match device.create_shader_module(&frag_shader_info, None) {
            Ok(module) => module,
            Err(e) => {
                device.destroy_shader_module(vert_module, None);
                return Err(GpuError::ShaderCompilation(format!(
                    "{} fragment: {e}",
                    config.label
                )));
            }
        };

        let result = build_pipeline(
            device,
            config,
            render_pass,
            descriptor_set_layouts,
            vert_module,
            frag_module,
        );

        device.destroy_shader_module(vert_module, None);
        device.destroy_shader_module(frag_module, None);

        let (pipeline, layout) = result?;
        tracing::debug!(label = config.label, "Created graphics pipeline");

        Ok(Self {
            pipeline,
            layout,
            descriptor_sets: descriptor_set_layouts.len() as u32,
        })
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

fn colour_blend_attachment(mode: BlendMode) -> vk::PipelineColorBlendAttachmentState {
    let attachment =
        vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);

    match mode {
        BlendMode::Opaque => attachment.blend_enable(false),
        BlendMode::Alpha => attachment
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD),
    }
}

unsafe fn build_pipeline(
    device: &ash::Device,
    config: &GraphicsPipelineConfig,
    render_pass: vk::RenderPass,
    descriptor_set_layouts: &[vk::DescriptorSetLayout],
    vert_module: vk::ShaderModule,
    frag_module: vk::ShaderModule,
) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(c"main"),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&config.vertex_bindings)
        .vertex_attribute_descriptions(&config.vertex_attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(config.topology)
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(config.cull_mode)
        .front_face(config.front_face)
        .depth_bias_enable(false)
        .line_width(1.0);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .sample_shading_enable(false);

    let color_blend_attachments = [colour_blend_attachment(config.blend)];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(descriptor_set_layouts);
    let layout = device
        .create_pipeline_layout(&layout_info, None)
        .map_err(|e| GpuError::PipelineCreation(format!("{} layout: {e}", config.label)))?;

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    match device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None) {
        Ok(pipelines) => Ok((pipelines[0], layout)),
        Err((_, e)) => {
            device.destroy_pipeline_layout(layout, None);
            Err(GpuError::PipelineCreation(format!("{}: {e}", config.label)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textured_pipelines_declare_two_sets() {
        let flat = GraphicsPipelineConfig::default();
        assert_eq!(flat.descriptor_set_count(), 1);

        let textured = GraphicsPipelineConfig {
            textured: true,
            ..Default::default()
        };
        assert_eq!(textured.descriptor_set_count(), 2);
    }

    #[test]
    fn alpha_blend_uses_straight_alpha() {
        let state = colour_blend_attachment(BlendMode::Alpha);
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );

        let opaque = colour_blend_attachment(BlendMode::Opaque);
        assert_eq!(opaque.blend_enable, vk::FALSE);
    }
}
