//! Presentation render pass and framebuffers.

use crate::error::{Result, VkResultExt};
use ash::vk;

/// Create a render pass with one colour attachment that is cleared on load
/// and left in `PRESENT_SRC_KHR` for presentation.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_present_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> Result<vk::RenderPass> {
    let attachments = [vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

    let colour_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&colour_refs)];

    // Layout transition happens after the presentation engine released the image
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    device
        .create_render_pass(&create_info, None)
        .context("vkCreateRenderPass")
}

/// Create one framebuffer per swapchain image view.
///
/// # Safety
/// The device, render pass and views must be valid.
pub unsafe fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    image_views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for &view in image_views {
        let attachments = [view];
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match device.create_framebuffer(&create_info, None) {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                destroy_framebuffers(device, &framebuffers);
                return Err(e).context("vkCreateFramebuffer");
            }
        }
    }

    Ok(framebuffers)
}

/// Destroy framebuffers.
///
/// # Safety
/// The framebuffers must not be referenced by pending command buffers.
pub unsafe fn destroy_framebuffers(device: &ash::Device, framebuffers: &[vk::Framebuffer]) {
    for &framebuffer in framebuffers {
        device.destroy_framebuffer(framebuffer, None);
    }
}

/// Viewport covering the whole extent with depth range 0..1.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor rectangle covering the whole extent.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let viewport = full_viewport(extent);
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.max_depth, 1.0);

        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.extent, extent);
    }
}
