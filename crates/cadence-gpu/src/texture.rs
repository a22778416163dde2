//! Sampled 2D textures uploaded through a staging buffer.

use crate::command::{execute_single_time_commands, CommandPool};
use crate::context::GpuContext;
use crate::descriptors::{write_sampled_image, write_sampler, DescriptorPool};
use crate::error::{GpuError, Result, VkResultExt};
use crate::memory::{GpuBuffer, GpuImage};
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Texel format used for every texture. Input data is tightly packed RGBA8.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// An image, its view and sampler, and the descriptor set that binds them.
pub struct GpuTexture {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub descriptor_set: vk::DescriptorSet,
    pub width: u32,
    pub height: u32,
}

/// Byte length of a tightly packed RGBA8 image.
pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

fn validate_upload(width: u32, height: u32, rgba: &[u8], max_dimension: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(GpuError::InvalidState(format!(
            "Texture extent {width}x{height} is empty"
        )));
    }
    if width > max_dimension || height > max_dimension {
        return Err(GpuError::InvalidState(format!(
            "Texture extent {width}x{height} exceeds device limit {max_dimension}"
        )));
    }
    let expected = rgba_len(width, height);
    if rgba.len() != expected {
        return Err(GpuError::InvalidState(format!(
            "Texture data is {} bytes, expected {expected}",
            rgba.len()
        )));
    }
    Ok(())
}

impl GpuTexture {
    /// Upload `rgba` into a new device-local texture and allocate its
    /// descriptor set from `descriptor_pool` using `layout`.
    ///
    /// Blocks until the upload has completed on the graphics queue.
    #[allow(clippy::too_many_arguments)]
    pub fn upload(
        gpu: &GpuContext,
        command_pool: &CommandPool,
        descriptor_pool: &mut DescriptorPool,
        layout: vk::DescriptorSetLayout,
        width: u32,
        height: u32,
        rgba: &[u8],
        name: &str,
    ) -> Result<Self> {
        validate_upload(
            width,
            height,
            rgba,
            gpu.capabilities().max_image_dimension_2d,
        )?;
        let device = gpu.device();

        let mut staging = gpu.allocator().lock().create_buffer(
            rgba.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            &format!("{name} staging"),
        )?;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = match gpu
            .allocator()
            .lock()
            .create_image(&image_info, MemoryLocation::GpuOnly, name)
        {
            Ok(image) => image,
            Err(e) => {
                free_staging(gpu, &mut staging);
                return Err(e);
            }
        };

        let uploaded = staging
            .write_bytes(0, rgba)
            .and_then(|()| unsafe {
                execute_single_time_commands(device, command_pool, gpu.graphics_queue(), |cmd| {
                    record_upload(device, cmd, &staging, image.image, width, height);
                })
            });
        free_staging(gpu, &mut staging);

        let mut texture = Self {
            image,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            descriptor_set: vk::DescriptorSet::null(),
            width,
            height,
        };

        let finished = uploaded.and_then(|()| unsafe {
            texture.create_view_and_sampler(device)?;
            texture.descriptor_set = descriptor_pool.allocate(device, &[layout])?[0];
            write_sampled_image(device, texture.descriptor_set, 0, texture.view);
            write_sampler(device, texture.descriptor_set, 1, texture.sampler);
            Ok(())
        });

        if let Err(e) = finished {
            texture.destroy(gpu, descriptor_pool);
            return Err(e);
        }

        tracing::debug!(name, width, height, "Uploaded texture");
        Ok(texture)
    }

    unsafe fn create_view_and_sampler(&mut self, device: &ash::Device) -> Result<()> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(self.image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(colour_range());
        self.view = device
            .create_image_view(&view_info, None)
            .context("vkCreateImageView")?;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(0.0);
        self.sampler = device
            .create_sampler(&sampler_info, None)
            .context("vkCreateSampler")?;

        Ok(())
    }

    /// Release every object owned by the texture.
    ///
    /// The texture must not be referenced by pending command buffers.
    pub fn destroy(&mut self, gpu: &GpuContext, descriptor_pool: &mut DescriptorPool) {
        let device = gpu.device();
        unsafe {
            if self.descriptor_set != vk::DescriptorSet::null() {
                if let Err(e) = descriptor_pool.free(device, &[self.descriptor_set]) {
                    tracing::warn!("Failed to free texture descriptor set: {e}");
                }
                self.descriptor_set = vk::DescriptorSet::null();
            }
            if self.sampler != vk::Sampler::null() {
                device.destroy_sampler(self.sampler, None);
                self.sampler = vk::Sampler::null();
            }
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
                self.view = vk::ImageView::null();
            }
        }
        if let Err(e) = gpu.allocator().lock().free_image(&mut self.image) {
            tracing::warn!("Failed to free texture image: {e}");
        }
    }
}

fn free_staging(gpu: &GpuContext, staging: &mut GpuBuffer) {
    if let Err(e) = gpu.allocator().lock().free_buffer(staging) {
        tracing::warn!("Failed to free staging buffer: {e}");
    }
}

fn colour_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

unsafe fn record_upload(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    staging: &GpuBuffer,
    image: vk::Image,
    width: u32,
    height: u32,
) {
    let to_transfer = vk::ImageMemoryBarrier::default()
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(colour_range())
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

    device.cmd_pipeline_barrier(
        cmd,
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::PipelineStageFlags::TRANSFER,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[to_transfer],
    );

    let region = vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(0)
                .base_array_layer(0)
                .layer_count(1),
        )
        .image_extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        });

    device.cmd_copy_buffer_to_image(
        cmd,
        staging.buffer,
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[region],
    );

    let to_shader = vk::ImageMemoryBarrier::default()
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(colour_range())
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ);

    device.cmd_pipeline_barrier(
        cmd,
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[to_shader],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_len_is_four_bytes_per_texel() {
        assert_eq!(rgba_len(4, 2), 32);
        assert_eq!(rgba_len(0, 16), 0);
    }

    #[test]
    fn upload_validation() {
        assert!(validate_upload(2, 2, &[0; 16], 4096).is_ok());
        assert!(validate_upload(0, 2, &[], 4096).is_err());
        assert!(validate_upload(2, 2, &[0; 15], 4096).is_err());
        assert!(validate_upload(8192, 1, &vec![0; 8192 * 4], 4096).is_err());
    }
}
