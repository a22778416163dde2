//! Swapchain management.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;

/// Result of asking the presentation engine for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired. `suboptimal` means the swapchain still works
    /// but no longer matches the surface exactly.
    Acquired { image_index: u32, suboptimal: bool },
    /// No image is available yet. Retry later.
    NotReady,
    /// The swapchain no longer matches the surface and must be recreated.
    /// No image was acquired and the semaphore was not signaled.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the swapchain should be recreated.
    Suboptimal,
    /// The swapchain no longer matches the surface.
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swapchain should be rebuilt before the next acquire.
    pub fn needs_recreate(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Swapchain wrapper.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain.
    ///
    /// # Safety
    /// All handles must be valid.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn new(
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Self> {
        let image_count = choose_image_count(surface_capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.unwrap_or(vk::SwapchainKHR::null()));

        let swapchain = swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let images = swapchain_loader
            .get_swapchain_images(swapchain)
            .context("vkGetSwapchainImagesKHR")?;

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            match device.create_image_view(&view_info, None) {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    for &view in &image_views {
                        device.destroy_image_view(view, None);
                    }
                    swapchain_loader.destroy_swapchain(swapchain, None);
                    return Err(e).context("vkCreateImageView");
                }
            }
        }

        tracing::debug!(
            images = images.len(),
            width = extent.width,
            height = extent.height,
            ?present_mode,
            "Created swapchain"
        );

        Ok(Self {
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
        })
    }

    /// Number of presentable images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire the next image without blocking past `timeout_ns`.
    ///
    /// # Safety
    /// All handles must be valid and `semaphore` must be unsignaled with no
    /// pending signal operation.
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome> {
        let result = swapchain_loader.acquire_next_image(
            self.swapchain,
            timeout_ns,
            semaphore,
            vk::Fence::null(),
        );

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(AcquireOutcome::NotReady),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e).context("vkAcquireNextImageKHR"),
        }
    }

    /// Queue an image for presentation.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match swapchain_loader.queue_present(queue, &present_info) {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e).context("vkQueuePresentKHR"),
        }
    }

    /// Destroy the swapchain.
    ///
    /// # Safety
    /// All handles must be valid and swapchain must not be in use.
    pub unsafe fn destroy(
        &self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        swapchain_loader.destroy_swapchain(self.swapchain, None);
    }
}

/// One more image than the minimum, capped by the surface maximum (0 = none).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        wanted.min(capabilities.max_image_count)
    } else {
        wanted
    }
}

/// Select the best surface format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    // Prefer SRGB
    let preferred = available.iter().find(|format| {
        format.format == vk::Format::B8G8R8A8_SRGB
            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    preferred
        .or_else(|| available.first())
        .copied()
        .ok_or_else(|| GpuError::SwapchainCreation("Surface reports no formats".to_string()))
}

/// Select the best present mode.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }

    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        // FIFO is always supported
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_caps(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: current,
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn extent_follows_surface_when_fixed() {
        let fixed = vk::Extent2D {
            width: 640,
            height: 480,
        };
        assert_eq!(calculate_extent(&surface_caps(fixed), 1920, 1080), fixed);
    }

    #[test]
    fn extent_is_clamped_when_surface_defers() {
        let caps = surface_caps(vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        });
        let extent = calculate_extent(&caps, 10_000, 0);
        assert_eq!(extent.width, 4096);
        assert_eq!(extent.height, 1);
    }

    #[test]
    fn image_count_respects_maximum() {
        let mut caps = surface_caps(vk::Extent2D::default());
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn present_mode_selection() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        assert_eq!(select_surface_format(&[unorm, srgb]).unwrap(), srgb);
        assert_eq!(select_surface_format(&[unorm]).unwrap(), unorm);
        assert!(select_surface_format(&[]).is_err());
    }

    #[test]
    fn only_clean_presents_keep_the_swapchain() {
        assert!(!PresentOutcome::Presented.needs_recreate());
        assert!(PresentOutcome::Suboptimal.needs_recreate());
        assert!(PresentOutcome::OutOfDate.needs_recreate());
    }
}
