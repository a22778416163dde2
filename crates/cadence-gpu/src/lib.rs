//! Vulkan abstraction layer for the Cadence renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Command buffers, fences and semaphores
//! - Swapchain, render pass and framebuffers
//! - Graphics pipelines, descriptor sets and sampled textures

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_sampled_image, write_sampler, write_uniform_buffer, DescriptorPool,
    DescriptorSetLayoutBuilder,
};
pub use error::{GpuError, Result, VkResultExt};
pub use memory::{AllocationStats, GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{BlendMode, GraphicsPipeline, GraphicsPipelineConfig};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
pub use sync::{create_fence, create_semaphore};
pub use texture::GpuTexture;
