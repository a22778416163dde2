//! Descriptor set management.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;

/// Descriptor set layout builder.
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    /// Add a sampled image binding (no sampler attached).
    pub fn sampled_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::SAMPLED_IMAGE, 1, stage_flags)
    }

    /// Add a standalone sampler binding.
    pub fn sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::SAMPLER, 1, stage_flags)
    }

    /// Number of bindings added so far.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no bindings were added.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        device
            .create_descriptor_set_layout(&layout_info, None)
            .context("vkCreateDescriptorSetLayout")
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-budget pool for allocating descriptor sets.
///
/// The pool tracks how many sets are live and refuses to go past
/// `max_sets` with [`GpuError::DescriptorBudgetExceeded`] instead of
/// letting the driver fail with `ERROR_OUT_OF_POOL_MEMORY`.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    budget: u32,
    used: u32,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = device
            .create_descriptor_pool(&create_info, None)
            .context("vkCreateDescriptorPool")?;

        Ok(Self {
            pool,
            budget: max_sets,
            used: 0,
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Sets currently allocated from this pool.
    pub fn used(&self) -> u32 {
        self.used
    }

    /// Maximum number of live sets.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Allocate one descriptor set per layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &mut self,
        device: &ash::Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let requested = layouts.len() as u32;
        check_budget(self.used, requested, self.budget)?;

        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = device
            .allocate_descriptor_sets(&alloc_info)
            .context("vkAllocateDescriptorSets")?;
        self.used += requested;
        Ok(sets)
    }

    /// Return descriptor sets to the pool.
    ///
    /// # Safety
    /// The sets must come from this pool and must not be referenced by
    /// pending command buffers.
    pub unsafe fn free(&mut self, device: &ash::Device, sets: &[vk::DescriptorSet]) -> Result<()> {
        if sets.is_empty() {
            return Ok(());
        }
        device
            .free_descriptor_sets(self.pool, sets)
            .context("vkFreeDescriptorSets")?;
        self.used = self.used.saturating_sub(sets.len() as u32);
        Ok(())
    }

    /// Destroy the pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}

fn check_budget(used: u32, requested: u32, budget: u32) -> Result<()> {
    if used.saturating_add(requested) > budget {
        return Err(GpuError::DescriptorBudgetExceeded { used, budget });
    }
    Ok(())
}

/// Write a uniform buffer descriptor.
///
/// # Safety
/// Device and buffer must be valid.
pub unsafe fn write_uniform_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(&buffer_info));

    device.update_descriptor_sets(&[write], &[]);
}

/// Write a sampled image descriptor.
///
/// # Safety
/// Device and image view must be valid.
pub unsafe fn write_sampled_image(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
        .image_info(std::slice::from_ref(&image_info));

    device.update_descriptor_sets(&[write], &[]);
}

/// Write a sampler descriptor.
///
/// # Safety
/// Device and sampler must be valid.
pub unsafe fn write_sampler(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    sampler: vk::Sampler,
) {
    let image_info = vk::DescriptorImageInfo::default().sampler(sampler);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::SAMPLER)
        .image_info(std::slice::from_ref(&image_info));

    device.update_descriptor_sets(&[write], &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_allows_exact_fill() {
        assert!(check_budget(0, 4, 4).is_ok());
        assert!(check_budget(3, 1, 4).is_ok());
    }

    #[test]
    fn budget_rejects_overflow() {
        let err = check_budget(4, 1, 4).unwrap_err();
        assert!(matches!(
            err,
            GpuError::DescriptorBudgetExceeded { used: 4, budget: 4 }
        ));
    }

    #[test]
    fn layout_builder_counts_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .sampled_image(0, vk::ShaderStageFlags::FRAGMENT)
            .sampler(1, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(builder.len(), 2);
        assert!(!builder.is_empty());
    }
}
