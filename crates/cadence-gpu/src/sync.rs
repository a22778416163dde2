//! Synchronization primitives.

use crate::error::{Result, VkResultExt};
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    device
        .create_semaphore(&create_info, None)
        .context("vkCreateSemaphore")
}

/// Create a fence.
///
/// Frame fences start signaled so the first wait on each slot returns at once.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    device
        .create_fence(&create_info, None)
        .context("vkCreateFence")
}

/// Poll a fence without blocking. Returns `true` once it is signaled.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn fence_status(device: &ash::Device, fence: vk::Fence) -> Result<bool> {
    device.get_fence_status(fence).context("vkGetFenceStatus")
}

/// Wait for fences to be signaled.
///
/// # Safety
/// The device and fences must be valid.
pub unsafe fn wait_for_fences(
    device: &ash::Device,
    fences: &[vk::Fence],
    timeout_ns: u64,
) -> Result<()> {
    if fences.is_empty() {
        return Ok(());
    }
    device
        .wait_for_fences(fences, true, timeout_ns)
        .context("vkWaitForFences")
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid, and the fence must not belong to a
/// pending submission.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence]).context("vkResetFences")
}
