//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error without call-site information.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// A wrapped Vulkan call returned a non-success status.
    #[error("{call} failed: {result}")]
    Call {
        call: &'static str,
        result: vk::Result,
    },

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The fixed descriptor set budget of a pool is exhausted.
    #[error("Descriptor budget exceeded: {used} of {budget} sets in use")]
    DescriptorBudgetExceeded { used: u32, budget: u32 },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Status code carried by this error, if it came from a Vulkan call.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::Vulkan(result) | Self::Call { result, .. } => Some(*result),
            _ => None,
        }
    }

    /// Whether the device was lost. Nothing recorded on it can be recovered.
    pub fn is_device_lost(&self) -> bool {
        self.vk_result() == Some(vk::Result::ERROR_DEVICE_LOST)
    }
}

/// Attach the name of the failing call to a raw Vulkan result.
pub trait VkResultExt<T> {
    fn context(self, call: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    #[inline]
    fn context(self, call: &'static str) -> Result<T> {
        self.map_err(|result| GpuError::Call { call, result })
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_call_site_and_status() {
        let raw: std::result::Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = raw.context("vkQueueSubmit").unwrap_err();

        assert!(err.is_device_lost());
        assert_eq!(
            err.to_string(),
            format!("vkQueueSubmit failed: {}", vk::Result::ERROR_DEVICE_LOST)
        );
    }

    #[test]
    fn non_vulkan_errors_have_no_status() {
        let err = GpuError::DescriptorBudgetExceeded { used: 8, budget: 8 };
        assert_eq!(err.vk_result(), None);
        assert!(!err.is_device_lost());
    }
}
