//! RHI-specific error types.

use std::time::Duration;

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(ash::vk::Result),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// A resource could not be created
    #[error("Failed to allocate '{label}': {reason}")]
    AllocationFailed { label: String, reason: String },

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline lookup error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// The device was lost or removed; GPU state is unknown
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// A bounded fence wait expired
    #[error("Fence wait for value {value} timed out after {timeout:?} (completed {completed})")]
    FenceTimeout {
        value: u64,
        completed: u64,
        timeout: Duration,
    },

    /// The GPU reported a completed value lower than one already observed
    #[error("Fence completed value went backwards: {observed} < {previous}")]
    FenceRegression { previous: u64, observed: u64 },
}

impl RhiError {
    /// Returns true for errors after which GPU-side state can no longer be trusted.
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            RhiError::DeviceLost(_)
                | RhiError::FenceTimeout { .. }
                | RhiError::FenceRegression { .. }
        )
    }
}

impl From<ash::vk::Result> for RhiError {
    fn from(result: ash::vk::Result) -> Self {
        match result {
            ash::vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost(result.to_string()),
            other => RhiError::VulkanError(other),
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
