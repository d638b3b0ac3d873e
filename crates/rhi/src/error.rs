//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Surface creation or query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A bounded wait expired. Treated as device loss.
    #[error("Timed out waiting for {operation}")]
    Timeout {
        /// The blocking operation that expired.
        operation: &'static str,
    },

    /// The presentation target no longer matches the surface.
    #[error("Presentation target is out of date")]
    OutOfDate,

    /// A descriptor pool has no room left for the requested kind.
    #[error("Descriptor pool exhausted for {kind}")]
    PoolExhausted {
        /// Name of the exhausted descriptor kind, or "sets".
        kind: &'static str,
    },
}

impl RhiError {
    /// Returns true for errors the driver handles by rebuilding the
    /// presentation target. Everything else is fatal.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RhiError::OutOfDate)
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
