//! Renderer error types.

use thiserror::Error;

use pbr_resources::ResourceError;
use pbr_rhi::RhiError;

/// Errors surfaced by the frame pipeline.
#[derive(Error, Debug)]
pub enum RendererError {
    /// GPU backend failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Scene resource failure
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] pbr_core::Error),

    /// A render item referenced something the scene does not hold
    #[error("Invalid render item '{name}': {reason}")]
    InvalidItem { name: String, reason: String },
}

impl RendererError {
    /// Returns true if the GPU state can no longer be trusted and the frame
    /// loop must stop.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RendererError::Rhi(err) if err.is_device_lost())
    }
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;
