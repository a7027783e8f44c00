//! Error type for the renderer layer.

use thiserror::Error;

/// Aggregates the failure modes of the layers below the renderer.
///
/// Everything here is fatal to the frame loop; transient presentation
/// staleness is handled internally by the recreate path and never
/// surfaces as an error.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] deferred_rhi::RhiError),

    #[error(transparent)]
    Resource(#[from] deferred_resources::ResourceError),

    #[error(transparent)]
    Platform(#[from] deferred_core::Error),
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;
