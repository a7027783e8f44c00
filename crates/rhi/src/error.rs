//! Error types for the Vulkan abstraction layer.

use ash::vk;
use thiserror::Error;

/// Errors produced by the RHI layer.
#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan API error: {0}")]
    VulkanError(#[from] vk::Result),

    #[error("Failed to load Vulkan library: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    #[error("No suitable memory type for filter {type_filter:#034b} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("Unsupported image layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    #[error("No supported format among candidates: {0}")]
    UnsupportedFormat(String),

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = Result<T, RhiError>;
