//! Two-subpass deferred renderer.
//!
//! The geometry subpass rasterizes the scene into a G-buffer (albedo,
//! normal, depth); the lighting subpass reads it back through input
//! attachments and shades a fullscreen triangle. An overlay pass then
//! draws the egui controls on top of the composed image.

mod error;
mod frame_sync;
mod gbuffer;
mod renderer;
mod ubo;

pub use error::{RendererError, RendererResult};
pub use frame_sync::FrameSyncController;
pub use gbuffer::GBuffer;
pub use renderer::{Renderer, RendererConfig};
pub use ubo::SceneUbo;
