//! Resource loading and management.
//!
//! This crate handles loading of external assets:
//! - OBJ model loading with vertex deduplication
//! - Image/texture decoding
//! - Material definitions

mod error;

pub mod material;
pub mod model;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use material::Material;
pub use model::Model;
pub use texture::TextureData;
