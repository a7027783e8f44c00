//! Image decoding for texture uploads.

use std::path::Path;

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Decoded RGBA8 pixel data ready for a GPU upload.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    /// Decodes an image file into tightly packed RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be decoded.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let image = image::open(path)?.to_rgba8();
        let (width, height) = image.dimensions();

        info!("Loaded texture {:?}: {}x{}", path, width, height);

        Ok(Self {
            pixels: image.into_raw(),
            width,
            height,
        })
    }

    /// Size of the pixel data in bytes.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_reported() {
        let result = TextureData::load(Path::new("/nonexistent/texture.png"));
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
