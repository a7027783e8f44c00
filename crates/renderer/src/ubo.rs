//! Per-frame uniform payload.
//!
//! [`SceneUbo`] mirrors the uniform block both shader pairs consume.
//! The layout is a binary contract with the compiled shaders: field
//! order, 16-byte vector slots, and the trailing padding are all load
//! bearing. The tests below pin every offset.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec4};

/// Uniform block shared by the geometry and lighting shader pairs.
///
/// std140 layout, 368 bytes:
///
/// | Offset | Field              |
/// |--------|--------------------|
/// | 0      | model              |
/// | 64     | view               |
/// | 128    | proj               |
/// | 192    | light              |
/// | 256    | ambient_color      |
/// | 272    | diffuse_color      |
/// | 288    | specular_color     |
/// | 304    | emission_color     |
/// | 320    | shininess          |
/// | 324    | model_stage_on     |
/// | 328    | texture_stage_on   |
/// | 332    | lighting_stage_on  |
/// | 336    | specular_on        |
/// | 340    | diffuse_on         |
/// | 344    | ambient_on         |
/// | 348    | display_mode       |
/// | 352    | win_dim            |
/// | 360    | padding            |
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct SceneUbo {
    /// Object-to-world transform.
    pub model: Mat4,
    /// World-to-camera transform.
    pub view: Mat4,
    /// Camera-to-clip transform.
    pub proj: Mat4,
    /// Light-space transform (light position folded into column 3).
    pub light: Mat4,
    /// Ambient reflectivity (Ka), w unused.
    pub ambient_color: Vec4,
    /// Diffuse reflectivity (Kd), w unused.
    pub diffuse_color: Vec4,
    /// Specular reflectivity (Ks), w unused.
    pub specular_color: Vec4,
    /// Emissive color (Ke), w unused.
    pub emission_color: Vec4,
    /// Specular exponent (Ns).
    pub shininess: f32,
    /// Apply the model transform (bool as i32).
    pub model_stage_on: i32,
    /// Sample the diffuse texture.
    pub texture_stage_on: i32,
    /// Run the lighting computation.
    pub lighting_stage_on: i32,
    /// Include the specular term.
    pub specular_on: i32,
    /// Include the diffuse term.
    pub diffuse_on: i32,
    /// Include the ambient term.
    pub ambient_on: i32,
    /// G-buffer visualization selection.
    pub display_mode: i32,
    /// Framebuffer size in pixels, for depth linearization.
    pub win_dim: Vec2,
    /// Pads the block to a 16-byte multiple.
    pub _padding: [f32; 2],
}

impl SceneUbo {
    /// Size of the block in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Returns the payload as raw bytes for a uniform buffer write.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_scene_ubo_size() {
        assert_eq!(SceneUbo::SIZE, 368);
    }

    #[test]
    fn test_scene_ubo_matrix_offsets() {
        assert_eq!(offset_of!(SceneUbo, model), 0);
        assert_eq!(offset_of!(SceneUbo, view), 64);
        assert_eq!(offset_of!(SceneUbo, proj), 128);
        assert_eq!(offset_of!(SceneUbo, light), 192);
    }

    #[test]
    fn test_scene_ubo_material_offsets() {
        assert_eq!(offset_of!(SceneUbo, ambient_color), 256);
        assert_eq!(offset_of!(SceneUbo, diffuse_color), 272);
        assert_eq!(offset_of!(SceneUbo, specular_color), 288);
        assert_eq!(offset_of!(SceneUbo, emission_color), 304);
        assert_eq!(offset_of!(SceneUbo, shininess), 320);
    }

    #[test]
    fn test_scene_ubo_toggle_offsets() {
        assert_eq!(offset_of!(SceneUbo, model_stage_on), 324);
        assert_eq!(offset_of!(SceneUbo, texture_stage_on), 328);
        assert_eq!(offset_of!(SceneUbo, lighting_stage_on), 332);
        assert_eq!(offset_of!(SceneUbo, specular_on), 336);
        assert_eq!(offset_of!(SceneUbo, diffuse_on), 340);
        assert_eq!(offset_of!(SceneUbo, ambient_on), 344);
        assert_eq!(offset_of!(SceneUbo, display_mode), 348);
        assert_eq!(offset_of!(SceneUbo, win_dim), 352);
    }

    #[test]
    fn test_scene_ubo_round_trips_through_bytes() {
        let ubo = SceneUbo {
            shininess: 32.0,
            display_mode: 2,
            win_dim: Vec2::new(1920.0, 1080.0),
            ..Default::default()
        };
        let bytes = ubo.as_bytes();
        assert_eq!(bytes.len(), SceneUbo::SIZE);

        let restored: &SceneUbo = bytemuck::from_bytes(bytes);
        assert_eq!(restored.shininess, 32.0);
        assert_eq!(restored.display_mode, 2);
        assert_eq!(restored.win_dim, Vec2::new(1920.0, 1080.0));
    }
}
