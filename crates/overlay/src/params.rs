//! Overlay-controlled renderer parameters.

/// G-buffer visualization selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayMode {
    /// Fully lit composition
    Shaded,
    /// Raw albedo attachment
    Albedo,
    /// Raw normal attachment
    Normal,
    /// Depth attachment
    Depth,
}

impl DisplayMode {
    /// All modes in radio-button order.
    pub const ALL: [DisplayMode; 4] = [
        DisplayMode::Shaded,
        DisplayMode::Albedo,
        DisplayMode::Normal,
        DisplayMode::Depth,
    ];

    /// Value written into the uniform payload.
    #[inline]
    pub fn as_i32(self) -> i32 {
        match self {
            DisplayMode::Shaded => 0,
            DisplayMode::Albedo => 1,
            DisplayMode::Normal => 2,
            DisplayMode::Depth => 3,
        }
    }

    /// Label shown in the overlay.
    pub fn label(self) -> &'static str {
        match self {
            DisplayMode::Shaded => "Shaded",
            DisplayMode::Albedo => "Albedo",
            DisplayMode::Normal => "Normal",
            DisplayMode::Depth => "Depth",
        }
    }
}

/// Interactive state bound to the overlay widgets.
///
/// The renderer reads these every frame when filling the uniform
/// payload; the overlay mutates them through its widgets.
#[derive(Clone, Debug)]
pub struct OverlayParams {
    /// Camera distance from the model.
    pub zoom: f32,
    /// Uniform model scale.
    pub scale: f32,
    /// Apply the model transform stage.
    pub model_stage: bool,
    /// Sample the diffuse texture.
    pub texture_stage: bool,
    /// Run the lighting stage.
    pub lighting_stage: bool,
    /// Include the specular term.
    pub specular: bool,
    /// Include the diffuse term.
    pub diffuse: bool,
    /// Include the ambient term.
    pub ambient: bool,
    /// Ambient reflectivity (Ka), overlay color picker.
    pub ambient_color: [f32; 3],
    /// Diffuse reflectivity (Kd).
    pub diffuse_color: [f32; 3],
    /// Specular reflectivity (Ks).
    pub specular_color: [f32; 3],
    /// Emissive color (Ke).
    pub emission_color: [f32; 3],
    /// Specular exponent (Ns).
    pub shininess: f32,
    /// Which attachment to visualize.
    pub display_mode: DisplayMode,
}

impl Default for OverlayParams {
    fn default() -> Self {
        Self {
            zoom: 10.0,
            scale: 1.0,
            model_stage: false,
            texture_stage: false,
            lighting_stage: false,
            specular: false,
            diffuse: false,
            ambient: false,
            ambient_color: [0.2, 0.2, 0.2],
            diffuse_color: [0.7, 0.7, 0.7],
            specular_color: [0.2, 0.2, 0.2],
            emission_color: [0.0, 0.0, 0.0],
            shininess: 0.0,
            display_mode: DisplayMode::Shaded,
        }
    }
}

impl OverlayParams {
    /// Seeds the color pickers from a loaded material.
    pub fn with_material(
        ambient: [f32; 3],
        diffuse: [f32; 3],
        specular: [f32; 3],
        emission: [f32; 3],
        shininess: f32,
    ) -> Self {
        Self {
            ambient_color: ambient,
            diffuse_color: diffuse,
            specular_color: specular,
            emission_color: emission,
            shininess,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mode_values() {
        assert_eq!(DisplayMode::Shaded.as_i32(), 0);
        assert_eq!(DisplayMode::Albedo.as_i32(), 1);
        assert_eq!(DisplayMode::Normal.as_i32(), 2);
        assert_eq!(DisplayMode::Depth.as_i32(), 3);
    }

    #[test]
    fn test_default_params() {
        let params = OverlayParams::default();
        assert_eq!(params.zoom, 10.0);
        assert_eq!(params.scale, 1.0);
        assert_eq!(params.display_mode, DisplayMode::Shaded);
        assert!(!params.model_stage);
        assert!(!params.lighting_stage);
    }

    #[test]
    fn test_with_material_seeds_pickers() {
        let params = OverlayParams::with_material(
            [0.1, 0.1, 0.1],
            [0.5, 0.5, 0.5],
            [0.9, 0.9, 0.9],
            [0.0, 1.0, 0.0],
            64.0,
        );
        assert_eq!(params.diffuse_color, [0.5, 0.5, 0.5]);
        assert_eq!(params.emission_color, [0.0, 1.0, 0.0]);
        assert_eq!(params.shininess, 64.0);
        assert_eq!(params.zoom, 10.0);
    }
}
