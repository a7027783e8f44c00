//! Material definitions and MTL conversion.

use glam::Vec3;

/// Phong material coefficients parsed from an MTL file.
///
/// The overlay mutates these at runtime, so they are plain public
/// fields rather than accessor-wrapped state.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Ambient reflectivity (Ka)
    pub ambient: Vec3,
    /// Diffuse reflectivity (Kd)
    pub diffuse: Vec3,
    /// Specular reflectivity (Ks)
    pub specular: Vec3,
    /// Emissive color (Ke)
    pub emission: Vec3,
    /// Specular exponent (Ns)
    pub shininess: f32,
    /// Dissolve / opacity (d)
    pub dissolve: f32,
    /// Transmission filter (Tf)
    pub transmission_filter: Vec3,
    /// Index of refraction (Ni)
    pub optical_density: f32,
    /// Illumination model (illum)
    pub illumination_model: u8,
    /// Diffuse texture map filename (map_Kd), if any.
    pub diffuse_texture: Option<String>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: Vec3::splat(0.2),
            diffuse: Vec3::splat(0.7),
            specular: Vec3::splat(0.2),
            emission: Vec3::ZERO,
            shininess: 0.0,
            dissolve: 0.0,
            transmission_filter: Vec3::ONE,
            optical_density: 1.0,
            illumination_model: 0,
            diffuse_texture: None,
        }
    }
}

impl Material {
    /// Converts a parsed MTL material, filling absent fields with the
    /// defaults above.
    pub fn from_obj_material(material: &tobj::Material) -> Self {
        let defaults = Self::default();
        Self {
            ambient: material.ambient.map_or(defaults.ambient, Vec3::from),
            diffuse: material.diffuse.map_or(defaults.diffuse, Vec3::from),
            specular: material.specular.map_or(defaults.specular, Vec3::from),
            // tobj leaves Ke in the unknown-parameter bag.
            emission: material
                .unknown_param
                .get("Ke")
                .and_then(parse_vec3)
                .unwrap_or(defaults.emission),
            shininess: material.shininess.unwrap_or(defaults.shininess),
            dissolve: material.dissolve.unwrap_or(defaults.dissolve),
            transmission_filter: material
                .unknown_param
                .get("Tf")
                .and_then(parse_vec3)
                .unwrap_or(defaults.transmission_filter),
            optical_density: material
                .optical_density
                .unwrap_or(defaults.optical_density),
            illumination_model: material
                .illumination_model
                .unwrap_or(defaults.illumination_model),
            diffuse_texture: material.diffuse_texture.clone(),
        }
    }
}

/// Parses "r g b" from an MTL statement value.
fn parse_vec3(value: &String) -> Option<Vec3> {
    let mut components = value.split_whitespace().map(str::parse::<f32>);
    let x = components.next()?.ok()?;
    let y = components.next()?.ok()?;
    let z = components.next()?.ok()?;
    Some(Vec3::new(x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_material_coefficients() {
        let material = Material::default();
        assert_eq!(material.ambient, Vec3::new(0.2, 0.2, 0.2));
        assert_eq!(material.diffuse, Vec3::new(0.7, 0.7, 0.7));
        assert_eq!(material.specular, Vec3::new(0.2, 0.2, 0.2));
        assert_eq!(material.emission, Vec3::ZERO);
        assert_eq!(material.shininess, 0.0);
        assert_eq!(material.dissolve, 0.0);
        assert_eq!(material.transmission_filter, Vec3::ONE);
        assert_eq!(material.optical_density, 1.0);
        assert_eq!(material.illumination_model, 0);
        assert!(material.diffuse_texture.is_none());
    }

    #[test]
    fn test_from_empty_obj_material_uses_defaults() {
        let empty = tobj::Material::default();
        let material = Material::from_obj_material(&empty);
        assert_eq!(material, Material::default());
    }

    #[test]
    fn test_from_obj_material_maps_fields() {
        let mut obj = tobj::Material::default();
        obj.ambient = Some([0.1, 0.2, 0.3]);
        obj.diffuse = Some([0.4, 0.5, 0.6]);
        obj.specular = Some([0.7, 0.8, 0.9]);
        obj.shininess = Some(32.0);
        obj.dissolve = Some(1.0);
        obj.unknown_param
            .insert("Ke".to_string(), "1 0.5 0.25".to_string());

        let material = Material::from_obj_material(&obj);
        assert_eq!(material.ambient, Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(material.diffuse, Vec3::new(0.4, 0.5, 0.6));
        assert_eq!(material.specular, Vec3::new(0.7, 0.8, 0.9));
        assert_eq!(material.emission, Vec3::new(1.0, 0.5, 0.25));
        assert_eq!(material.shininess, 32.0);
        assert_eq!(material.dissolve, 1.0);
    }

    #[test]
    fn test_parse_vec3() {
        assert_eq!(
            parse_vec3(&"0.5 0.25 1".to_string()),
            Some(Vec3::new(0.5, 0.25, 1.0))
        );
        assert_eq!(parse_vec3(&"0.5 nope 1".to_string()), None);
        assert_eq!(parse_vec3(&"0.5".to_string()), None);
    }
}
