//! OBJ model loading with vertex deduplication.

use std::collections::HashMap;
use std::path::Path;

use deferred_rhi::vertex::{Vertex, VertexKey};
use glam::{Vec2, Vec3};
use tracing::{info, warn};

use crate::error::{ResourceError, ResourceResult};
use crate::material::Material;

/// A loaded model: deduplicated vertices, indices into them, and the
/// material coefficients of its first MTL material.
#[derive(Debug, Clone)]
pub struct Model {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material: Material,
}

impl Model {
    /// Loads a model from an OBJ file.
    ///
    /// Faces are triangulated, texture coordinates are flipped into
    /// Vulkan's top-left origin, and identical vertices shared between
    /// faces collapse to one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, fails to parse, or
    /// contains no triangle geometry.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let options = tobj::LoadOptions {
            triangulate: true,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        };
        let (models, materials) = tobj::load_obj(path, &options)?;

        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut seen: HashMap<VertexKey, u32> = HashMap::new();

        for model in &models {
            let mesh = &model.mesh;
            for face_vertex in 0..mesh.indices.len() {
                let vertex = assemble_vertex(mesh, face_vertex);
                push_deduplicated(vertex, &mut vertices, &mut indices, &mut seen);
            }
        }

        if indices.is_empty() {
            return Err(ResourceError::NoGeometry(path.to_path_buf()));
        }

        let material = match materials {
            Ok(list) => models
                .iter()
                .find_map(|m| m.mesh.material_id)
                .and_then(|id| list.get(id))
                .map(Material::from_obj_material)
                .unwrap_or_default(),
            Err(e) => {
                warn!("Failed to load MTL for {:?}, using defaults: {}", path, e);
                Material::default()
            }
        };

        info!(
            "Loaded model {:?}: {} vertices, {} indices ({} deduplicated)",
            path,
            vertices.len(),
            indices.len(),
            indices.len() - vertices.len()
        );

        Ok(Self {
            vertices,
            indices,
            material,
        })
    }

    /// Number of triangles in the model.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Builds the vertex referenced by the mesh's `face_vertex`-th index.
///
/// OBJ indexes position, texcoord and normal independently, so each
/// attribute goes through its own index stream.
fn assemble_vertex(mesh: &tobj::Mesh, face_vertex: usize) -> Vertex {
    let pi = mesh.indices[face_vertex] as usize;
    let position = Vec3::new(
        mesh.positions[3 * pi],
        mesh.positions[3 * pi + 1],
        mesh.positions[3 * pi + 2],
    );

    let tex_coord = if mesh.texcoord_indices.is_empty() {
        Vec2::ZERO
    } else {
        let ti = mesh.texcoord_indices[face_vertex] as usize;
        // OBJ puts V's origin at the bottom, Vulkan at the top.
        Vec2::new(mesh.texcoords[2 * ti], 1.0 - mesh.texcoords[2 * ti + 1])
    };

    let normal = if mesh.normal_indices.is_empty() {
        Vec3::ZERO
    } else {
        let ni = mesh.normal_indices[face_vertex] as usize;
        Vec3::new(
            mesh.normals[3 * ni],
            mesh.normals[3 * ni + 1],
            mesh.normals[3 * ni + 2],
        )
        .normalize_or_zero()
    };

    Vertex::new(position, Vec3::ONE, tex_coord, normal)
}

/// Appends a vertex, reusing an earlier index when an identical vertex
/// was already emitted.
fn push_deduplicated(
    vertex: Vertex,
    vertices: &mut Vec<Vertex>,
    indices: &mut Vec<u32>,
    seen: &mut HashMap<VertexKey, u32>,
) {
    let index = *seen.entry(vertex.key()).or_insert_with(|| {
        vertices.push(vertex);
        (vertices.len() - 1) as u32
    });
    indices.push(index);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(position: Vec3, tex_coord: Vec2, normal: Vec3) -> Vertex {
        Vertex::new(position, Vec3::ONE, tex_coord, normal)
    }

    #[test]
    fn test_identical_vertices_share_index() {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut seen = HashMap::new();

        let v = vertex(Vec3::new(1.0, 2.0, 3.0), Vec2::new(0.5, 0.5), Vec3::Z);
        push_deduplicated(v, &mut vertices, &mut indices, &mut seen);
        push_deduplicated(v, &mut vertices, &mut indices, &mut seen);

        assert_eq!(vertices.len(), 1);
        assert_eq!(indices, vec![0, 0]);
    }

    #[test]
    fn test_differing_normal_produces_distinct_vertices() {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut seen = HashMap::new();

        let position = Vec3::new(1.0, 2.0, 3.0);
        let uv = Vec2::new(0.5, 0.5);
        push_deduplicated(vertex(position, uv, Vec3::Z), &mut vertices, &mut indices, &mut seen);
        push_deduplicated(vertex(position, uv, Vec3::Y), &mut vertices, &mut indices, &mut seen);

        assert_eq!(vertices.len(), 2);
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_assemble_vertex_flips_v() {
        let mesh = tobj::Mesh {
            positions: vec![0.0, 0.0, 0.0],
            texcoords: vec![0.25, 0.75],
            indices: vec![0],
            texcoord_indices: vec![0],
            ..Default::default()
        };

        let v = assemble_vertex(&mesh, 0);
        assert_eq!(v.tex_coord, Vec2::new(0.25, 0.25));
        assert_eq!(v.color, Vec3::ONE);
    }

    #[test]
    fn test_assemble_vertex_normalizes_normal() {
        let mesh = tobj::Mesh {
            positions: vec![0.0, 0.0, 0.0],
            normals: vec![0.0, 3.0, 0.0],
            indices: vec![0],
            normal_indices: vec![0],
            ..Default::default()
        };

        let v = assemble_vertex(&mesh, 0);
        assert_eq!(v.normal, Vec3::Y);
        assert_eq!(v.tex_coord, Vec2::ZERO);
    }
}
