//! Mesh vertex data
//!
//! Meshes are stored non-interleaved and only interleaved when packed into a
//! batch, so the same base mesh can be spawned for many entities.

use crate::memory::Pack;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Float counts of each interleaved vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexFormat {
    pub position: usize,
    pub uv: usize,
    pub normal: usize,
}

impl VertexFormat {
    /// Engine default: position(3) uv(2) normal(3).
    pub const POSITION_UV_NORMAL: Self = Self {
        position: 3,
        uv: 2,
        normal: 3,
    };

    /// Floats per vertex.
    pub const fn stride(&self) -> usize {
        self.position + self.uv + self.normal
    }

    pub const fn attribute_sizes(&self) -> [usize; 3] {
        [self.position, self.uv, self.normal]
    }
}

/// One interleaved vertex in [`VertexFormat::POSITION_UV_NORMAL`] layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
}

/// Base mesh data. Missing uvs or normals are packed as zeros.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub normals: Vec<Vec3>,
}

impl MeshData {
    pub fn new(positions: Vec<Vec3>, uvs: Vec<Vec2>, normals: Vec<Vec3>) -> Self {
        Self {
            positions,
            uvs,
            normals,
        }
    }

    /// Axis-aligned quad facing +Z as two triangles.
    pub fn quad(center: Vec3, half_extent: f32) -> Self {
        let corners = [
            (Vec2::new(-1.0, -1.0), Vec2::new(0.0, 1.0)),
            (Vec2::new(1.0, -1.0), Vec2::new(1.0, 1.0)),
            (Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0)),
            (Vec2::new(-1.0, 1.0), Vec2::new(0.0, 0.0)),
        ];
        let mut mesh = Self::default();
        for i in [0, 1, 2, 0, 2, 3] {
            let (offset, uv) = corners[i];
            mesh.positions
                .push(center + (offset * half_extent).extend(0.0));
            mesh.uvs.push(uv);
            mesh.normals.push(Vec3::Z);
        }
        mesh
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Copy of this mesh moved by `offset`.
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            positions: self.positions.iter().map(|p| *p + offset).collect(),
            ..self.clone()
        }
    }

    pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.positions.iter().enumerate().map(|(i, position)| Vertex {
            position: position.to_array(),
            uv: self.uvs.get(i).copied().unwrap_or(Vec2::ZERO).to_array(),
            normal: self.normals.get(i).copied().unwrap_or(Vec3::ZERO).to_array(),
        })
    }
}

impl Pack<f32> for MeshData {
    fn pack(&self) -> Vec<f32> {
        let vertices: Vec<Vertex> = self.vertices().collect();
        bytemuck::cast_slice(&vertices).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_matches_format() {
        let format = VertexFormat::POSITION_UV_NORMAL;
        assert_eq!(format.stride(), 8);
        assert_eq!(
            std::mem::size_of::<Vertex>(),
            format.stride() * std::mem::size_of::<f32>()
        );
    }

    #[test]
    fn test_pack_interleaves_and_zero_fills() {
        let mesh = MeshData::new(
            vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0)],
            vec![Vec2::new(0.5, 0.25)],
            vec![],
        );
        assert_eq!(
            mesh.pack(),
            vec![
                1.0, 2.0, 3.0, 0.5, 0.25, 0.0, 0.0, 0.0, //
                4.0, 5.0, 6.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            ]
        );
    }

    #[test]
    fn test_quad_is_two_triangles() {
        let quad = MeshData::quad(Vec3::ZERO, 1.0).translated(Vec3::X);
        assert_eq!(quad.vertex_count(), 6);
        assert_eq!(quad.pack().len(), 6 * VertexFormat::POSITION_UV_NORMAL.stride());
        assert_eq!(quad.positions[0], Vec3::new(0.0, -1.0, 0.0));
    }
}
