// SPDX-License-Identifier: CEPL-1.0
use std::collections::HashMap;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use tracing::info;

use crate::scene::AssetError;

/// Interleaved vertex consumed by the main and shadow pipelines.
/// Locations: 0 = pos, 1 = color, 2 = uv, 3 = normal.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex {
    pub const fn new(pos: [f32; 3], color: [f32; 3], uv: [f32; 2], normal: [f32; 3]) -> Self {
        Self {
            pos,
            color,
            uv,
            normal,
        }
    }

    /// Bit pattern used for deduplication; `-0.0` and `0.0` are distinct.
    fn key(&self) -> [u32; 11] {
        let mut key = [0u32; 11];
        let floats = self
            .pos
            .iter()
            .chain(&self.color)
            .chain(&self.uv)
            .chain(&self.normal);
        for (slot, f) in key.iter_mut().zip(floats) {
            *slot = f.to_bits();
        }
        key
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Builds an indexed mesh from an unindexed triangle list, merging
    /// vertices whose attributes match bit for bit.
    pub fn from_triangle_list(vertices: impl IntoIterator<Item = Vertex>) -> Self {
        let mut mesh = Mesh::default();
        let mut unique: HashMap<[u32; 11], u32> = HashMap::new();
        for vertex in vertices {
            let index = *unique.entry(vertex.key()).or_insert_with(|| {
                mesh.vertices.push(vertex);
                (mesh.vertices.len() - 1) as u32
            });
            mesh.indices.push(index);
        }
        mesh
    }

    pub fn load_obj(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let (models, _) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )
        .map_err(|source| AssetError::Obj {
            path: path.to_path_buf(),
            source,
        })?;

        let mut corners = Vec::new();
        for model in &models {
            let m = &model.mesh;
            for &index in &m.indices {
                let i = index as usize;
                let pos = [
                    m.positions[3 * i],
                    m.positions[3 * i + 1],
                    m.positions[3 * i + 2],
                ];
                let color = if m.vertex_color.len() >= 3 * i + 3 {
                    [
                        m.vertex_color[3 * i],
                        m.vertex_color[3 * i + 1],
                        m.vertex_color[3 * i + 2],
                    ]
                } else {
                    [1.0, 1.0, 1.0]
                };
                // OBJ puts v = 0 at the bottom; Vulkan samples top-down.
                let uv = if m.texcoords.len() >= 2 * i + 2 {
                    [m.texcoords[2 * i], 1.0 - m.texcoords[2 * i + 1]]
                } else {
                    [0.0, 0.0]
                };
                let normal = if m.normals.len() >= 3 * i + 3 {
                    [m.normals[3 * i], m.normals[3 * i + 1], m.normals[3 * i + 2]]
                } else {
                    [0.0, 0.0, 1.0]
                };
                corners.push(Vertex::new(pos, color, uv, normal));
            }
        }

        let mesh = Self::from_triangle_list(corners);
        if mesh.indices.is_empty() {
            return Err(AssetError::EmptyMesh(path.to_path_buf()));
        }
        info!(
            "loaded {:?}: {} vertices, {} indices",
            path,
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(mesh)
    }

    /// Axis-aligned cube with side 2 centred on the origin, white, per-face normals.
    pub fn unit_cube() -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            // normal, u axis, v axis
            ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
        ];
        let white = [1.0, 1.0, 1.0];
        let mut corners = Vec::with_capacity(36);
        for (n, u, v) in FACES {
            let corner = |su: f32, sv: f32| {
                let pos = [
                    n[0] + u[0] * su + v[0] * sv,
                    n[1] + u[1] * su + v[1] * sv,
                    n[2] + u[2] * su + v[2] * sv,
                ];
                let uv = [(su + 1.0) * 0.5, (1.0 - sv) * 0.5];
                Vertex::new(pos, white, uv, n)
            };
            let (a, b, c, d) = (
                corner(-1.0, -1.0),
                corner(1.0, -1.0),
                corner(1.0, 1.0),
                corner(-1.0, 1.0),
            );
            // Counter-clockwise seen from outside.
            corners.extend_from_slice(&[a, b, c, a, c, d]);
        }
        Self::from_triangle_list(corners)
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}
