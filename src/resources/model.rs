//! Models and embedded primitive geometry.
//!
//! A model pairs a mesh with one material per submesh. The primitives here
//! are the in-engine meshes: a screen-filling quad for full-screen passes,
//! a unit cube for the skybox and cubemap capture, and the sphere/plane
//! proxies used by the debug light overlay.

use std::f32::consts::PI;

use super::mesh::{MeshData, VertexBufferLayout};

/// A renderable model: a mesh index plus per-submesh material indices.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub mesh_index: usize,
    /// One entry per submesh.
    pub material_indices: Vec<usize>,
}

/// Screen-filling quad, positions in clip space with texcoords.
pub fn screen_quad() -> MeshData {
    #[rustfmt::skip]
    let vertices: [f32; 20] = [
        -1.0, -1.0, 0.0,   0.0, 0.0,
         1.0, -1.0, 0.0,   1.0, 0.0,
         1.0,  1.0, 0.0,   1.0, 1.0,
        -1.0,  1.0, 0.0,   0.0, 1.0,
    ];
    let indices: [u32; 6] = [0, 1, 2, 0, 2, 3];

    let mut data = MeshData::default();
    data.push_submesh(VertexBufferLayout::position_texcoord(), &vertices, &indices, 0);
    data
}

/// Unit cube around the origin, positions only. Wound so its inside faces
/// a viewer at the center, for skybox and capture draws.
pub fn unit_cube() -> MeshData {
    #[rustfmt::skip]
    let positions: [f32; 24] = [
        -1.0, -1.0, -1.0,
         1.0, -1.0, -1.0,
         1.0,  1.0, -1.0,
        -1.0,  1.0, -1.0,
        -1.0, -1.0,  1.0,
         1.0, -1.0,  1.0,
         1.0,  1.0,  1.0,
        -1.0,  1.0,  1.0,
    ];
    #[rustfmt::skip]
    let indices: [u32; 36] = [
        0, 2, 1, 0, 3, 2, // -Z
        4, 5, 6, 4, 6, 7, // +Z
        0, 4, 7, 0, 7, 3, // -X
        1, 6, 5, 1, 2, 6, // +X
        3, 7, 6, 3, 6, 2, // +Y
        0, 1, 5, 0, 5, 4, // -Y
    ];

    let mut data = MeshData::default();
    data.push_submesh(VertexBufferLayout::position(), &positions, &indices, 0);
    data
}

/// Axis-aligned cube with normals and texcoords, for scene geometry.
pub fn shaded_cube(half_extent: f32) -> MeshData {
    let h = half_extent;
    // (normal, corner positions), texcoords span each face.
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([0.0, 0.0, 1.0], [[-h, -h, h], [h, -h, h], [h, h, h], [-h, h, h]]),
        ([0.0, 0.0, -1.0], [[h, -h, -h], [-h, -h, -h], [-h, h, -h], [h, h, -h]]),
        ([1.0, 0.0, 0.0], [[h, -h, h], [h, -h, -h], [h, h, -h], [h, h, h]]),
        ([-1.0, 0.0, 0.0], [[-h, -h, -h], [-h, -h, h], [-h, h, h], [-h, h, -h]]),
        ([0.0, 1.0, 0.0], [[-h, h, h], [h, h, h], [h, h, -h], [-h, h, -h]]),
        ([0.0, -1.0, 0.0], [[-h, -h, -h], [h, -h, -h], [h, -h, h], [-h, -h, h]]),
    ];
    let uvs: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    let mut vertices = Vec::with_capacity(6 * 4 * 8);
    let mut indices = Vec::with_capacity(36);
    for (face, (normal, corners)) in faces.iter().enumerate() {
        let base = (face * 4) as u32;
        for (corner, uv) in corners.iter().zip(&uvs) {
            vertices.extend_from_slice(corner);
            vertices.extend_from_slice(normal);
            vertices.extend_from_slice(uv);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    let mut data = MeshData::default();
    data.push_submesh(
        VertexBufferLayout::position_normal_texcoord(),
        &vertices,
        &indices,
        0,
    );
    data
}

/// UV sphere with normals and texcoords. Used as the point light proxy.
pub fn uv_sphere(radius: f32, rings: u32, sectors: u32) -> MeshData {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let phi = v * PI;
        for sector in 0..=sectors {
            let u = sector as f32 / sectors as f32;
            let theta = u * 2.0 * PI;

            let x = phi.sin() * theta.cos();
            let y = phi.cos();
            let z = phi.sin() * theta.sin();

            vertices.extend_from_slice(&[x * radius, y * radius, z * radius, x, y, z, u, v]);
        }
    }

    let stride = sectors + 1;
    for ring in 0..rings {
        for sector in 0..sectors {
            let a = ring * stride + sector;
            let b = a + stride;
            indices.extend_from_slice(&[a, b, a + 1, b, b + 1, a + 1]);
        }
    }

    let mut data = MeshData::default();
    data.push_submesh(
        VertexBufferLayout::position_normal_texcoord(),
        &vertices,
        &indices,
        0,
    );
    data
}

/// Flat quad in the XZ plane facing +Y. Used as the directional light proxy
/// and as a ground plane.
pub fn plane(half_extent: f32) -> MeshData {
    let h = half_extent;
    #[rustfmt::skip]
    let vertices: [f32; 32] = [
        -h, 0.0, -h,   0.0, 1.0, 0.0,   0.0, 0.0,
         h, 0.0, -h,   0.0, 1.0, 0.0,   1.0, 0.0,
         h, 0.0,  h,   0.0, 1.0, 0.0,   1.0, 1.0,
        -h, 0.0,  h,   0.0, 1.0, 0.0,   0.0, 1.0,
    ];
    let indices: [u32; 6] = [0, 2, 1, 0, 3, 2];

    let mut data = MeshData::default();
    data.push_submesh(
        VertexBufferLayout::position_normal_texcoord(),
        &vertices,
        &indices,
        0,
    );
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_stream_sizes() {
        let quad = screen_quad();
        assert_eq!(quad.vertices.len(), 20);
        assert_eq!(quad.submeshes[0].index_count, 6);

        let cube = unit_cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.submeshes[0].index_count, 36);

        let sphere = uv_sphere(1.0, 8, 12);
        assert_eq!(sphere.vertices.len() % 8, 0);
        assert_eq!(sphere.submeshes[0].index_count, 8 * 12 * 6);
    }

    #[test]
    fn test_sphere_vertices_lie_on_radius() {
        let radius = 2.5;
        let sphere = uv_sphere(radius, 6, 6);
        for vertex in sphere.vertices.chunks(8) {
            let length = (vertex[0] * vertex[0] + vertex[1] * vertex[1] + vertex[2] * vertex[2]).sqrt();
            assert!((length - radius).abs() < 1e-4, "vertex off the sphere: {length}");
        }
    }
}
