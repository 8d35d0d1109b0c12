//! Mesh data: interleaved vertex streams split into submeshes.
//!
//! A mesh owns one vertex buffer and one index buffer; each submesh is a
//! byte range into both plus its own attribute layout. Render pipelines are
//! built per (submesh, program) because attribute locations differ across
//! programs; see [`crate::resources::pipeline_cache`].

use wgpu::util::DeviceExt;

/// One interleaved vertex attribute: shader location, float component
/// count, byte offset within a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferAttribute {
    pub location: u32,
    pub component_count: u32,
    pub offset: u32,
}

/// Attribute layout of one submesh's interleaved vertex stream.
#[derive(Debug, Clone, Default)]
pub struct VertexBufferLayout {
    pub attributes: Vec<VertexBufferAttribute>,
    pub stride: u32,
}

impl VertexBufferLayout {
    /// position (location 0)
    pub fn position() -> Self {
        Self {
            attributes: vec![VertexBufferAttribute {
                location: 0,
                component_count: 3,
                offset: 0,
            }],
            stride: 12,
        }
    }

    /// position (0), normal (1), texcoord (2)
    pub fn position_normal_texcoord() -> Self {
        Self {
            attributes: vec![
                VertexBufferAttribute { location: 0, component_count: 3, offset: 0 },
                VertexBufferAttribute { location: 1, component_count: 3, offset: 12 },
                VertexBufferAttribute { location: 2, component_count: 2, offset: 24 },
            ],
            stride: 32,
        }
    }

    /// position (0), texcoord (2) — the screen-filling quad layout.
    pub fn position_texcoord() -> Self {
        Self {
            attributes: vec![
                VertexBufferAttribute { location: 0, component_count: 3, offset: 0 },
                VertexBufferAttribute { location: 2, component_count: 2, offset: 12 },
            ],
            stride: 20,
        }
    }

    pub fn find(&self, location: u32) -> Option<&VertexBufferAttribute> {
        self.attributes.iter().find(|a| a.location == location)
    }
}

/// CPU-side submesh: layout plus byte/element ranges into the mesh streams.
#[derive(Debug, Clone)]
pub struct SubmeshData {
    pub layout: VertexBufferLayout,
    /// Byte offset of this submesh's first vertex in the vertex stream.
    pub vertex_byte_offset: u64,
    /// Byte offset of this submesh's first index in the index stream.
    pub index_byte_offset: u64,
    pub index_count: u32,
    /// Index into the owning model's material list.
    pub material_index: usize,
}

/// CPU-side mesh: interleaved vertices, u32 indices, submesh table.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubmeshData>,
}

impl MeshData {
    /// Append one submesh's streams, recording its byte offsets.
    pub fn push_submesh(
        &mut self,
        layout: VertexBufferLayout,
        vertices: &[f32],
        indices: &[u32],
        material_index: usize,
    ) {
        let vertex_byte_offset = (self.vertices.len() * 4) as u64;
        let index_byte_offset = (self.indices.len() * 4) as u64;
        self.vertices.extend_from_slice(vertices);
        self.indices.extend_from_slice(indices);
        self.submeshes.push(SubmeshData {
            layout,
            vertex_byte_offset,
            index_byte_offset,
            index_count: indices.len() as u32,
            material_index,
        });
    }
}

/// GPU-side submesh.
#[derive(Debug, Clone)]
pub struct Submesh {
    pub layout: VertexBufferLayout,
    pub vertex_byte_offset: u64,
    pub index_byte_offset: u64,
    pub index_count: u32,
    pub material_index: usize,
}

/// GPU-side mesh: one vertex and one index buffer shared by the submeshes.
pub struct Mesh {
    pub submeshes: Vec<Submesh>,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
}

impl Mesh {
    pub fn create(device: &wgpu::Device, data: &MeshData, label: &str) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            submeshes: data
                .submeshes
                .iter()
                .map(|s| Submesh {
                    layout: s.layout.clone(),
                    vertex_byte_offset: s.vertex_byte_offset,
                    index_byte_offset: s.index_byte_offset,
                    index_count: s.index_count,
                    material_index: s.material_index,
                })
                .collect(),
            vertex_buffer,
            index_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submesh_offsets_accumulate() {
        let mut data = MeshData::default();
        data.push_submesh(
            VertexBufferLayout::position_normal_texcoord(),
            &[0.0; 32],
            &[0, 1, 2],
            0,
        );
        data.push_submesh(VertexBufferLayout::position(), &[0.0; 9], &[0, 1, 2], 1);

        assert_eq!(data.submeshes[0].vertex_byte_offset, 0);
        assert_eq!(data.submeshes[0].index_byte_offset, 0);
        assert_eq!(data.submeshes[1].vertex_byte_offset, 128);
        assert_eq!(data.submeshes[1].index_byte_offset, 12);
        assert_eq!(data.submeshes[1].index_count, 3);
    }

    #[test]
    fn test_layout_lookup_by_location() {
        let layout = VertexBufferLayout::position_texcoord();
        assert_eq!(layout.find(2).unwrap().offset, 12);
        assert!(layout.find(1).is_none());
        assert_eq!(layout.stride, 20);
    }
}
