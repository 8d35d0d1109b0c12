//! GPU and CPU resource types: textures, materials, meshes, models and the
//! per-(submesh, program) render pipeline cache.

pub mod material;
pub mod mesh;
pub mod model;
pub mod pipeline_cache;
pub mod texture;

pub use material::Material;
pub use mesh::{Mesh, MeshData, Submesh, SubmeshData, VertexBufferAttribute, VertexBufferLayout};
pub use model::Model;
pub use pipeline_cache::{PipelineCache, PipelineKey};
pub use texture::{CubeTexture, Texture2D, TextureData};

/// The engine's flat resource pools. Indices into these vectors are the
/// handles entities, models and materials refer to.
#[derive(Default)]
pub struct ResourcePools {
    pub textures: Vec<Texture2D>,
    pub materials: Vec<Material>,
    pub meshes: Vec<Mesh>,
    pub models: Vec<Model>,
    /// Fallback bound when a material has no albedo texture.
    pub white_texture: usize,
}

impl ResourcePools {
    pub fn albedo_view(&self, material: &Material) -> &wgpu::TextureView {
        let index = material.albedo_texture.unwrap_or(self.white_texture);
        &self.textures[index].view
    }
}