//! Model import from glTF.
//!
//! Flattens each glTF mesh into the engine's interleaved
//! position/normal/texcoord stream, one submesh per primitive, and maps
//! materials onto the engine's Lambert-plus-reflectivity model: base color
//! to albedo, metallic to reflectivity, one minus roughness to smoothness.

use std::collections::HashMap;
use std::path::Path;

use glam::Vec3;

use crate::error::{EngineError, EngineResult};
use crate::resources::{
    Material, Mesh, MeshData, Model, ResourcePools, Texture2D, TextureData, VertexBufferLayout,
};

/// Import every mesh in a glTF file into the pools. Returns the indices of
/// the models that were added.
pub fn load_gltf(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pools: &mut ResourcePools,
    path: &Path,
) -> EngineResult<Vec<usize>> {
    let (document, buffers, images) = gltf::import(path).map_err(|e| EngineError::Import {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // glTF image index -> pool texture index, uploaded on first use.
    let mut uploaded_images: HashMap<usize, usize> = HashMap::new();
    // glTF material index -> pool material index.
    let mut material_map: HashMap<Option<usize>, usize> = HashMap::new();

    let mut models = Vec::new();
    for mesh in document.meshes() {
        let name = mesh.name().unwrap_or("mesh").to_string();
        let mut data = MeshData::default();
        let mut material_indices = Vec::new();

        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| &b.0[..]));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let normals: Vec<[f32; 3]> = reader
                .read_normals()
                .map(|n| n.collect())
                .unwrap_or_else(|| vec![[0.0, 1.0, 0.0]; positions.len()]);
            let texcoords: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map(|t| t.into_f32().collect())
                .unwrap_or_else(|| vec![[0.0, 0.0]; positions.len()]);

            let mut vertices = Vec::with_capacity(positions.len() * 8);
            for ((position, normal), texcoord) in
                positions.iter().zip(&normals).zip(&texcoords)
            {
                vertices.extend_from_slice(position);
                vertices.extend_from_slice(normal);
                vertices.extend_from_slice(texcoord);
            }

            let indices: Vec<u32> = reader
                .read_indices()
                .map(|i| i.into_u32().collect())
                .unwrap_or_else(|| (0..positions.len() as u32).collect());

            let material_key = primitive.material().index();
            let material_index = *material_map.entry(material_key).or_insert_with(|| {
                let material = convert_material(
                    device,
                    queue,
                    &primitive.material(),
                    &images,
                    &mut uploaded_images,
                    pools,
                );
                pools.materials.push(material);
                pools.materials.len() - 1
            });

            material_indices.push(material_index);
            data.push_submesh(
                VertexBufferLayout::position_normal_texcoord(),
                &vertices,
                &indices,
                material_index,
            );
        }

        if data.submeshes.is_empty() {
            continue;
        }

        pools.meshes.push(Mesh::create(device, &data, &name));
        let mesh_index = pools.meshes.len() - 1;
        pools.models.push(Model {
            name,
            mesh_index,
            material_indices,
        });
        models.push(pools.models.len() - 1);
    }

    log::info!(
        "imported {} model(s) from {}",
        models.len(),
        path.display()
    );
    Ok(models)
}

fn convert_material(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    material: &gltf::Material,
    images: &[gltf::image::Data],
    uploaded_images: &mut HashMap<usize, usize>,
    pools: &mut ResourcePools,
) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let base = pbr.base_color_factor();
    let emissive = material.emissive_factor();

    let albedo_texture = pbr.base_color_texture().and_then(|info| {
        let image_index = info.texture().source().index();
        upload_image(device, queue, images, image_index, uploaded_images, pools)
    });

    Material {
        name: material.name().unwrap_or("material").to_string(),
        albedo: Vec3::new(base[0], base[1], base[2]),
        emissive: Vec3::from_array(emissive),
        smoothness: 1.0 - pbr.roughness_factor(),
        reflectivity: pbr.metallic_factor(),
        albedo_texture,
        emissive_texture: None,
        normals_texture: None,
        local_params: None,
    }
}

fn upload_image(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    images: &[gltf::image::Data],
    image_index: usize,
    uploaded_images: &mut HashMap<usize, usize>,
    pools: &mut ResourcePools,
) -> Option<usize> {
    if let Some(&index) = uploaded_images.get(&image_index) {
        return Some(index);
    }
    let image = images.get(image_index)?;

    let rgba = match image.format {
        gltf::image::Format::R8G8B8A8 => image.pixels.clone(),
        gltf::image::Format::R8G8B8 => image
            .pixels
            .chunks(3)
            .flat_map(|texel| [texel[0], texel[1], texel[2], 255])
            .collect(),
        other => {
            log::error!("unsupported glTF image format {other:?}, using placeholder");
            return None;
        }
    };

    let data = TextureData {
        width: image.width,
        height: image.height,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        data: rgba,
        name: format!("gltf image {image_index}"),
    };
    pools.textures.push(Texture2D::create(device, queue, &data));
    let index = pools.textures.len() - 1;
    uploaded_images.insert(image_index, index);
    Some(index)
}
