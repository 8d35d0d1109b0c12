//! Material definitions.

use glam::Vec3;

use crate::arena::{ArenaWriter, BlockRange};
use crate::error::EngineResult;

/// Lambertian material with an environment reflectivity term.
///
/// Texture references are optional; `None` means the slot is skipped at
/// bind time and the scalar factors drive shading alone.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub albedo: Vec3,
    pub emissive: Vec3,
    pub smoothness: f32,
    pub reflectivity: f32,

    pub albedo_texture: Option<usize>,
    pub emissive_texture: Option<usize>,
    pub normals_texture: Option<usize>,

    /// Uniform block pushed for the current frame. Stale after the next
    /// arena restart.
    pub local_params: Option<BlockRange>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            albedo: Vec3::ONE,
            emissive: Vec3::ZERO,
            smoothness: 0.0,
            reflectivity: 0.0,
            albedo_texture: None,
            emissive_texture: None,
            normals_texture: None,
            local_params: None,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_albedo(mut self, albedo: Vec3) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_reflectivity(mut self, reflectivity: f32) -> Self {
        self.reflectivity = reflectivity;
        self
    }

    /// Push this material's uniform block for the current frame and record
    /// the range. Layout matches the `MaterialParams` block in the shaders:
    /// albedo, emissive, then (smoothness, reflectivity, has-albedo-texture).
    pub fn push_params(&mut self, writer: &mut ArenaWriter) -> EngineResult<BlockRange> {
        let start = writer.begin_block();
        writer.push_vec4(self.albedo.extend(1.0))?;
        writer.push_vec4(self.emissive.extend(1.0))?;
        writer.push_vec4(glam::Vec4::new(
            self.smoothness,
            self.reflectivity,
            if self.albedo_texture.is_some() { 1.0 } else { 0.0 },
            0.0,
        ))?;
        let block = writer.finish_block(start);
        self.local_params = Some(block);
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_block_layout() {
        let mut writer = ArenaWriter::new(1024, 256);
        writer.begin_frame();
        let mut material = Material::new("tiles")
            .with_albedo(Vec3::new(0.5, 0.5, 0.5))
            .with_reflectivity(0.3);
        material.albedo_texture = Some(2);

        let block = material.push_params(&mut writer).unwrap();
        assert_eq!(block.offset % 256, 0);
        assert_eq!(block.size, 48);
        assert_eq!(material.local_params, Some(block));
    }
}
