//! Scene entities.

use glam::{Mat4, Vec3};

use crate::arena::{ArenaWriter, BlockRange};
use crate::error::EngineResult;

/// A placed instance of a model.
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub position: Vec3,
    /// Euler angles in radians, applied per axis.
    pub rotation: Vec3,
    pub scale: Vec3,
    pub model_index: usize,

    /// Uniform block pushed for the current frame. Stale after the next
    /// arena restart.
    pub local_params: Option<BlockRange>,
}

impl Entity {
    pub fn new(name: &str, model_index: usize) -> Self {
        Self {
            name: name.to_string(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            model_index,
            local_params: None,
        }
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// World transform composed as translate * rotateX * rotateY * rotateZ
    /// * scale. The order is a contract; shaders and tools assume it.
    pub fn world_transform(&self) -> Mat4 {
        Mat4::from_translation(self.position)
            * Mat4::from_rotation_x(self.rotation.x)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_z(self.rotation.z)
            * Mat4::from_scale(self.scale)
    }

    /// Push this entity's uniform block (world and world-view-projection
    /// matrices) and record the range.
    pub fn push_params(
        &mut self,
        writer: &mut ArenaWriter,
        view_projection: Mat4,
    ) -> EngineResult<BlockRange> {
        let world = self.world_transform();
        let start = writer.begin_block();
        writer.push_mat4(world)?;
        writer.push_mat4(view_projection * world)?;
        let block = writer.finish_block(start);
        self.local_params = Some(block);
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_world_transform_identity_rotation_and_scale_is_translation() {
        let entity = Entity::new("probe", 0).at(Vec3::new(1.0, 2.0, 3.0));
        let world = entity.world_transform();
        let expected = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        for (a, b) in world.to_cols_array().iter().zip(expected.to_cols_array()) {
            assert_relative_eq!(*a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_world_transform_applies_rotation_before_translation() {
        let mut entity = Entity::new("probe", 0).at(Vec3::new(5.0, 0.0, 0.0));
        entity.rotation.y = std::f32::consts::FRAC_PI_2;
        let world = entity.world_transform();
        // A point on +X rotates onto -Z before the translation applies.
        let p = world.transform_point3(Vec3::X);
        assert_relative_eq!(p.x, 5.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_local_params_block_holds_two_matrices() {
        let mut writer = ArenaWriter::new(1024, 256);
        writer.begin_frame();
        let mut entity = Entity::new("probe", 0);
        let block = entity.push_params(&mut writer, Mat4::IDENTITY).unwrap();
        assert_eq!(block.size, 128);
        assert_eq!(entity.local_params, Some(block));
    }
}
