//! Light types and their debug proxy transforms.

use glam::{Mat4, Quat, Vec3};

use crate::arena::{ArenaWriter, BlockRange};
use crate::error::EngineResult;

/// Distance from the origin at which directional lights are visualized.
pub const DIRECTIONAL_DEBUG_DRAW_DISTANCE: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Directional,
    Point,
}

impl LightKind {
    /// Numeric tag used in the packed light list.
    pub fn shader_id(self) -> f32 {
        match self {
            LightKind::Directional => 0.0,
            LightKind::Point => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub direction: Vec3,
    pub position: Vec3,
    /// Falloff range, point lights only.
    pub max_distance: f32,

    /// Uniform block for the debug proxy draw, pushed per frame.
    pub local_params: Option<BlockRange>,
}

impl Light {
    pub fn directional(color: Vec3, direction: Vec3) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            direction,
            position: Vec3::ZERO,
            max_distance: 10.0,
            local_params: None,
        }
    }

    pub fn point(color: Vec3, position: Vec3, max_distance: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            direction: Vec3::NEG_Y,
            position,
            max_distance,
            local_params: None,
        }
    }

    /// World transform of the debug proxy: a small sphere at the light
    /// position for point lights, a plane pushed out along the light
    /// direction for directional lights.
    pub fn debug_world_transform(&self) -> Mat4 {
        match self.kind {
            LightKind::Point => {
                Mat4::from_translation(self.position) * Mat4::from_scale(Vec3::splat(0.25))
            }
            LightKind::Directional => {
                let direction = self.direction.try_normalize().unwrap_or(Vec3::NEG_Y);
                let orientation = Quat::from_rotation_arc(Vec3::Y, -direction);
                Mat4::from_translation(direction * DIRECTIONAL_DEBUG_DRAW_DISTANCE)
                    * Mat4::from_quat(orientation)
            }
        }
    }

    /// Push the proxy-draw uniform block (same layout entities use).
    pub fn push_params(
        &mut self,
        writer: &mut ArenaWriter,
        view_projection: Mat4,
    ) -> EngineResult<BlockRange> {
        let world = self.debug_world_transform();
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
    fn test_point_proxy_sits_at_light_position() {
        let light = Light::point(Vec3::ONE, Vec3::new(2.0, 3.0, -1.0), 10.0);
        let origin = light.debug_world_transform().transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(origin.y, 3.0, epsilon = 1e-6);
        assert_relative_eq!(origin.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_directional_proxy_sits_at_fixed_debug_distance() {
        let direction = Vec3::new(0.0, -1.0, 0.0);
        let light = Light::directional(Vec3::ONE, direction);
        let origin = light.debug_world_transform().transform_point3(Vec3::ZERO);
        assert_relative_eq!(
            origin.distance(Vec3::ZERO),
            DIRECTIONAL_DEBUG_DRAW_DISTANCE,
            epsilon = 1e-5
        );
        assert_relative_eq!(origin.y, -DIRECTIONAL_DEBUG_DRAW_DISTANCE, epsilon = 1e-5);
    }
}
