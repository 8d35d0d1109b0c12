//! Perspective camera with an orbit target.

use glam::{Mat4, Vec3};

pub const DEFAULT_FOV: f32 = 60.0;
pub const DEFAULT_Z_NEAR: f32 = 0.1;
pub const DEFAULT_Z_FAR: f32 = 1000.0;

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub z_near: f32,
    pub z_far: f32,
    aspect_ratio: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, -5.0),
            target: Vec3::new(0.0, 0.4, 0.0),
            fov: DEFAULT_FOV,
            z_near: DEFAULT_Z_NEAR,
            z_far: DEFAULT_Z_FAR,
            aspect_ratio: 1.0,
        }
    }
}

impl Camera {
    pub fn set_aspect_ratio(&mut self, ratio: f32) {
        self.aspect_ratio = ratio;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    /// Zero-to-one depth projection, matching the GPU clip space.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov.to_radians(),
            self.aspect_ratio,
            self.z_near,
            self.z_far,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_matrix_looks_at_target() {
        let camera = Camera::default();
        let view = camera.view_matrix();
        let target_in_view = view.transform_point3(camera.target);
        // The target sits straight ahead, which is -Z in view space.
        assert!(target_in_view.z < 0.0);
        assert!(target_in_view.x.abs() < 1e-5);
    }
}
