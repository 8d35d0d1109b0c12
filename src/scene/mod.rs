//! Scene state: a flat list of entities and lights plus the camera.
//!
//! No hierarchy, no culling. The inspector panels bind widgets directly to
//! these fields, so everything is plain mutable data.

pub mod camera;
pub mod entity;
pub mod light;

pub use camera::Camera;
pub use entity::Entity;
pub use light::{Light, LightKind};

/// Everything the render passes read each frame.
#[derive(Default)]
pub struct Scene {
    pub entities: Vec<Entity>,
    pub lights: Vec<Light>,
    pub camera: Camera,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            camera: Camera::default(),
            ..Default::default()
        }
    }

    /// Inline numeric correction: point light falloff must never go
    /// negative. Runs once per frame before uniform fill.
    pub fn sanitize(&mut self) {
        for light in &mut self.lights {
            if light.max_distance < 0.0 {
                light.max_distance = 0.0;
            }
        }
    }
}
