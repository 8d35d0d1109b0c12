//! ember - a deferred rendering engine built on wgpu.
//!
//! The engine renders a flat scene of entities, point and directional
//! lights and an HDR environment through a fixed multi-pass pipeline:
//!
//! 1. Geometry pass into a multi-target G-buffer (albedo, world normals,
//!    world position, reflectivity, depth)
//! 2. Optional debug-light overlay (proxy spheres and planes)
//! 3. Skybox render from the precomputed environment cubemap
//! 4. Full-screen deferred lighting with irradiance-based ambient
//! 5. Optional bloom over a five-level mip chain
//! 6. Final composite with a debug draw-mode selector
//!
//! Per-frame shader parameters travel through a single append-only uniform
//! buffer arena with std140-aware sub-allocation; shader programs are
//! single-file GLSL with injected stage defines and hot reload.

pub mod arena;
pub mod engine;
pub mod environment;
pub mod error;
pub mod framebuffer;
pub mod gui;
pub mod import;
pub mod passes;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod window;

pub use arena::{BlockRange, UniformArena};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, FramebufferError};
pub use framebuffer::{AttachmentDesc, Framebuffer};
pub use passes::DrawMode;
pub use scene::{Camera, Entity, Light, LightKind, Scene};
pub use shader::{BindingPoint, ProgramRegistry};

use std::path::PathBuf;

/// Configuration for initializing the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable vsync.
    pub vsync: bool,
    /// Directory holding the GLSL shader sources.
    pub shader_dir: PathBuf,
    /// Equirectangular HDR image for the environment.
    pub environment_hdr: PathBuf,
    /// Uniform arena capacity in bytes.
    pub arena_capacity: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "ember".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            shader_dir: PathBuf::from("assets/shaders"),
            environment_hdr: PathBuf::from("assets/environment.hdr"),
            arena_capacity: 1024 * 1024,
        }
    }
}
