//! Render passes and their shared plumbing.
//!
//! Every pass is a fixed function of a bound program, a framebuffer with an
//! explicit attachment list, vertex/index data and range-bound uniform
//! blocks at the [`BindingPoint`](crate::shader::BindingPoint) contract
//! slots. The frame orchestrator runs them in a fixed order; see
//! [`crate::engine`].

pub mod bloom;
pub mod composite;
pub mod debug_lights;
pub mod geometry;
pub mod lighting;

pub use crate::shader::BindingPoint;
pub use bloom::BloomPipeline;
pub use composite::CompositePass;
pub use debug_lights::DebugLightPass;
pub use geometry::GeometryPass;
pub use lighting::LightingPass;

use std::num::NonZeroU64;

use crate::arena::BlockRange;
use crate::shader::{Program, ReflectedBindingKind};

/// Which channel the final composite shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum DrawMode {
    #[default]
    Default = 0,
    Albedo = 1,
    Normals = 2,
    WorldPosition = 3,
    Bloom = 4,
    Depth = 5,
    Reflectivity = 6,
}

impl DrawMode {
    pub const ALL: [DrawMode; 7] = [
        DrawMode::Default,
        DrawMode::Albedo,
        DrawMode::Normals,
        DrawMode::WorldPosition,
        DrawMode::Bloom,
        DrawMode::Depth,
        DrawMode::Reflectivity,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DrawMode::Default => "default",
            DrawMode::Albedo => "albedo",
            DrawMode::Normals => "normals",
            DrawMode::WorldPosition => "world position",
            DrawMode::Bloom => "bloom",
            DrawMode::Depth => "depth",
            DrawMode::Reflectivity => "reflectivity",
        }
    }
}

/// Uniform block ranges pushed for the current frame, consumed by the
/// passes. Rebuilt from scratch every frame; see
/// [`crate::arena::UniformArena::begin_frame`].
#[derive(Debug, Clone, Default)]
pub struct FrameBlocks {
    pub global: BlockRange,
    /// One per entity, parallel to `scene.entities`.
    pub entities: Vec<BlockRange>,
    /// One per light (debug proxy transform), parallel to `scene.lights`.
    pub lights: Vec<BlockRange>,
    /// One per light: proxy color pushed as a material block.
    pub light_materials: Vec<BlockRange>,
    /// One per material, parallel to the material pool.
    pub materials: Vec<BlockRange>,
    /// Per-pass parameter blocks.
    pub bright: BlockRange,
    pub blur_horizontal: BlockRange,
    pub blur_vertical: BlockRange,
    pub bloom_levels: Vec<BlockRange>,
    pub composite: BlockRange,
}

/// Build the bind group layout matching a program's reflected group 0.
pub(crate) fn program_bind_group_layout(
    device: &wgpu::Device,
    program: &Program,
    label: &str,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &program.bind_group_layout_entries(),
    })
}

pub(crate) fn program_pipeline_layout(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    label: &str,
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    })
}

/// Create the bind group for a program: every uniform block binds the arena
/// buffer as a dynamic-offset range, textures come from `textures` (keyed
/// by their declared binding) and every split-off sampler binds `sampler`.
pub(crate) fn program_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    program: &Program,
    arena_buffer: &wgpu::Buffer,
    textures: &[(u32, &wgpu::TextureView)],
    sampler: &wgpu::Sampler,
    label: &str,
) -> wgpu::BindGroup {
    let entries: Vec<wgpu::BindGroupEntry> = program
        .bindings
        .iter()
        .map(|reflected| {
            let resource = match reflected.kind {
                ReflectedBindingKind::Uniform { size } => {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: arena_buffer,
                        offset: 0,
                        size: NonZeroU64::new(size),
                    })
                }
                ReflectedBindingKind::Texture { .. } => {
                    let view = textures
                        .iter()
                        .find(|(binding, _)| *binding == reflected.binding)
                        .map(|(_, view)| *view)
                        .unwrap_or_else(|| {
                            panic!(
                                "pass '{label}' provides no texture for binding {}",
                                reflected.binding
                            )
                        });
                    wgpu::BindingResource::TextureView(view)
                }
                ReflectedBindingKind::Sampler => wgpu::BindingResource::Sampler(sampler),
            };
            wgpu::BindGroupEntry {
                binding: reflected.binding,
                resource,
            }
        })
        .collect();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    })
}

/// A linear clamp-to-edge sampler for image sampling passes.
pub(crate) fn linear_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}
