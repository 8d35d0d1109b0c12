//! Geometry pass: rasterize every entity into the G-buffer.
//!
//! Writes four channels (albedo, world normal, world position, reflectivity)
//! plus depth, one draw call per submesh. Pipelines are built lazily per
//! (mesh, submesh, program) because attribute locations differ across
//! programs, and are purged when the program hot-reloads.

use std::collections::HashMap;

use crate::arena::UniformArena;
use crate::framebuffer::Framebuffer;
use crate::resources::pipeline_cache::PassPipelineDesc;
use crate::resources::{PipelineCache, PipelineKey, ResourcePools};
use crate::scene::Scene;
use crate::shader::{ProgramId, ProgramRegistry};

use super::{linear_sampler, program_bind_group, program_bind_group_layout, FrameBlocks};

/// Binding of the material albedo texture in the geometry shader.
pub(crate) const ALBEDO_TEXTURE_BINDING: u32 = 3;

/// G-buffer color target formats, in attachment order.
pub const GBUFFER_COLOR_FORMATS: [wgpu::TextureFormat; 4] = [
    wgpu::TextureFormat::Rgba16Float, // albedo
    wgpu::TextureFormat::Rgba16Float, // world normal
    wgpu::TextureFormat::Rgba16Float, // world position (+ depth in w)
    wgpu::TextureFormat::R16Float,    // reflectivity
];

pub struct GeometryPass {
    pub program: ProgramId,
    generation: u64,
    sampler: wgpu::Sampler,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: Option<wgpu::PipelineLayout>,
    pipelines: PipelineCache,
    /// One bind group per bound albedo texture index.
    bind_groups: HashMap<usize, wgpu::BindGroup>,
}

impl GeometryPass {
    pub fn new(device: &wgpu::Device, program: ProgramId) -> Self {
        Self {
            program,
            generation: 0,
            sampler: linear_sampler(device, "geometry albedo sampler"),
            bind_group_layout: None,
            pipeline_layout: None,
            pipelines: PipelineCache::new(),
            bind_groups: HashMap::new(),
        }
    }

    pub(crate) fn color_targets() -> [Option<wgpu::ColorTargetState>; 4] {
        GBUFFER_COLOR_FORMATS.map(|format| {
            Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
    }

    pub(crate) fn depth_state() -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format: wgpu::TextureFormat::Depth24Plus,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }

    /// Build every pipeline and bind group this frame's draws need. Runs
    /// before the render pass opens so the draw loop is read-only.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        registry: &ProgramRegistry,
        arena: &UniformArena,
        scene: &Scene,
        pools: &ResourcePools,
    ) {
        let program = registry.get(self.program);

        if self.generation != program.generation {
            self.pipelines.purge_stale(self.program, program.generation);
            self.bind_groups.clear();
            let layout = program_bind_group_layout(device, program, "geometry");
            self.pipeline_layout = Some(super::program_pipeline_layout(
                device,
                &layout,
                "geometry",
            ));
            self.bind_group_layout = Some(layout);
            self.generation = program.generation;
        }

        let layout = self.bind_group_layout.as_ref().unwrap();
        let pipeline_layout = self.pipeline_layout.as_ref().unwrap();

        for entity in &scene.entities {
            let model = &pools.models[entity.model_index];
            let mesh = &pools.meshes[model.mesh_index];

            for (submesh_index, submesh) in mesh.submeshes.iter().enumerate() {
                let key = PipelineKey {
                    mesh: model.mesh_index,
                    submesh: submesh_index,
                    program: self.program,
                    generation: program.generation,
                };
                self.pipelines.get_or_create(
                    device,
                    key,
                    program,
                    &submesh.layout,
                    &PassPipelineDesc {
                        label: "geometry",
                        layout: pipeline_layout,
                        color_targets: &Self::color_targets(),
                        depth_stencil: Some(Self::depth_state()),
                        cull_mode: Some(wgpu::Face::Back),
                    },
                );

                let material_index = model.material_indices[submesh_index];
                let material = &pools.materials[material_index];
                let texture_index = material.albedo_texture.unwrap_or(pools.white_texture);
                self.bind_groups.entry(texture_index).or_insert_with(|| {
                    program_bind_group(
                        device,
                        layout,
                        program,
                        arena.buffer(),
                        &[(
                            ALBEDO_TEXTURE_BINDING,
                            &pools.textures[texture_index].view,
                        )],
                        &self.sampler,
                        "geometry material",
                    )
                });
            }
        }
    }

    /// Record the G-buffer render pass: clear all channels, then one
    /// depth-tested draw per submesh.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &Framebuffer,
        scene: &Scene,
        pools: &ResourcePools,
        blocks: &FrameBlocks,
    ) {
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = (0..4)
            .map(|slot| {
                Some(wgpu::RenderPassColorAttachment {
                    view: gbuffer.color_view(slot).expect("gbuffer color attachment"),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("geometry pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: gbuffer.depth_view().expect("gbuffer depth attachment"),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for (entity_index, entity) in scene.entities.iter().enumerate() {
            let model = &pools.models[entity.model_index];
            let mesh = &pools.meshes[model.mesh_index];
            let entity_block = blocks.entities[entity_index];

            for (submesh_index, submesh) in mesh.submeshes.iter().enumerate() {
                let key = PipelineKey {
                    mesh: model.mesh_index,
                    submesh: submesh_index,
                    program: self.program,
                    generation: self.generation,
                };
                let Some(pipeline) = self.pipelines.get(&key) else {
                    continue;
                };

                let material_index = model.material_indices[submesh_index];
                let material = &pools.materials[material_index];
                let texture_index = material.albedo_texture.unwrap_or(pools.white_texture);
                let Some(bind_group) = self.bind_groups.get(&texture_index) else {
                    continue;
                };
                let material_block = blocks.materials[material_index];

                pass.set_pipeline(pipeline);
                pass.set_bind_group(
                    0,
                    bind_group,
                    &[entity_block.offset, material_block.offset],
                );
                pass.set_vertex_buffer(
                    0,
                    mesh.vertex_buffer.slice(submesh.vertex_byte_offset..),
                );
                pass.set_index_buffer(
                    mesh.index_buffer.slice(submesh.index_byte_offset..),
                    wgpu::IndexFormat::Uint32,
                );
                pass.draw_indexed(0..submesh.index_count, 0, 0..1);
            }
        }
    }
}
