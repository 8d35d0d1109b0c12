//! Debug light overlay: proxy geometry rendered into the G-buffer.
//!
//! Reuses the geometry program. Point lights draw as small spheres at
//! their position, directional lights as planes pushed out along their
//! direction. The pass loads the existing G-buffer contents and depth.

use crate::arena::UniformArena;
use crate::framebuffer::Framebuffer;
use crate::resources::pipeline_cache::PassPipelineDesc;
use crate::resources::{Mesh, PipelineCache, PipelineKey, ResourcePools};
use crate::scene::{LightKind, Scene};
use crate::shader::{ProgramId, ProgramRegistry};

use super::geometry::{GeometryPass, ALBEDO_TEXTURE_BINDING};
use super::{linear_sampler, program_bind_group, program_bind_group_layout, FrameBlocks};

/// Proxy meshes owned by the pass: indices into the engine mesh pool.
#[derive(Debug, Clone, Copy)]
pub struct LightProxies {
    pub sphere_mesh: usize,
    pub plane_mesh: usize,
}

pub struct DebugLightPass {
    pub enabled: bool,
    program: ProgramId,
    proxies: LightProxies,
    generation: u64,
    sampler: wgpu::Sampler,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: Option<wgpu::PipelineLayout>,
    pipelines: PipelineCache,
    bind_group: Option<wgpu::BindGroup>,
}

impl DebugLightPass {
    pub fn new(device: &wgpu::Device, program: ProgramId, proxies: LightProxies) -> Self {
        Self {
            enabled: true,
            program,
            proxies,
            generation: 0,
            sampler: linear_sampler(device, "debug light sampler"),
            bind_group_layout: None,
            pipeline_layout: None,
            pipelines: PipelineCache::new(),
            bind_group: None,
        }
    }

    fn proxy_mesh_index(&self, kind: LightKind) -> usize {
        match kind {
            LightKind::Point => self.proxies.sphere_mesh,
            LightKind::Directional => self.proxies.plane_mesh,
        }
    }

    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        registry: &ProgramRegistry,
        arena: &UniformArena,
        pools: &ResourcePools,
    ) {
        if !self.enabled {
            return;
        }
        let program = registry.get(self.program);

        if self.generation != program.generation {
            self.pipelines.purge_stale(self.program, program.generation);
            self.bind_group = None;
            let layout = program_bind_group_layout(device, program, "debug lights");
            self.pipeline_layout = Some(super::program_pipeline_layout(
                device,
                &layout,
                "debug lights",
            ));
            self.bind_group_layout = Some(layout);
            self.generation = program.generation;
        }

        if self.bind_group.is_none() {
            self.bind_group = Some(program_bind_group(
                device,
                self.bind_group_layout.as_ref().unwrap(),
                program,
                arena.buffer(),
                &[(
                    ALBEDO_TEXTURE_BINDING,
                    &pools.textures[pools.white_texture].view,
                )],
                &self.sampler,
                "debug lights",
            ));
        }

        let pipeline_layout = self.pipeline_layout.as_ref().unwrap();
        for mesh_index in [self.proxies.sphere_mesh, self.proxies.plane_mesh] {
            let mesh = &pools.meshes[mesh_index];
            let key = PipelineKey {
                mesh: mesh_index,
                submesh: 0,
                program: self.program,
                generation: program.generation,
            };
            self.pipelines.get_or_create(
                device,
                key,
                program,
                &mesh.submeshes[0].layout,
                &PassPipelineDesc {
                    label: "debug lights",
                    layout: pipeline_layout,
                    color_targets: &GeometryPass::color_targets(),
                    depth_stencil: Some(GeometryPass::depth_state()),
                    // Planes face the light direction; draw both sides.
                    cull_mode: None,
                },
            );
        }
    }

    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &Framebuffer,
        scene: &Scene,
        pools: &ResourcePools,
        blocks: &FrameBlocks,
    ) {
        if !self.enabled || scene.lights.is_empty() {
            return;
        }
        let Some(bind_group) = &self.bind_group else {
            return;
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = (0..4)
            .map(|slot| {
                Some(wgpu::RenderPassColorAttachment {
                    view: gbuffer.color_view(slot).expect("gbuffer color attachment"),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("debug light pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: gbuffer.depth_view().expect("gbuffer depth attachment"),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for (light_index, light) in scene.lights.iter().enumerate() {
            let mesh_index = self.proxy_mesh_index(light.kind);
            let mesh: &Mesh = &pools.meshes[mesh_index];
            let submesh = &mesh.submeshes[0];
            let key = PipelineKey {
                mesh: mesh_index,
                submesh: 0,
                program: self.program,
                generation: self.generation,
            };
            let Some(pipeline) = self.pipelines.get(&key) else {
                continue;
            };

            pass.set_pipeline(pipeline);
            pass.set_bind_group(
                0,
                bind_group,
                &[
                    blocks.lights[light_index].offset,
                    blocks.light_materials[light_index].offset,
                ],
            );
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(submesh.vertex_byte_offset..));
            pass.set_index_buffer(
                mesh.index_buffer.slice(submesh.index_byte_offset..),
                wgpu::IndexFormat::Uint32,
            );
            pass.draw_indexed(0..submesh.index_count, 0, 0..1);
        }
    }
}
