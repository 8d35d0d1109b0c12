//! Deferred lighting pass.
//!
//! Full-screen pass with depth testing disabled: reads the four G-buffer
//! channels, the environment cubemap, the irradiance map and the packed
//! light list from the global block, and writes one lit HDR color target.
//! Re-recorded every frame since light and camera state change.

use crate::arena::UniformArena;
use crate::environment::Environment;
use crate::framebuffer::Framebuffer;
use crate::resources::pipeline_cache::{build_pipeline, PassPipelineDesc};
use crate::resources::Mesh;
use crate::shader::{ProgramId, ProgramRegistry};

use super::{linear_sampler, program_bind_group, program_bind_group_layout, FrameBlocks};

/// Texture bindings in the lighting shader, in declaration order.
const GBUFFER_ALBEDO_BINDING: u32 = 3;
const GBUFFER_NORMALS_BINDING: u32 = 4;
const GBUFFER_WORLD_POS_BINDING: u32 = 5;
const GBUFFER_REFLECTIVITY_BINDING: u32 = 6;
const ENVIRONMENT_BINDING: u32 = 7;
const IRRADIANCE_BINDING: u32 = 8;

/// Format of the lit output target.
pub const LIT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

struct LightingResources {
    generation: u64,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

pub struct LightingPass {
    pub program: ProgramId,
    sampler: wgpu::Sampler,
    resources: Option<LightingResources>,
}

impl LightingPass {
    pub fn new(device: &wgpu::Device, program: ProgramId) -> Self {
        Self {
            program,
            sampler: linear_sampler(device, "lighting sampler"),
            resources: None,
        }
    }

    /// Drop resources that reference the G-buffer views, e.g. after a
    /// resize regenerated them.
    pub fn invalidate(&mut self) {
        self.resources = None;
    }

    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        registry: &ProgramRegistry,
        arena: &UniformArena,
        gbuffer: &Framebuffer,
        environment: &Environment,
        quad: &Mesh,
    ) {
        let program = registry.get(self.program);
        let stale = self
            .resources
            .as_ref()
            .map(|r| r.generation != program.generation)
            .unwrap_or(true);
        if !stale {
            return;
        }

        let layout = program_bind_group_layout(device, program, "lighting");
        let pipeline_layout = super::program_pipeline_layout(device, &layout, "lighting");
        let pipeline = build_pipeline(
            device,
            program,
            &quad.submeshes[0].layout,
            &PassPipelineDesc {
                label: "lighting",
                layout: &pipeline_layout,
                color_targets: &[Some(wgpu::ColorTargetState {
                    format: LIT_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                depth_stencil: None,
                cull_mode: None,
            },
        );

        let bind_group = program_bind_group(
            device,
            &layout,
            program,
            arena.buffer(),
            &[
                (
                    GBUFFER_ALBEDO_BINDING,
                    gbuffer.color_view(0).expect("gbuffer albedo"),
                ),
                (
                    GBUFFER_NORMALS_BINDING,
                    gbuffer.color_view(1).expect("gbuffer normals"),
                ),
                (
                    GBUFFER_WORLD_POS_BINDING,
                    gbuffer.color_view(2).expect("gbuffer world position"),
                ),
                (
                    GBUFFER_REFLECTIVITY_BINDING,
                    gbuffer.color_view(3).expect("gbuffer reflectivity"),
                ),
                (ENVIRONMENT_BINDING, &environment.cubemap.cube_view),
                (IRRADIANCE_BINDING, &environment.irradiance.cube_view),
            ],
            &self.sampler,
            "lighting",
        );

        self.resources = Some(LightingResources {
            generation: program.generation,
            pipeline,
            bind_group,
        });
    }

    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        lit_view: &wgpu::TextureView,
        quad: &Mesh,
        blocks: &FrameBlocks,
    ) {
        let Some(resources) = &self.resources else {
            return;
        };
        let submesh = &quad.submeshes[0];

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lighting pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: lit_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&resources.pipeline);
        pass.set_bind_group(0, &resources.bind_group, &[blocks.global.offset]);
        pass.set_vertex_buffer(0, quad.vertex_buffer.slice(submesh.vertex_byte_offset..));
        pass.set_index_buffer(
            quad.index_buffer.slice(submesh.index_byte_offset..),
            wgpu::IndexFormat::Uint32,
        );
        pass.draw_indexed(0..submesh.index_count, 0, 0..1);
    }
}
