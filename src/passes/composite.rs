//! Final composite: publish the frame to the surface.
//!
//! Full-screen switch on [`DrawMode`](super::DrawMode): the default mode
//! shows the lit-plus-bloom result, the others visualize one intermediate
//! channel (albedo, normals, world position, bloom, depth, reflectivity)
//! for debugging.

use crate::arena::UniformArena;
use crate::framebuffer::Framebuffer;
use crate::resources::pipeline_cache::{build_pipeline, PassPipelineDesc};
use crate::resources::Mesh;
use crate::shader::{ProgramId, ProgramRegistry};

use super::{linear_sampler, program_bind_group, program_bind_group_layout, FrameBlocks};

const LIT_BINDING: u32 = 3;
const GBUFFER_ALBEDO_BINDING: u32 = 4;
const GBUFFER_NORMALS_BINDING: u32 = 5;
const GBUFFER_WORLD_POS_BINDING: u32 = 6;
const GBUFFER_REFLECTIVITY_BINDING: u32 = 7;
const BLOOM_BINDING: u32 = 8;

struct CompositeResources {
    generation: u64,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

pub struct CompositePass {
    pub program: ProgramId,
    surface_format: wgpu::TextureFormat,
    sampler: wgpu::Sampler,
    resources: Option<CompositeResources>,
}

impl CompositePass {
    pub fn new(
        device: &wgpu::Device,
        program: ProgramId,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            program,
            surface_format,
            sampler: linear_sampler(device, "composite sampler"),
            resources: None,
        }
    }

    pub fn invalidate(&mut self) {
        self.resources = None;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        registry: &ProgramRegistry,
        arena: &UniformArena,
        gbuffer: &Framebuffer,
        lit_view: &wgpu::TextureView,
        bloom_view: &wgpu::TextureView,
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

        let layout = program_bind_group_layout(device, program, "composite");
        let pipeline_layout = super::program_pipeline_layout(device, &layout, "composite");
        let pipeline = build_pipeline(
            device,
            program,
            &quad.submeshes[0].layout,
            &PassPipelineDesc {
                label: "composite",
                layout: &pipeline_layout,
                color_targets: &[Some(wgpu::ColorTargetState {
                    format: self.surface_format,
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
                (LIT_BINDING, lit_view),
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
                (BLOOM_BINDING, bloom_view),
            ],
            &self.sampler,
            "composite",
        );

        self.resources = Some(CompositeResources {
            generation: program.generation,
            pipeline,
            bind_group,
        });
    }

    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
        quad: &Mesh,
        blocks: &FrameBlocks,
    ) {
        let Some(resources) = &self.resources else {
            return;
        };
        let submesh = &quad.submeshes[0];

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("composite pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: surface_view,
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
        pass.set_bind_group(0, &resources.bind_group, &[blocks.composite.offset]);
        pass.set_vertex_buffer(0, quad.vertex_buffer.slice(submesh.vertex_byte_offset..));
        pass.set_index_buffer(
            quad.index_buffer.slice(submesh.index_byte_offset..),
            wgpu::IndexFormat::Uint32,
        );
        pass.draw_indexed(0..submesh.index_count, 0, 0..1);
    }
}
