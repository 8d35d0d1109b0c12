//! Bloom post-processing pipeline.
//!
//! Three stages over a five-level mip chain based at half resolution
//! (1/2 down to 1/32 of the display):
//!
//! 1. bright-pixel extraction thresholds the lit output into mip 0 of the
//!    `bright` texture, then the chain is filled by downsampling mip to mip;
//! 2. per level, a horizontal blur reads `bright` and writes `scratch`,
//!    then a vertical blur reads `scratch` and writes `bloom` — the
//!    direction is a uniform vector, never inferred from pass identity;
//! 3. all five blurred levels are summed back onto the lit target with
//!    additive blending and per-level intensity weights.
//!
//! Every blur viewport and every attachment size comes from the same
//! [`mip_extent`] formula; a mismatch there shows up as visible seams.

use crate::arena::UniformArena;
use crate::framebuffer::{mip_extent, AttachmentDesc, Framebuffer};
use crate::resources::pipeline_cache::{build_pipeline, PassPipelineDesc};
use crate::resources::Mesh;
use crate::shader::{Program, ProgramId, ProgramRegistry};

use super::{linear_sampler, program_bind_group, program_bind_group_layout, FrameBlocks};

pub const BLOOM_MIP_LEVELS: u32 = 5;

/// Bright-pass threshold. Tunable from the inspector.
pub const DEFAULT_THRESHOLD: f32 = 0.99;

/// Additive weight per mip level, coarsest levels contributing least.
pub const DEFAULT_LEVEL_INTENSITIES: [f32; BLOOM_MIP_LEVELS as usize] =
    [1.0, 0.8, 0.6, 0.4, 0.2];

const INPUT_TEXTURE_BINDING: u32 = 3;

/// Size of bloom level `level` for a given display size. Level 0 is half
/// the display resolution; this is also the size wgpu assigns mip `level`
/// of the bloom textures, so blur viewports and attachments always agree.
pub fn bloom_level_extent(display: (u32, u32), level: u32) -> (u32, u32) {
    (
        mip_extent(display.0 / 2, level),
        mip_extent(display.1 / 2, level),
    )
}

struct StageResources {
    pipeline: wgpu::RenderPipeline,
    bind_groups: Vec<wgpu::BindGroup>,
}

struct BloomResources {
    generations: [u64; 4],
    bright: StageResources,
    downsample: StageResources,
    blur_horizontal: StageResources,
    blur_vertical: StageResources,
    composite: StageResources,
}

pub struct BloomPipeline {
    pub enabled: bool,
    pub threshold: f32,
    pub level_intensities: [f32; BLOOM_MIP_LEVELS as usize],

    bright_program: ProgramId,
    downsample_program: ProgramId,
    blur_program: ProgramId,
    composite_program: ProgramId,

    /// bright (slot 0), scratch (slot 1), bloom (slot 2); five mips each.
    targets: Framebuffer,
    sampler: wgpu::Sampler,
    resources: Option<BloomResources>,
}

impl BloomPipeline {
    pub fn new(
        device: &wgpu::Device,
        display: (u32, u32),
        bright_program: ProgramId,
        downsample_program: ProgramId,
        blur_program: ProgramId,
        composite_program: ProgramId,
    ) -> Result<Self, crate::error::FramebufferError> {
        let mut targets = Framebuffer::new();
        let (width, height) = bloom_level_extent(display, 0);
        for label in ["bloom bright", "bloom scratch", "bloom blurred"] {
            targets.push_attachment(
                AttachmentDesc::color(label, width, height, wgpu::TextureFormat::Rgba16Float)
                    .with_mips(BLOOM_MIP_LEVELS),
            );
        }
        targets.attach(device)?;

        Ok(Self {
            enabled: true,
            threshold: DEFAULT_THRESHOLD,
            level_intensities: DEFAULT_LEVEL_INTENSITIES,
            bright_program,
            downsample_program,
            blur_program,
            composite_program,
            targets,
            sampler: linear_sampler(device, "bloom sampler"),
            resources: None,
        })
    }

    /// The blurred bloom texture, for the composite draw-mode view.
    pub fn bloom_view(&self) -> Option<&wgpu::TextureView> {
        self.targets.color_view(2)
    }

    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        display: (u32, u32),
    ) -> Result<(), crate::error::FramebufferError> {
        let (width, height) = bloom_level_extent(display, 0);
        self.targets.regenerate(device, width, height)?;
        self.resources = None;
        Ok(())
    }

    pub fn invalidate(&mut self) {
        self.resources = None;
    }

    fn lit_target(blend: Option<wgpu::BlendState>) -> [Option<wgpu::ColorTargetState>; 1] {
        [Some(wgpu::ColorTargetState {
            format: super::lighting::LIT_FORMAT,
            blend,
            write_mask: wgpu::ColorWrites::ALL,
        })]
    }

    fn build_stage(
        &self,
        device: &wgpu::Device,
        program: &Program,
        quad: &Mesh,
        arena: &UniformArena,
        label: &str,
        inputs: &[&wgpu::TextureView],
        blend: Option<wgpu::BlendState>,
    ) -> StageResources {
        let layout = program_bind_group_layout(device, program, label);
        let pipeline_layout = super::program_pipeline_layout(device, &layout, label);
        let pipeline = build_pipeline(
            device,
            program,
            &quad.submeshes[0].layout,
            &PassPipelineDesc {
                label,
                layout: &pipeline_layout,
                color_targets: &Self::lit_target(blend),
                depth_stencil: None,
                cull_mode: None,
            },
        );
        let bind_groups = inputs
            .iter()
            .map(|input| {
                program_bind_group(
                    device,
                    &layout,
                    program,
                    arena.buffer(),
                    &[(INPUT_TEXTURE_BINDING, input)],
                    &self.sampler,
                    label,
                )
            })
            .collect();
        StageResources {
            pipeline,
            bind_groups,
        }
    }

    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        registry: &ProgramRegistry,
        arena: &UniformArena,
        lit_view: &wgpu::TextureView,
        quad: &Mesh,
    ) {
        if !self.enabled {
            return;
        }
        let bright = registry.get(self.bright_program);
        let downsample = registry.get(self.downsample_program);
        let blur = registry.get(self.blur_program);
        let composite = registry.get(self.composite_program);
        let generations = [
            bright.generation,
            downsample.generation,
            blur.generation,
            composite.generation,
        ];

        let stale = self
            .resources
            .as_ref()
            .map(|r| r.generations != generations)
            .unwrap_or(true);
        if !stale {
            return;
        }

        let levels = BLOOM_MIP_LEVELS as usize;
        let mip_view = |slot: usize, level: usize| {
            self.targets
                .color_mip_view(slot, level as u32)
                .expect("bloom mip view")
        };

        // Chain inputs: each downsample level reads the level above it.
        let downsample_inputs: Vec<&wgpu::TextureView> =
            (1..levels).map(|level| mip_view(0, level - 1)).collect();
        let horizontal_inputs: Vec<&wgpu::TextureView> =
            (0..levels).map(|level| mip_view(0, level)).collect();
        let vertical_inputs: Vec<&wgpu::TextureView> =
            (0..levels).map(|level| mip_view(1, level)).collect();

        self.resources = Some(BloomResources {
            generations,
            bright: self.build_stage(device, bright, quad, arena, "bloom bright", &[lit_view], None),
            downsample: self.build_stage(
                device,
                downsample,
                quad,
                arena,
                "bloom downsample",
                &downsample_inputs,
                None,
            ),
            blur_horizontal: self.build_stage(
                device,
                blur,
                quad,
                arena,
                "bloom blur horizontal",
                &horizontal_inputs,
                None,
            ),
            blur_vertical: self.build_stage(
                device,
                blur,
                quad,
                arena,
                "bloom blur vertical",
                &vertical_inputs,
                None,
            ),
            composite: self.build_stage(
                device,
                composite,
                quad,
                arena,
                "bloom composite",
                &[self.targets.color_view(2).expect("bloom blurred view")],
                Some(wgpu::BlendState {
                    color: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::One,
                        dst_factor: wgpu::BlendFactor::One,
                        operation: wgpu::BlendOperation::Add,
                    },
                    alpha: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::One,
                        dst_factor: wgpu::BlendFactor::One,
                        operation: wgpu::BlendOperation::Add,
                    },
                }),
            ),
        });
    }

    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        lit_view: &wgpu::TextureView,
        display: (u32, u32),
        quad: &Mesh,
        blocks: &FrameBlocks,
    ) {
        if !self.enabled {
            return;
        }
        let Some(resources) = &self.resources else {
            return;
        };
        let levels = BLOOM_MIP_LEVELS as usize;

        // Stage 1: threshold into bright mip 0, then fill the chain.
        self.blit(
            encoder,
            &resources.bright,
            0,
            self.targets.color_mip_view(0, 0).expect("bright mip 0"),
            bloom_level_extent(display, 0),
            quad,
            &[blocks.bright.offset],
            "bloom bright pass",
        );
        for level in 1..levels {
            self.blit(
                encoder,
                &resources.downsample,
                level - 1,
                self.targets
                    .color_mip_view(0, level as u32)
                    .expect("bright mip"),
                bloom_level_extent(display, level as u32),
                quad,
                &[],
                "bloom downsample pass",
            );
        }

        // Stage 2: separable blur per level, direction as a uniform vector.
        for level in 0..levels {
            let extent = bloom_level_extent(display, level as u32);
            self.blit(
                encoder,
                &resources.blur_horizontal,
                level,
                self.targets
                    .color_mip_view(1, level as u32)
                    .expect("scratch mip"),
                extent,
                quad,
                &[blocks.blur_horizontal.offset],
                "bloom blur horizontal",
            );
            self.blit(
                encoder,
                &resources.blur_vertical,
                level,
                self.targets
                    .color_mip_view(2, level as u32)
                    .expect("bloom mip"),
                extent,
                quad,
                &[blocks.blur_vertical.offset],
                "bloom blur vertical",
            );
        }

        // Stage 3: additive recombination, one weighted draw per level.
        let submesh = &quad.submeshes[0];
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("bloom composite pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: lit_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&resources.composite.pipeline);
        pass.set_vertex_buffer(0, quad.vertex_buffer.slice(submesh.vertex_byte_offset..));
        pass.set_index_buffer(
            quad.index_buffer.slice(submesh.index_byte_offset..),
            wgpu::IndexFormat::Uint32,
        );
        for level in 0..levels {
            pass.set_bind_group(
                0,
                &resources.composite.bind_groups[0],
                &[blocks.bloom_levels[level].offset],
            );
            pass.draw_indexed(0..submesh.index_count, 0, 0..1);
        }
    }

    /// One full-screen draw into `target` with the viewport pinned to the
    /// level extent computed by [`bloom_level_extent`].
    #[allow(clippy::too_many_arguments)]
    fn blit(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        stage: &StageResources,
        bind_group_index: usize,
        target: &wgpu::TextureView,
        extent: (u32, u32),
        quad: &Mesh,
        offsets: &[u32],
        label: &str,
    ) {
        let submesh = &quad.submeshes[0];
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
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
        pass.set_viewport(0.0, 0.0, extent.0 as f32, extent.1 as f32, 0.0, 1.0);
        pass.set_pipeline(&stage.pipeline);
        pass.set_bind_group(0, &stage.bind_groups[bind_group_index], offsets);
        pass.set_vertex_buffer(0, quad.vertex_buffer.slice(submesh.vertex_byte_offset..));
        pass.set_index_buffer(
            quad.index_buffer.slice(submesh.index_byte_offset..),
            wgpu::IndexFormat::Uint32,
        );
        pass.draw_indexed(0..submesh.index_count, 0, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_extents_halve_from_half_resolution() {
        let display = (1920, 1080);
        assert_eq!(bloom_level_extent(display, 0), (960, 540));
        // The second blur level runs at a quarter of the display.
        assert_eq!(bloom_level_extent(display, 1), (480, 270));
        assert_eq!(bloom_level_extent(display, 4), (60, 33));
    }

    #[test]
    fn test_blur_viewport_matches_declared_mip_size() {
        // The attachment is allocated at half resolution with five mips;
        // GPU mip sizing is floor(base >> level) clamped to 1, the same
        // formula `bloom_level_extent` uses. Any divergence between the
        // two would misalign blur viewports and texture extents.
        let display = (1920, 1080);
        let base = (display.0 / 2, display.1 / 2);
        for level in 0..BLOOM_MIP_LEVELS {
            let declared = (mip_extent(base.0, level), mip_extent(base.1, level));
            assert_eq!(bloom_level_extent(display, level), declared);
        }
    }

    #[test]
    fn test_tiny_displays_never_reach_zero() {
        assert_eq!(bloom_level_extent((16, 16), 4), (1, 1));
        assert_eq!(bloom_level_extent((2, 2), 4), (1, 1));
    }
}
