//! Environment map precomputation and the skybox pass.
//!
//! A single equirectangular HDR image is projected onto a cubemap by
//! rasterizing a unit cube six times from the origin, one 90-degree view
//! per face. The irradiance map repeats the same six-face capture over a
//! diffuse-convolution shader. Both run once at startup; the results are
//! immutable afterwards.

use std::path::Path;

use glam::{Mat4, Vec3};

use crate::arena::{BlockRange, UniformArena};
use crate::error::EngineResult;
use crate::passes::{
    linear_sampler, program_bind_group, program_bind_group_layout, program_pipeline_layout,
};
use crate::resources::pipeline_cache::{build_pipeline, PassPipelineDesc};
use crate::resources::texture::{CubeTexture, Texture2D, TextureData};
use crate::resources::Mesh;
use crate::shader::{ProgramId, ProgramRegistry};

pub const CUBEMAP_RESOLUTION: u32 = 512;
pub const IRRADIANCE_RESOLUTION: u32 = 32;

/// Binding of the source texture in the capture and skybox shaders.
const INPUT_TEXTURE_BINDING: u32 = 3;

/// Projection used for every face capture: 90-degree vertical FOV over a
/// square viewport, so the six frusta tile the sphere exactly.
pub fn capture_projection() -> Mat4 {
    Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.1, 10.0)
}

/// View matrices for the six cube faces in +X, -X, +Y, -Y, +Z, -Z order.
///
/// The up vectors are load-bearing: (0,-1,0) for the horizontal faces and
/// (0,0,±1) for ±Y keep the face orientations consistent with cubemap
/// addressing, otherwise faces land flipped and seams show.
pub fn capture_views() -> [Mat4; 6] {
    let origin = Vec3::ZERO;
    [
        Mat4::look_at_rh(origin, Vec3::X, Vec3::new(0.0, -1.0, 0.0)),
        Mat4::look_at_rh(origin, Vec3::NEG_X, Vec3::new(0.0, -1.0, 0.0)),
        Mat4::look_at_rh(origin, Vec3::Y, Vec3::new(0.0, 0.0, 1.0)),
        Mat4::look_at_rh(origin, Vec3::NEG_Y, Vec3::new(0.0, 0.0, -1.0)),
        Mat4::look_at_rh(origin, Vec3::Z, Vec3::new(0.0, -1.0, 0.0)),
        Mat4::look_at_rh(origin, Vec3::NEG_Z, Vec3::new(0.0, -1.0, 0.0)),
    ]
}

/// The environment's cube render target and irradiance companion.
pub struct Environment {
    pub cubemap: CubeTexture,
    pub irradiance: CubeTexture,
    pub skybox_program: ProgramId,
    skybox: Option<SkyboxResources>,
}

struct SkyboxResources {
    generation: u64,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

impl Environment {
    /// Upload the HDR source, then derive the cubemap and irradiance map.
    ///
    /// A missing or corrupt HDR file degrades to a black environment with
    /// an error log; the captures still run and produce black faces.
    pub fn build(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        arena: &mut UniformArena,
        registry: &mut ProgramRegistry,
        shader_dir: &Path,
        hdr_path: &Path,
        cube: &Mesh,
    ) -> EngineResult<Self> {
        let hdr = Texture2D::create(device, queue, &TextureData::hdr_or_black(hdr_path));

        let cubemap = CubeTexture::new(device, CUBEMAP_RESOLUTION, "environment cubemap");
        let irradiance = CubeTexture::new(device, IRRADIANCE_RESOLUTION, "irradiance cubemap");

        let to_cubemap = registry.create_program(
            device,
            shader_dir.join("hdr_to_cubemap.glsl"),
            "HDR_TO_CUBEMAP",
        )?;
        let convolve =
            registry.create_program(device, shader_dir.join("irradiance.glsl"), "IRRADIANCE")?;
        let skybox_program =
            registry.create_program(device, shader_dir.join("skybox.glsl"), "SKYBOX")?;

        render_faces(
            device,
            queue,
            arena,
            registry,
            to_cubemap,
            cube,
            &hdr.view,
            &cubemap,
            "hdr to cubemap",
        )?;
        render_faces(
            device,
            queue,
            arena,
            registry,
            convolve,
            cube,
            &cubemap.cube_view,
            &irradiance,
            "irradiance convolution",
        )?;

        log::info!(
            "environment built: {}x{} cubemap, {}x{} irradiance map",
            CUBEMAP_RESOLUTION,
            CUBEMAP_RESOLUTION,
            IRRADIANCE_RESOLUTION,
            IRRADIANCE_RESOLUTION
        );

        Ok(Self {
            cubemap,
            irradiance,
            skybox_program,
            skybox: None,
        })
    }

    /// Draw the skybox into the albedo target, depth-tested LEQUAL against
    /// the geometry pass depth with writes off, so it only fills the
    /// background.
    #[allow(clippy::too_many_arguments)]
    pub fn record_skybox(
        &mut self,
        device: &wgpu::Device,
        registry: &ProgramRegistry,
        encoder: &mut wgpu::CommandEncoder,
        albedo_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        global_block: BlockRange,
        arena: &UniformArena,
        cube: &Mesh,
    ) {
        let program = registry.get(self.skybox_program);

        let stale = self
            .skybox
            .as_ref()
            .map(|r| r.generation != program.generation)
            .unwrap_or(true);
        if stale {
            let layout = program_bind_group_layout(device, program, "skybox");
            let pipeline_layout = program_pipeline_layout(device, &layout, "skybox");
            let sampler = linear_sampler(device, "skybox sampler");
            let pipeline = build_pipeline(
                device,
                program,
                &cube.submeshes[0].layout,
                &PassPipelineDesc {
                    label: "skybox",
                    layout: &pipeline_layout,
                    color_targets: &[Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::Rgba16Float,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: wgpu::TextureFormat::Depth24Plus,
                        depth_write_enabled: false,
                        depth_compare: wgpu::CompareFunction::LessEqual,
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                    cull_mode: Some(wgpu::Face::Front),
                },
            );
            let bind_group = program_bind_group(
                device,
                &layout,
                program,
                arena.buffer(),
                &[(INPUT_TEXTURE_BINDING, &self.cubemap.cube_view)],
                &sampler,
                "skybox",
            );
            self.skybox = Some(SkyboxResources {
                generation: program.generation,
                pipeline,
                bind_group,
            });
        }

        let resources = self.skybox.as_ref().unwrap();
        let submesh = &cube.submeshes[0];

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("skybox pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: albedo_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&resources.pipeline);
        pass.set_bind_group(0, &resources.bind_group, &[global_block.offset]);
        pass.set_vertex_buffer(0, cube.vertex_buffer.slice(submesh.vertex_byte_offset..));
        pass.set_index_buffer(
            cube.index_buffer.slice(submesh.index_byte_offset..),
            wgpu::IndexFormat::Uint32,
        );
        pass.draw_indexed(0..submesh.index_count, 0, 0..1);
    }

    /// Force the skybox pipeline to rebuild, e.g. after a hot reload.
    pub fn invalidate(&mut self) {
        self.skybox = None;
    }
}

/// Rasterize the unit cube once per face with the given program, the face
/// bound as the sole color attachment.
#[allow(clippy::too_many_arguments)]
fn render_faces(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    arena: &mut UniformArena,
    registry: &ProgramRegistry,
    program_id: ProgramId,
    cube: &Mesh,
    input: &wgpu::TextureView,
    target: &CubeTexture,
    label: &str,
) -> EngineResult<()> {
    let program = registry.get(program_id);
    let projection = capture_projection();
    let views = capture_views();

    // One Local block per face: view then projection.
    arena.begin_frame();
    let mut blocks = [BlockRange { offset: 0, size: 0 }; 6];
    for (face, view) in views.iter().enumerate() {
        let writer = arena.writer();
        let start = writer.begin_block();
        writer.push_mat4(*view)?;
        writer.push_mat4(projection)?;
        blocks[face] = writer.finish_block(start);
    }
    arena.end_frame(queue);

    let layout = program_bind_group_layout(device, program, label);
    let pipeline_layout = program_pipeline_layout(device, &layout, label);
    let sampler = linear_sampler(device, label);
    let pipeline = build_pipeline(
        device,
        program,
        &cube.submeshes[0].layout,
        &PassPipelineDesc {
            label,
            layout: &pipeline_layout,
            color_targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba16Float,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            depth_stencil: None,
            cull_mode: Some(wgpu::Face::Front),
        },
    );
    let bind_group = program_bind_group(
        device,
        &layout,
        program,
        arena.buffer(),
        &[(INPUT_TEXTURE_BINDING, input)],
        &sampler,
        label,
    );

    let submesh = &cube.submeshes[0];
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some(label),
    });
    for face in 0..6 {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.face_views[face],
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
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[blocks[face].offset]);
        pass.set_vertex_buffer(0, cube.vertex_buffer.slice(submesh.vertex_byte_offset..));
        pass.set_index_buffer(
            cube.index_buffer.slice(submesh.index_byte_offset..),
            wgpu::IndexFormat::Uint32,
        );
        pass.draw_indexed(0..submesh.index_count, 0, 0..1);
    }
    queue.submit([encoder.finish()]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FACE_DIRECTIONS: [Vec3; 6] = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];

    #[test]
    fn test_each_capture_view_faces_its_axis() {
        let views = capture_views();
        for (face, view) in views.iter().enumerate() {
            let in_view = view.transform_point3(FACE_DIRECTIONS[face]);
            // The nominal direction lands straight ahead: -Z in view space.
            assert!(
                in_view.z < 0.0,
                "face {face} does not look down its axis: {in_view:?}"
            );
            assert_relative_eq!(in_view.x, 0.0, epsilon = 1e-6);
            assert_relative_eq!(in_view.y, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_capture_views_sit_at_origin() {
        for view in capture_views() {
            let eye = view.inverse().transform_point3(Vec3::ZERO);
            assert_relative_eq!(eye.length(), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_capture_projection_is_square_90_degrees() {
        let projection = capture_projection();
        // A point on the 45-degree edge of the frustum projects onto the
        // clip boundary for a 90-degree FOV.
        let edge = projection.project_point3(Vec3::new(0.0, 1.0, -1.0));
        assert_relative_eq!(edge.y, 1.0, epsilon = 1e-4);
        let edge = projection.project_point3(Vec3::new(1.0, 0.0, -1.0));
        assert_relative_eq!(edge.x, 1.0, epsilon = 1e-4);
    }
}
