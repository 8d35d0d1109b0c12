//! Engine context and frame orchestration.
//!
//! [`Engine`] is the explicit context object every pass receives state
//! from; there are no ambient globals. The per-frame order is fixed: fill
//! every uniform block, then geometry, debug lights, skybox, lighting,
//! bloom and the final composite. Lighting depends on the geometry
//! outputs, bloom on the lighting output, and the composite on both, so
//! the sequence is an invariant, not a scheduling choice.

use std::sync::Arc;

use glam::Vec4;
use winit::window::Window as WinitWindow;

use crate::arena::UniformArena;
use crate::environment::Environment;
use crate::error::{EngineError, EngineResult};
use crate::framebuffer::{AttachmentDesc, Framebuffer};
use crate::passes::{
    lighting::LIT_FORMAT, BloomPipeline, CompositePass, DebugLightPass, DrawMode, FrameBlocks,
    GeometryPass, LightingPass,
};
use crate::passes::bloom::BLOOM_MIP_LEVELS;
use crate::passes::debug_lights::LightProxies;
use crate::resources::{model, Mesh, Model, ResourcePools, Texture2D, TextureData};
use crate::scene::Scene;
use crate::shader::ProgramRegistry;
use crate::EngineConfig;

/// Capacity of the packed light list in the global uniform block. The
/// `MAX_LIGHTS` constant in the lighting shader mirrors this value.
pub const MAX_LIGHTS: usize = 16;

/// The engine: GPU context, resource pools, scene and the pass pipeline.
pub struct Engine {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,

    registry: ProgramRegistry,
    arena: UniformArena,

    pub pools: ResourcePools,
    pub scene: Scene,
    pub draw_mode: DrawMode,

    gbuffer: Framebuffer,
    lit: Framebuffer,
    environment: Environment,

    geometry: GeometryPass,
    pub debug_lights: DebugLightPass,
    lighting: LightingPass,
    pub bloom: BloomPipeline,
    composite: CompositePass,

    blocks: FrameBlocks,

    quad_mesh: usize,
    cube_mesh: usize,
    pub sphere_mesh: usize,
    pub plane_mesh: usize,
}

impl Engine {
    pub fn new(window: Arc<WinitWindow>, config: &EngineConfig) -> EngineResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| EngineError::SurfaceCreation(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or(EngineError::AdapterNotFound)?;

        let info = adapter.get_info();
        log::info!(
            "adapter: {} ({:?}), driver: {} {}",
            info.name,
            info.backend,
            info.driver,
            info.driver_info
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("ember device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| EngineError::DeviceCreation(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("uncaptured GPU error: {error}");
        }));

        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(caps.formats[0]);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: config.width.max(1),
            height: config.height.max(1),
            present_mode: if config.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let mut arena = UniformArena::new(&device, config.arena_capacity);
        let mut registry = ProgramRegistry::new();

        // Default textures and embedded geometry.
        let mut pools = ResourcePools::default();
        for data in [
            TextureData::white(),
            TextureData::black(),
            TextureData::flat_normal(),
            TextureData::magenta(),
        ] {
            pools.textures.push(Texture2D::create(&device, &queue, &data));
        }
        pools.white_texture = 0;

        let quad_mesh = push_mesh(&mut pools, &device, model::screen_quad(), "screen quad");
        let cube_mesh = push_mesh(&mut pools, &device, model::unit_cube(), "unit cube");
        let sphere_mesh = push_mesh(&mut pools, &device, model::uv_sphere(1.0, 16, 24), "sphere");
        let plane_mesh = push_mesh(&mut pools, &device, model::plane(1.0), "plane");

        // Shader programs. Failures here are fatal: unlike hot reload,
        // there is no previous program to fall back to.
        let shader_dir = &config.shader_dir;
        let program = |registry: &mut ProgramRegistry, file: &str, name: &str| {
            registry.create_program(&device, shader_dir.join(file), name)
        };
        let geometry_program = program(&mut registry, "geometry.glsl", "GEOMETRY")?;
        let lighting_program = program(&mut registry, "lighting.glsl", "LIGHTING")?;
        let bright_program = program(&mut registry, "bloom_bright.glsl", "BLOOM_BRIGHT")?;
        let downsample_program =
            program(&mut registry, "bloom_downsample.glsl", "BLOOM_DOWNSAMPLE")?;
        let blur_program = program(&mut registry, "bloom_blur.glsl", "BLOOM_BLUR")?;
        let bloom_composite_program =
            program(&mut registry, "bloom_composite.glsl", "BLOOM_COMPOSITE")?;
        let composite_program = program(&mut registry, "composite.glsl", "COMPOSITE")?;

        let display = (surface_config.width, surface_config.height);

        let mut gbuffer = Framebuffer::new();
        gbuffer.push_attachment(AttachmentDesc::color(
            "gbuffer albedo",
            display.0,
            display.1,
            wgpu::TextureFormat::Rgba16Float,
        ));
        gbuffer.push_attachment(AttachmentDesc::color(
            "gbuffer normals",
            display.0,
            display.1,
            wgpu::TextureFormat::Rgba16Float,
        ));
        gbuffer.push_attachment(AttachmentDesc::color(
            "gbuffer world position",
            display.0,
            display.1,
            wgpu::TextureFormat::Rgba16Float,
        ));
        gbuffer.push_attachment(AttachmentDesc::color(
            "gbuffer reflectivity",
            display.0,
            display.1,
            wgpu::TextureFormat::R16Float,
        ));
        gbuffer.push_attachment(AttachmentDesc::depth("gbuffer depth", display.0, display.1));
        gbuffer.attach(&device)?;

        let mut lit = Framebuffer::new();
        lit.push_attachment(AttachmentDesc::color(
            "lit color",
            display.0,
            display.1,
            LIT_FORMAT,
        ));
        lit.attach(&device)?;

        let environment = Environment::build(
            &device,
            &queue,
            &mut arena,
            &mut registry,
            shader_dir,
            &config.environment_hdr,
            &pools.meshes[cube_mesh],
        )?;

        let geometry = GeometryPass::new(&device, geometry_program);
        let debug_lights = DebugLightPass::new(
            &device,
            geometry_program,
            LightProxies {
                sphere_mesh,
                plane_mesh,
            },
        );
        let lighting = LightingPass::new(&device, lighting_program);
        let bloom = BloomPipeline::new(
            &device,
            display,
            bright_program,
            downsample_program,
            blur_program,
            bloom_composite_program,
        )?;
        let composite = CompositePass::new(&device, composite_program, surface_format);

        let mut scene = Scene::new();
        scene
            .camera
            .set_aspect_ratio(display.0 as f32 / display.1 as f32);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            registry,
            arena,
            pools,
            scene,
            draw_mode: DrawMode::default(),
            gbuffer,
            lit,
            environment,
            geometry,
            debug_lights,
            lighting,
            bloom,
            composite,
            blocks: FrameBlocks::default(),
            quad_mesh,
            cube_mesh,
            sphere_mesh,
            plane_mesh,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    pub fn display_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    /// Register a model built from imported data and return its index.
    pub fn add_model(&mut self, mesh: Mesh, material_indices: Vec<usize>, name: &str) -> usize {
        self.pools.meshes.push(mesh);
        let mesh_index = self.pools.meshes.len() - 1;
        self.pools.models.push(Model {
            name: name.to_string(),
            mesh_index,
            material_indices,
        });
        self.pools.models.len() - 1
    }

    /// Register a model around an existing mesh with one material.
    pub fn add_primitive_model(&mut self, mesh_index: usize, material_index: usize, name: &str) -> usize {
        let submesh_count = self.pools.meshes[mesh_index].submeshes.len();
        self.pools.models.push(Model {
            name: name.to_string(),
            mesh_index,
            material_indices: vec![material_index; submesh_count],
        });
        self.pools.models.len() - 1
    }

    /// Import a glTF file into the pools; returns the new model indices.
    pub fn load_model(&mut self, path: impl AsRef<std::path::Path>) -> EngineResult<Vec<usize>> {
        crate::import::load_gltf(&self.device, &self.queue, &mut self.pools, path.as_ref())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.scene
            .camera
            .set_aspect_ratio(width as f32 / height as f32);

        if let Err(err) = self.gbuffer.regenerate(&self.device, width, height) {
            log::error!("gbuffer regenerate failed: {err}");
        }
        if let Err(err) = self.lit.regenerate(&self.device, width, height) {
            log::error!("lit target regenerate failed: {err}");
        }
        if let Err(err) = self.bloom.resize(&self.device, (width, height)) {
            log::error!("bloom target resize failed: {err}");
        }
        // Passes that sample the regenerated targets hold stale views.
        self.lighting.invalidate();
        self.composite.invalidate();
    }

    /// Per-frame state update. Hot reload runs here, before any pass of
    /// this frame binds a program.
    pub fn update(&mut self) {
        let changed = self.registry.hot_reload(&self.device);
        if !changed.is_empty() {
            // Generation bumps already invalidate the pipeline caches;
            // passes that cache whole bind groups rebuild in prepare().
            log::debug!("{} shader program(s) reloaded", changed.len());
        }
        self.scene.sanitize();
    }

    /// Fill every uniform block for the frame. All previously returned
    /// block ranges are invalidated here; passes must use this frame's
    /// [`FrameBlocks`].
    fn fill_uniforms(&mut self) -> EngineResult<()> {
        self.arena.begin_frame();

        let view = self.scene.camera.view_matrix();
        let projection = self.scene.camera.projection_matrix();
        let view_projection = projection * view;

        // Global block: camera, then the packed light list.
        let writer = self.arena.writer();
        let start = writer.begin_block();
        writer.push_mat4(view)?;
        writer.push_mat4(projection)?;
        writer.push_vec4(self.scene.camera.position.extend(1.0))?;
        writer.push_vec4(Vec4::new(
            self.scene.lights.len().min(MAX_LIGHTS) as f32,
            0.0,
            0.0,
            0.0,
        ))?;
        for slot in 0..MAX_LIGHTS {
            match self.scene.lights.get(slot) {
                Some(light) => {
                    writer.push_vec4(light.color.extend(light.kind.shader_id()))?;
                    writer.push_vec4(light.direction.extend(light.max_distance))?;
                    writer.push_vec4(light.position.extend(0.0))?;
                }
                None => {
                    for _ in 0..3 {
                        writer.push_vec4(Vec4::ZERO)?;
                    }
                }
            }
        }
        self.blocks.global = writer.finish_block(start);

        // Per-entity blocks.
        self.blocks.entities.clear();
        for entity in &mut self.scene.entities {
            self.blocks
                .entities
                .push(entity.push_params(self.arena.writer(), view_projection)?);
        }

        // Per-light proxy blocks: a transform block plus a material-shaped
        // color block, since the debug pass reuses the geometry program.
        self.blocks.lights.clear();
        self.blocks.light_materials.clear();
        for light in &mut self.scene.lights {
            self.blocks
                .lights
                .push(light.push_params(self.arena.writer(), view_projection)?);
            let writer = self.arena.writer();
            let start = writer.begin_block();
            writer.push_vec4(light.color.extend(1.0))?;
            writer.push_vec4(light.color.extend(1.0))?;
            writer.push_vec4(Vec4::ZERO)?;
            self.blocks.light_materials.push(writer.finish_block(start));
        }

        // Per-material blocks.
        self.blocks.materials.clear();
        for material in &mut self.pools.materials {
            self.blocks
                .materials
                .push(material.push_params(self.arena.writer())?);
        }

        // Pass parameter blocks.
        let writer = self.arena.writer();
        let start = writer.begin_block();
        writer.push_vec4(Vec4::new(self.bloom.threshold, 0.0, 0.0, 0.0))?;
        self.blocks.bright = writer.finish_block(start);

        let start = writer.begin_block();
        writer.push_vec4(Vec4::new(1.0, 0.0, 0.0, 0.0))?;
        self.blocks.blur_horizontal = writer.finish_block(start);

        let start = writer.begin_block();
        writer.push_vec4(Vec4::new(0.0, 1.0, 0.0, 0.0))?;
        self.blocks.blur_vertical = writer.finish_block(start);

        self.blocks.bloom_levels.clear();
        for level in 0..BLOOM_MIP_LEVELS as usize {
            let start = writer.begin_block();
            writer.push_vec4(Vec4::new(
                level as f32,
                self.bloom.level_intensities[level],
                0.0,
                0.0,
            ))?;
            self.blocks.bloom_levels.push(writer.finish_block(start));
        }

        let start = writer.begin_block();
        writer.push_vec4(Vec4::new(self.draw_mode as u32 as f32, 0.0, 0.0, 0.0))?;
        self.blocks.composite = writer.finish_block(start);

        self.arena.end_frame(&self.queue);
        Ok(())
    }

    /// Render one frame in the fixed pass order and present it.
    ///
    /// `overlay` records on top of the composited surface; the windowed
    /// shell uses it for the inspector GUI.
    pub fn render(
        &mut self,
        mut overlay: impl FnMut(&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder, &wgpu::TextureView),
    ) -> EngineResult<()> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(EngineError::DeviceCreation("surface out of memory".into()))
            }
        };
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        if let Err(err) = self.fill_uniforms() {
            log::error!("uniform fill failed, skipping frame: {err}");
            frame.present();
            return Ok(());
        }

        // Build pipelines and bind groups outside the render passes.
        self.geometry.prepare(
            &self.device,
            &self.registry,
            &self.arena,
            &self.scene,
            &self.pools,
        );
        self.debug_lights
            .prepare(&self.device, &self.registry, &self.arena, &self.pools);
        self.lighting.prepare(
            &self.device,
            &self.registry,
            &self.arena,
            &self.gbuffer,
            &self.environment,
            &self.pools.meshes[self.quad_mesh],
        );
        self.bloom.prepare(
            &self.device,
            &self.registry,
            &self.arena,
            self.lit.color_view(0).expect("lit view"),
            &self.pools.meshes[self.quad_mesh],
        );
        self.composite.prepare(
            &self.device,
            &self.registry,
            &self.arena,
            &self.gbuffer,
            self.lit.color_view(0).expect("lit view"),
            self.bloom.bloom_view().expect("bloom view"),
            &self.pools.meshes[self.quad_mesh],
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        let quad = &self.pools.meshes[self.quad_mesh];
        let display = self.display_size();

        self.geometry
            .record(&mut encoder, &self.gbuffer, &self.scene, &self.pools, &self.blocks);
        self.debug_lights
            .record(&mut encoder, &self.gbuffer, &self.scene, &self.pools, &self.blocks);
        self.environment.record_skybox(
            &self.device,
            &self.registry,
            &mut encoder,
            self.gbuffer.color_view(0).expect("gbuffer albedo"),
            self.gbuffer.depth_view().expect("gbuffer depth"),
            self.blocks.global,
            &self.arena,
            &self.pools.meshes[self.cube_mesh],
        );
        self.lighting.record(
            &mut encoder,
            self.lit.color_view(0).expect("lit view"),
            quad,
            &self.blocks,
        );
        self.bloom.record(
            &mut encoder,
            self.lit.color_view(0).expect("lit view"),
            display,
            quad,
            &self.blocks,
        );
        self.composite
            .record(&mut encoder, &surface_view, quad, &self.blocks);

        overlay(&self.device, &self.queue, &mut encoder, &surface_view);

        self.queue.submit([encoder.finish()]);
        frame.present();
        Ok(())
    }
}

fn push_mesh(
    pools: &mut ResourcePools,
    device: &wgpu::Device,
    data: crate::resources::MeshData,
    label: &str,
) -> usize {
    pools.meshes.push(Mesh::create(device, &data, label));
    pools.meshes.len() - 1
}
