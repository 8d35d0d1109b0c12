//! Inspector panels rendered with egui.
//!
//! The panels bind widgets straight to engine state: camera parameters,
//! entity transforms, material factors, light parameters, bloom weights
//! and the composite draw-mode selector. There is no command layer in
//! between; the GUI mutates the fields the passes read next frame.

use egui::ViewportId;
use egui_wgpu::ScreenDescriptor;
use glam::Vec3;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::engine::Engine;
use crate::passes::bloom::BLOOM_MIP_LEVELS;
use crate::passes::DrawMode;
use crate::scene::{Light, LightKind};

/// egui context, input state and renderer for the inspector overlay.
pub struct Gui {
    ctx: egui::Context,
    winit_state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    paint_jobs: Vec<egui::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
}

impl Gui {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat, window: &Window) -> Self {
        let ctx = egui::Context::default();
        let winit_state = egui_winit::State::new(
            ctx.clone(),
            ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
        );
        let renderer = egui_wgpu::Renderer::new(device, surface_format, None, 1);

        Self {
            ctx,
            winit_state,
            renderer,
            paint_jobs: Vec::new(),
            textures_delta: egui::TexturesDelta::default(),
        }
    }

    /// Feed a window event to egui. Returns true when egui consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    /// Run the inspector panels for this frame.
    pub fn run(&mut self, window: &Window, engine: &mut Engine) {
        let raw_input = self.winit_state.take_egui_input(window);
        self.ctx.begin_frame(raw_input);

        inspector_panels(&self.ctx, engine);

        let full_output = self.ctx.end_frame();
        self.winit_state
            .handle_platform_output(window, full_output.platform_output);
        self.paint_jobs = self
            .ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        self.textures_delta = full_output.textures_delta;
    }

    /// Record the overlay on top of the composited surface.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
        width: u32,
        height: u32,
    ) {
        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: [width, height],
            pixels_per_point: self.ctx.pixels_per_point(),
        };

        for (id, image_delta) in &self.textures_delta.set {
            self.renderer
                .update_texture(device, queue, *id, image_delta);
        }
        self.renderer.update_buffers(
            device,
            queue,
            encoder,
            &self.paint_jobs,
            &screen_descriptor,
        );

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("gui pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: surface_view,
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
            self.renderer
                .render(&mut pass, &self.paint_jobs, &screen_descriptor);
        }

        for id in &self.textures_delta.free {
            self.renderer.free_texture(id);
        }
        self.textures_delta = egui::TexturesDelta::default();
    }
}

fn inspector_panels(ctx: &egui::Context, engine: &mut Engine) {
    egui::Window::new("Camera").default_open(false).show(ctx, |ui| {
        let camera = &mut engine.scene.camera;
        vec3_row(ui, "position", &mut camera.position, 0.1);
        vec3_row(ui, "target", &mut camera.target, 0.1);
        ui.horizontal(|ui| {
            ui.label("fov");
            ui.add(egui::DragValue::new(&mut camera.fov).clamp_range(10.0..=170.0));
            ui.label("near");
            ui.add(egui::DragValue::new(&mut camera.z_near).speed(0.01));
            ui.label("far");
            ui.add(egui::DragValue::new(&mut camera.z_far).speed(1.0));
        });
    });

    egui::Window::new("Entities").show(ctx, |ui| {
        for entity in &mut engine.scene.entities {
            ui.collapsing(entity.name.clone(), |ui| {
                vec3_row(ui, "position", &mut entity.position, 0.05);
                vec3_row(ui, "rotation", &mut entity.rotation, 0.01);
                vec3_row(ui, "scale", &mut entity.scale, 0.05);
            });
        }
    });

    egui::Window::new("Lights").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if ui.button("add point").clicked() {
                engine.scene.lights.push(Light::point(
                    Vec3::ONE,
                    Vec3::new(0.0, 2.0, 0.0),
                    10.0,
                ));
            }
            if ui.button("add directional").clicked() {
                engine
                    .scene
                    .lights
                    .push(Light::directional(Vec3::ONE, Vec3::new(-0.3, -1.0, -0.2)));
            }
        });
        ui.checkbox(&mut engine.debug_lights.enabled, "draw light proxies");

        let mut remove = None;
        for (index, light) in engine.scene.lights.iter_mut().enumerate() {
            let title = match light.kind {
                LightKind::Directional => format!("directional {index}"),
                LightKind::Point => format!("point {index}"),
            };
            ui.collapsing(title, |ui| {
                color_row(ui, "color", &mut light.color);
                match light.kind {
                    LightKind::Directional => {
                        vec3_row(ui, "direction", &mut light.direction, 0.01)
                    }
                    LightKind::Point => {
                        vec3_row(ui, "position", &mut light.position, 0.05);
                        ui.horizontal(|ui| {
                            ui.label("max distance");
                            ui.add(egui::DragValue::new(&mut light.max_distance).speed(0.1));
                        });
                    }
                }
                if ui.button("remove").clicked() {
                    remove = Some(index);
                }
            });
        }
        if let Some(index) = remove {
            engine.scene.lights.remove(index);
        }
    });

    egui::Window::new("Materials").default_open(false).show(ctx, |ui| {
        for material in &mut engine.pools.materials {
            ui.collapsing(material.name.clone(), |ui| {
                color_row(ui, "albedo", &mut material.albedo);
                color_row(ui, "emissive", &mut material.emissive);
                ui.horizontal(|ui| {
                    ui.label("smoothness");
                    ui.add(egui::Slider::new(&mut material.smoothness, 0.0..=1.0));
                });
                ui.horizontal(|ui| {
                    ui.label("reflectivity");
                    ui.add(egui::Slider::new(&mut material.reflectivity, 0.0..=1.0));
                });
            });
        }
    });

    egui::Window::new("Rendering").show(ctx, |ui| {
        egui::ComboBox::from_label("draw mode")
            .selected_text(engine.draw_mode.label())
            .show_ui(ui, |ui| {
                for mode in DrawMode::ALL {
                    ui.selectable_value(&mut engine.draw_mode, mode, mode.label());
                }
            });

        ui.separator();
        ui.checkbox(&mut engine.bloom.enabled, "bloom");
        ui.horizontal(|ui| {
            ui.label("threshold");
            ui.add(egui::Slider::new(&mut engine.bloom.threshold, 0.0..=4.0));
        });
        for level in 0..BLOOM_MIP_LEVELS as usize {
            ui.horizontal(|ui| {
                ui.label(format!("level {level}"));
                ui.add(egui::Slider::new(
                    &mut engine.bloom.level_intensities[level],
                    0.0..=2.0,
                ));
            });
        }
    });
}

fn vec3_row(ui: &mut egui::Ui, label: &str, value: &mut Vec3, speed: f32) {
    ui.horizontal(|ui| {
        ui.label(label);
        ui.add(egui::DragValue::new(&mut value.x).speed(speed));
        ui.add(egui::DragValue::new(&mut value.y).speed(speed));
        ui.add(egui::DragValue::new(&mut value.z).speed(speed));
    });
}

fn color_row(ui: &mut egui::Ui, label: &str, value: &mut Vec3) {
    ui.horizontal(|ui| {
        ui.label(label);
        let mut rgb = [value.x, value.y, value.z];
        if ui.color_edit_button_rgb(&mut rgb).changed() {
            *value = Vec3::from_array(rgb);
        }
    });
}
