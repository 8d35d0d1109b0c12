//! Render pipeline cache keyed by (mesh, submesh, program generation).
//!
//! Attribute locations differ across programs, so each submesh needs a
//! pipeline per program it is drawn with. Keys carry the program's
//! generation: after a hot reload the generation changes, fresh pipelines
//! are built against the new modules, and entries for the old generation
//! are purged rather than left to leak.

use std::collections::HashMap;

use crate::shader::{Program, ProgramId};

use super::mesh::VertexBufferLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub mesh: usize,
    pub submesh: usize,
    pub program: ProgramId,
    pub generation: u64,
}

/// Fixed-function state shared by every pipeline a pass builds.
pub struct PassPipelineDesc<'a> {
    pub label: &'a str,
    pub layout: &'a wgpu::PipelineLayout,
    pub color_targets: &'a [Option<wgpu::ColorTargetState>],
    pub depth_stencil: Option<wgpu::DepthStencilState>,
    pub cull_mode: Option<wgpu::Face>,
}

#[derive(Default)]
pub struct PipelineCache {
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    /// Fetch the pipeline for `key`, building it on first use.
    pub fn get_or_create(
        &mut self,
        device: &wgpu::Device,
        key: PipelineKey,
        program: &Program,
        mesh_layout: &VertexBufferLayout,
        desc: &PassPipelineDesc,
    ) -> &wgpu::RenderPipeline {
        self.pipelines.entry(key).or_insert_with(|| {
            build_pipeline(device, program, mesh_layout, desc)
        })
    }

    /// Drop every pipeline built against an older generation of `program`.
    /// Called after a successful hot reload.
    pub fn purge_stale(&mut self, program: ProgramId, current_generation: u64) {
        self.pipelines
            .retain(|key, _| key.program != program || key.generation == current_generation);
    }

    pub fn clear(&mut self) {
        self.pipelines.clear();
    }
}

/// Match the program's reflected vertex inputs against the submesh layout
/// and build the pipeline. A program attribute with no matching mesh
/// attribute is a programmer error: the mesh cannot feed that input.
pub(crate) fn build_pipeline(
    device: &wgpu::Device,
    program: &Program,
    mesh_layout: &VertexBufferLayout,
    desc: &PassPipelineDesc,
) -> wgpu::RenderPipeline {
    let attributes = vertex_attributes(program, mesh_layout);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: &program.vertex_module,
            entry_point: "main",
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: mesh_layout.stride as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: desc.cull_mode,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: desc.depth_stencil.clone(),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &program.fragment_module,
            entry_point: "main",
            targets: desc.color_targets,
        }),
        multiview: None,
    })
}

/// The wgpu vertex attributes for the intersection of program inputs and
/// mesh attributes.
pub(crate) fn vertex_attributes(
    program: &Program,
    mesh_layout: &VertexBufferLayout,
) -> Vec<wgpu::VertexAttribute> {
    let mut attributes = Vec::with_capacity(program.layout.attributes.len());
    for wanted in &program.layout.attributes {
        let Some(provided) = mesh_layout.find(wanted.location) else {
            debug_assert!(
                false,
                "program '{}' wants vertex input at location {} but the mesh layout has none",
                program.name, wanted.location
            );
            continue;
        };
        let format = match provided.component_count {
            1 => wgpu::VertexFormat::Float32,
            2 => wgpu::VertexFormat::Float32x2,
            3 => wgpu::VertexFormat::Float32x3,
            _ => wgpu::VertexFormat::Float32x4,
        };
        attributes.push(wgpu::VertexAttribute {
            format,
            offset: provided.offset as u64,
            shader_location: wanted.location,
        });
    }
    attributes
}
