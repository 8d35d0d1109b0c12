//! Shader program registry.
//!
//! Programs are authored as a single GLSL file; the registry injects a
//! version directive, a `#define <PROGRAM_NAME>` and a stage marker
//! (`#define VERTEX` / `#define FRAGMENT`), then compiles the same body once
//! per stage through naga's GLSL frontend. Authors branch on the stage
//! defines within one file.
//!
//! Uniform blocks follow the engine-wide binding contract declared by
//! [`BindingPoint`]. GLSL combined samplers are split by the frontend into
//! a texture and a sampler; the registry reassigns every split-off sampler
//! a deterministic binding starting at [`SAMPLER_BINDING_OFFSET`] so the
//! CPU-side bind group layout and the module always agree.
//!
//! Compile failures are captured in a bounded info log and reported through
//! [`EngineError::Shader`]; they never abort the engine. Hot reload watches
//! file modification timestamps and recompiles before the frame's passes
//! bind anything; a successful reload bumps the program's generation, which
//! invalidates every pipeline cached against the old one.

use std::borrow::Cow;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{EngineError, EngineResult};

/// Maximum size of a captured compile/link info log, in bytes.
pub const INFO_LOG_CAPACITY: usize = 1024;

/// First binding assigned to split-off samplers. Textures keep their
/// declared bindings, which must stay below this.
pub const SAMPLER_BINDING_OFFSET: u32 = 16;

/// The uniform block binding contract shared by the CPU side and every
/// shader source. This enum is the single place the numbers are declared;
/// `layout(binding = N)` in GLSL must quote them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BindingPoint {
    /// Per-frame parameters: camera matrices and the packed light list.
    Global = 0,
    /// Per-entity / per-light parameters.
    Local = 1,
    /// Per-material parameters.
    Material = 2,
}

impl BindingPoint {
    pub const fn binding(self) -> u32 {
        self as u32
    }

    fn is_contract_binding(binding: u32) -> bool {
        binding <= BindingPoint::Material.binding()
    }
}

/// Identifies a program in the registry. Stable across hot reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub usize);

/// One vertex input expected by a program, reflected from the compiled
/// vertex stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexShaderAttribute {
    pub location: u32,
    pub component_count: u32,
}

/// The reflected vertex-input layout of a program.
#[derive(Debug, Clone, Default)]
pub struct VertexShaderLayout {
    pub attributes: Vec<VertexShaderAttribute>,
}

/// One resource binding reflected from the compiled modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflectedBinding {
    pub binding: u32,
    pub visibility: wgpu::ShaderStages,
    pub kind: ReflectedBindingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectedBindingKind {
    /// std140 uniform block with its byte size.
    Uniform { size: u64 },
    Texture { view_dimension: wgpu::TextureViewDimension },
    Sampler,
}

/// A compiled program: one module per stage plus reflection data.
pub struct Program {
    pub name: String,
    pub path: PathBuf,
    pub vertex_module: wgpu::ShaderModule,
    pub fragment_module: wgpu::ShaderModule,
    pub layout: VertexShaderLayout,
    /// Every binding in group 0, sorted by binding number.
    pub bindings: Vec<ReflectedBinding>,
    /// Bumped on every successful hot reload. Pipeline caches key on this.
    pub generation: u64,
    last_write: Option<SystemTime>,
}

impl Program {
    /// Bindings of the uniform blocks this program declares, ascending.
    /// Dynamic offsets at draw time follow this order.
    pub fn uniform_bindings(&self) -> impl Iterator<Item = u32> + '_ {
        self.bindings.iter().filter_map(|b| match b.kind {
            ReflectedBindingKind::Uniform { .. } => Some(b.binding),
            _ => None,
        })
    }

    /// Bind group layout entries matching this program's group 0, with
    /// every uniform block bound as a dynamic-offset range.
    pub fn bind_group_layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        self.bindings
            .iter()
            .map(|b| wgpu::BindGroupLayoutEntry {
                binding: b.binding,
                visibility: b.visibility,
                ty: match b.kind {
                    ReflectedBindingKind::Uniform { size } => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(size),
                    },
                    ReflectedBindingKind::Texture { view_dimension } => {
                        wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension,
                            multisampled: false,
                        }
                    }
                    ReflectedBindingKind::Sampler => {
                        wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                    }
                },
                count: None,
            })
            .collect()
    }
}

/// Owns every compiled shader program and their hot-reload state.
#[derive(Default)]
pub struct ProgramRegistry {
    programs: Vec<Program>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load, assemble and compile a program from `path`.
    pub fn create_program(
        &mut self,
        device: &wgpu::Device,
        path: impl AsRef<Path>,
        name: &str,
    ) -> EngineResult<ProgramId> {
        let path = path.as_ref();
        let compiled = compile_program(device, path, name)?;
        let last_write = file_write_time(path);

        self.programs.push(Program {
            name: name.to_string(),
            path: path.to_path_buf(),
            vertex_module: compiled.vertex_module,
            fragment_module: compiled.fragment_module,
            layout: compiled.layout,
            bindings: compiled.bindings,
            generation: 1,
            last_write,
        });
        let id = ProgramId(self.programs.len() - 1);
        log::info!("compiled shader program '{}' from {}", name, path.display());
        Ok(id)
    }

    pub fn get(&self, id: ProgramId) -> &Program {
        &self.programs[id.0]
    }

    /// Recompile every program whose source file changed on disk.
    ///
    /// Must run before any pass of the current frame binds a program. On
    /// compile failure the previous program is kept and the failure is
    /// logged; the returned list only contains programs that actually
    /// swapped, so callers can drop pipelines keyed to the old generation.
    pub fn hot_reload(&mut self, device: &wgpu::Device) -> Vec<ProgramId> {
        let mut changed = Vec::new();
        for (index, program) in self.programs.iter_mut().enumerate() {
            let write_time = file_write_time(&program.path);
            if write_time == program.last_write {
                continue;
            }
            program.last_write = write_time;

            match compile_program(device, &program.path, &program.name) {
                Ok(compiled) => {
                    program.vertex_module = compiled.vertex_module;
                    program.fragment_module = compiled.fragment_module;
                    program.layout = compiled.layout;
                    program.bindings = compiled.bindings;
                    program.generation += 1;
                    changed.push(ProgramId(index));
                    log::info!(
                        "hot-reloaded shader program '{}' (generation {})",
                        program.name,
                        program.generation
                    );
                }
                Err(err) => {
                    log::error!("hot reload failed, keeping previous program: {err}");
                }
            }
        }
        changed
    }
}

struct CompiledProgram {
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    layout: VertexShaderLayout,
    bindings: Vec<ReflectedBinding>,
}

fn compile_program(
    device: &wgpu::Device,
    path: &Path,
    name: &str,
) -> EngineResult<CompiledProgram> {
    let body = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let vertex = compile_stage(&body, name, naga::ShaderStage::Vertex)?;
    let fragment = compile_stage(&body, name, naga::ShaderStage::Fragment)?;

    let layout = reflect_vertex_layout(&vertex);
    let bindings = reflect_bindings(name, &vertex, &fragment)?;

    let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{name} (vertex)")),
        source: wgpu::ShaderSource::Naga(Cow::Owned(vertex)),
    });
    let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{name} (fragment)")),
        source: wgpu::ShaderSource::Naga(Cow::Owned(fragment)),
    });

    Ok(CompiledProgram {
        vertex_module,
        fragment_module,
        layout,
        bindings,
    })
}

/// Prepend the version directive, program define and stage marker to the
/// shared source body.
fn assemble_stage_source(body: &str, program_name: &str, stage: naga::ShaderStage) -> String {
    let stage_define = match stage {
        naga::ShaderStage::Vertex => "VERTEX",
        naga::ShaderStage::Fragment => "FRAGMENT",
        naga::ShaderStage::Compute => "COMPUTE",
    };
    format!("#version 450\n#define {program_name}\n#define {stage_define}\n{body}")
}

fn compile_stage(
    body: &str,
    name: &str,
    stage: naga::ShaderStage,
) -> EngineResult<naga::Module> {
    let source = assemble_stage_source(body, name, stage);
    let options = naga::front::glsl::Options::from(stage);

    let mut module = naga::front::glsl::Frontend::default()
        .parse(&options, &source)
        .map_err(|errors| EngineError::Shader {
            name: name.to_string(),
            info_log: truncate_info_log(
                errors
                    .iter()
                    .map(|error| error.to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        })?;

    assign_sampler_bindings(&mut module);

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|error| EngineError::Shader {
        name: name.to_string(),
        info_log: truncate_info_log(error.emit_to_string(&source)),
    })?;

    Ok(module)
}

/// Give every sampler the frontend split off a combined image sampler a
/// deterministic binding, in declaration order from
/// [`SAMPLER_BINDING_OFFSET`]. Texture globals keep their declared
/// bindings.
fn assign_sampler_bindings(module: &mut naga::Module) {
    let samplers: Vec<_> = module
        .global_variables
        .iter()
        .filter(|(_, var)| {
            matches!(module.types[var.ty].inner, naga::TypeInner::Sampler { .. })
        })
        .map(|(handle, _)| handle)
        .collect();

    for (index, handle) in samplers.into_iter().enumerate() {
        module.global_variables[handle].binding = Some(naga::ResourceBinding {
            group: 0,
            binding: SAMPLER_BINDING_OFFSET + index as u32,
        });
    }
}

/// Recover the vertex-input layout (locations and component counts) from
/// the compiled vertex stage's entry point.
fn reflect_vertex_layout(module: &naga::Module) -> VertexShaderLayout {
    let mut attributes = Vec::new();
    for entry in &module.entry_points {
        if entry.stage != naga::ShaderStage::Vertex {
            continue;
        }
        for arg in &entry.function.arguments {
            let Some(naga::Binding::Location { location, .. }) = &arg.binding else {
                continue;
            };
            let location = *location;
            let component_count = match &module.types[arg.ty].inner {
                naga::TypeInner::Scalar(_) => 1,
                naga::TypeInner::Vector { size, .. } => *size as u32,
                _ => continue,
            };
            attributes.push(VertexShaderAttribute {
                location,
                component_count,
            });
        }
    }
    attributes.sort_by_key(|a| a.location);
    VertexShaderLayout { attributes }
}

/// Merge the resource bindings of both stages and verify the uniform
/// blocks respect the [`BindingPoint`] contract.
fn reflect_bindings(
    name: &str,
    vertex: &naga::Module,
    fragment: &naga::Module,
) -> EngineResult<Vec<ReflectedBinding>> {
    let mut bindings: Vec<ReflectedBinding> = Vec::new();

    for (module, stage) in [
        (vertex, wgpu::ShaderStages::VERTEX),
        (fragment, wgpu::ShaderStages::FRAGMENT),
    ] {
        for (_, var) in module.global_variables.iter() {
            let Some(resource) = &var.binding else {
                continue;
            };
            let kind = match &module.types[var.ty].inner {
                naga::TypeInner::Struct { .. } if var.space == naga::AddressSpace::Uniform => {
                    ReflectedBindingKind::Uniform {
                        size: module.types[var.ty].inner.size(module.to_ctx()) as u64,
                    }
                }
                naga::TypeInner::Image { dim, arrayed, .. } => ReflectedBindingKind::Texture {
                    view_dimension: match (*dim, *arrayed) {
                        (naga::ImageDimension::Cube, false) => wgpu::TextureViewDimension::Cube,
                        (naga::ImageDimension::Cube, true) => {
                            wgpu::TextureViewDimension::CubeArray
                        }
                        (naga::ImageDimension::D2, true) => wgpu::TextureViewDimension::D2Array,
                        (naga::ImageDimension::D3, _) => wgpu::TextureViewDimension::D3,
                        (naga::ImageDimension::D1, _) => wgpu::TextureViewDimension::D1,
                        _ => wgpu::TextureViewDimension::D2,
                    },
                },
                naga::TypeInner::Sampler { .. } => ReflectedBindingKind::Sampler,
                _ => continue,
            };

            if matches!(kind, ReflectedBindingKind::Uniform { .. })
                && !BindingPoint::is_contract_binding(resource.binding)
            {
                return Err(EngineError::Shader {
                    name: name.to_string(),
                    info_log: truncate_info_log(format!(
                        "uniform block at binding {} violates the binding-point contract (0..={})",
                        resource.binding,
                        BindingPoint::Material.binding()
                    )),
                });
            }

            match bindings.iter_mut().find(|b| b.binding == resource.binding) {
                Some(existing) => existing.visibility |= stage,
                None => bindings.push(ReflectedBinding {
                    binding: resource.binding,
                    visibility: stage,
                    kind,
                }),
            }
        }
    }

    bindings.sort_by_key(|b| b.binding);
    Ok(bindings)
}

/// Bound an info log to [`INFO_LOG_CAPACITY`] bytes, respecting UTF-8
/// boundaries.
fn truncate_info_log(mut log: String) -> String {
    if log.len() > INFO_LOG_CAPACITY {
        let mut end = INFO_LOG_CAPACITY;
        while !log.is_char_boundary(end) {
            end -= 1;
        }
        log.truncate(end);
    }
    log
}

fn file_write_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"
#ifdef VERTEX
layout(location = 0) in vec3 aPosition;
layout(location = 2) in vec2 aTexCoord;
layout(location = 0) out vec2 vTexCoord;

layout(std140, binding = 1) uniform LocalParams {
    mat4 uWorld;
    mat4 uWorldViewProjection;
};

void main() {
    vTexCoord = aTexCoord;
    gl_Position = uWorldViewProjection * vec4(aPosition, 1.0);
}
#endif
#ifdef FRAGMENT
layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 oColor;

layout(binding = 3) uniform sampler2D uAlbedoTexture;

void main() {
    oColor = texture(uAlbedoTexture, vTexCoord);
}
#endif
"#;

    #[test]
    fn test_stage_assembly_injects_version_and_defines() {
        let source = assemble_stage_source(BODY, "SCREEN_RECT", naga::ShaderStage::Vertex);
        assert!(source.starts_with("#version 450\n#define SCREEN_RECT\n#define VERTEX\n"));
        assert!(source.ends_with(BODY));

        let source = assemble_stage_source(BODY, "SCREEN_RECT", naga::ShaderStage::Fragment);
        assert!(source.contains("#define FRAGMENT\n"));
        assert!(!source.contains("#define VERTEX\n"));
    }

    #[test]
    fn test_both_stages_compile_from_one_body() {
        compile_stage(BODY, "SCREEN_RECT", naga::ShaderStage::Vertex).unwrap();
        compile_stage(BODY, "SCREEN_RECT", naga::ShaderStage::Fragment).unwrap();
    }

    #[test]
    fn test_vertex_layout_reflection() {
        let module = compile_stage(BODY, "SCREEN_RECT", naga::ShaderStage::Vertex).unwrap();
        let layout = reflect_vertex_layout(&module);
        assert_eq!(
            layout.attributes,
            vec![
                VertexShaderAttribute { location: 0, component_count: 3 },
                VertexShaderAttribute { location: 2, component_count: 2 },
            ]
        );
    }

    #[test]
    fn test_binding_reflection_and_sampler_assignment() {
        let vertex = compile_stage(BODY, "SCREEN_RECT", naga::ShaderStage::Vertex).unwrap();
        let fragment = compile_stage(BODY, "SCREEN_RECT", naga::ShaderStage::Fragment).unwrap();
        let bindings = reflect_bindings("SCREEN_RECT", &vertex, &fragment).unwrap();

        // Uniform block at the Local contract slot.
        let local = bindings
            .iter()
            .find(|b| b.binding == BindingPoint::Local.binding())
            .expect("local uniform block reflected");
        assert_eq!(local.kind, ReflectedBindingKind::Uniform { size: 128 });
        assert!(local.visibility.contains(wgpu::ShaderStages::VERTEX));

        // Texture keeps its declared binding.
        assert!(bindings.iter().any(|b| {
            b.binding == 3 && matches!(b.kind, ReflectedBindingKind::Texture { .. })
        }));

        // The split-off sampler lives in the reserved range.
        assert!(bindings.iter().any(|b| {
            b.binding >= SAMPLER_BINDING_OFFSET && b.kind == ReflectedBindingKind::Sampler
        }));
    }

    #[test]
    fn test_uniform_binding_outside_contract_is_rejected() {
        let body = r#"
#ifdef VERTEX
layout(std140, binding = 5) uniform Rogue { mat4 uMatrix; };
void main() { gl_Position = uMatrix * vec4(0.0); }
#endif
#ifdef FRAGMENT
layout(location = 0) out vec4 oColor;
void main() { oColor = vec4(1.0); }
#endif
"#;
        let vertex = compile_stage(body, "ROGUE", naga::ShaderStage::Vertex).unwrap();
        let fragment = compile_stage(body, "ROGUE", naga::ShaderStage::Fragment).unwrap();
        let err = reflect_bindings("ROGUE", &vertex, &fragment).unwrap_err();
        assert!(matches!(err, EngineError::Shader { .. }));
    }

    #[test]
    fn test_compile_failure_is_reported_with_bounded_log() {
        let err = compile_stage(
            "#ifdef VERTEX\nvoid main() { garbage }\n#endif\nvoid main() {}",
            "BROKEN",
            naga::ShaderStage::Vertex,
        )
        .unwrap_err();
        match err {
            EngineError::Shader { name, info_log } => {
                assert_eq!(name, "BROKEN");
                assert!(!info_log.is_empty());
                assert!(info_log.len() <= INFO_LOG_CAPACITY);
            }
            other => panic!("expected shader error, got {other:?}"),
        }
    }

    #[test]
    fn test_info_log_truncation_respects_char_boundaries() {
        let log = "é".repeat(INFO_LOG_CAPACITY);
        let truncated = truncate_info_log(log);
        assert!(truncated.len() <= INFO_LOG_CAPACITY);
        assert!(truncated.chars().all(|c| c == 'é'));
    }
}
