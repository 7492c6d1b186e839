use std::collections::HashMap;

use crate::device::{Gpu, RasterState};
use crate::logging::Diagnostics;
use crate::shader::dispatch::{
    BUFFER_ATTRIBUTE_SETTERS, ProgramState, Role, Setter, UNIFORM_SETTERS, VALUE_ATTRIBUTE_SETTERS,
};
use crate::shader::reflect::{self, FRAGMENT_ENTRY, Reflection, VERTEX_ENTRY};
use crate::shader::{AttributeSource, ProgramDesc, Value, VarKind};

/// A declared variable after its location was resolved.
#[derive(Debug, Clone)]
pub(crate) struct Variable {
    pub kind: VarKind,
    pub role: Role,
    pub setter: Setter,
}

/// Vertex input slot of one attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct AttributeSlot {
    pub location: u32,
    pub format: wgpu::VertexFormat,
    pub source: AttributeSource,
}

impl AttributeSlot {
    pub fn stride(&self) -> u64 {
        self.format.size()
    }

    pub fn step_mode(&self) -> wgpu::VertexStepMode {
        match self.source {
            AttributeSource::Buffer => wgpu::VertexStepMode::Vertex,
            // One element shared by every vertex of the (single) instance.
            AttributeSource::Value => wgpu::VertexStepMode::Instance,
        }
    }
}

/// Texture and sampler bindings of one texture unit inside a sampler slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct UnitBinding {
    pub texture: u32,
    pub sampler: u32,
}

/// Everything a pipeline depends on besides the program itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub topology: wgpu::PrimitiveTopology,
    pub strip_index_format: Option<wgpu::IndexFormat>,
    pub raster: RasterState,
    pub color_formats: Vec<wgpu::TextureFormat>,
    pub depth_format: Option<wgpu::TextureFormat>,
}

/// GPU objects of a successfully linked program.
pub(crate) struct Linked {
    pub vertex: wgpu::ShaderModule,
    pub fragment: wgpu::ShaderModule,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
    pub uniform_binding: Option<u32>,
    pub uniform_size: u32,
    pub sampler_slots: Vec<Vec<UnitBinding>>,
    pub attributes: Vec<AttributeSlot>,
    pub variables: HashMap<String, Variable>,
    pub fragment_outputs: u32,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

/// A compiled vertex + fragment pair with its resolved variables.
///
/// Linking validates both sources, reflects their interface and resolves
/// every declared variable to a location and a setter. A program that fails
/// any step stays registered but unlinked; it cannot be activated or drawn.
pub(crate) struct ShaderProgram {
    pub desc: ProgramDesc,
    pub linked: Option<Linked>,
    pub state: ProgramState,
    /// Last value handed to each variable, re-dispatched by `reapply`.
    pub values: HashMap<String, Value>,
    pub arrays_enabled: bool,
}

impl ShaderProgram {
    pub fn new(desc: ProgramDesc) -> Self {
        Self {
            desc,
            linked: None,
            state: ProgramState::default(),
            values: HashMap::new(),
            arrays_enabled: false,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.linked.is_some()
    }

    /// Compiles and resolves the program. Failures go to `diagnostics`.
    pub fn link(&mut self, gpu: &Gpu, diagnostics: &dyn Diagnostics) -> bool {
        self.linked = None;
        match self.try_link(gpu, diagnostics) {
            Ok(linked) => {
                self.state = ProgramState::new(
                    linked.uniform_size,
                    linked.sampler_slots.len(),
                    linked.attributes.len(),
                );
                self.values.clear();
                self.linked = Some(linked);
                log::debug!("linked shader program '{}'", self.desc.name);
                true
            }
            Err(msg) => {
                diagnostics.error(&format!("shader program '{}': {msg}", self.desc.name));
                false
            }
        }
    }

    fn try_link(&self, gpu: &Gpu, diagnostics: &dyn Diagnostics) -> Result<Linked, String> {
        let vs = reflect::compile(&self.desc.vertex_source).map_err(|e| format!("vertex shader: {e}"))?;
        let fs = reflect::compile(&self.desc.fragment_source)
            .map_err(|e| format!("fragment shader: {e}"))?;
        let reflection = reflect::reflect(&vs, &fs)?;

        let resolved = resolve(&self.desc, &reflection, diagnostics)?;

        let device = &gpu.device;
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&self.desc.name),
            source: wgpu::ShaderSource::Wgsl(self.desc.vertex_source.as_str().into()),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&self.desc.name),
            source: wgpu::ShaderSource::Wgsl(self.desc.fragment_source.as_str().into()),
        });

        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let mut entries = Vec::new();
        if let Some(binding) = resolved.uniform_binding {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        for unit in resolved.sampler_slots.iter().flatten() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: unit.texture,
                visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: unit.sampler,
                visibility,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tilekiln program bgl"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tilekiln program pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        Ok(Linked {
            vertex,
            fragment,
            bind_group_layout,
            pipeline_layout,
            uniform_binding: resolved.uniform_binding,
            uniform_size: resolved.uniform_size,
            sampler_slots: resolved.sampler_slots,
            attributes: resolved.attributes,
            variables: resolved.variables,
            fragment_outputs: reflection.fragment_outputs,
            pipelines: HashMap::new(),
        })
    }

    /// Stores and dispatches one value. Unknown names are logged and skipped.
    pub fn dispatch(&mut self, name: &str, value: Value, diagnostics: &dyn Diagnostics) {
        let Some(linked) = self.linked.as_ref() else { return };
        let Some(var) = linked.variables.get(name) else {
            log::debug!("program '{}' has no variable '{name}'", self.desc.name);
            return;
        };
        if let Err(msg) = (var.setter)(&mut self.state, &var.role, &value) {
            diagnostics.warn(&format!(
                "program '{}': variable '{name}' ({}) {msg}",
                self.desc.name, var.kind
            ));
            return;
        }
        self.values.insert(name.to_owned(), value);
    }

    /// Re-dispatches every stored value from a fresh unit counter.
    pub fn reapply(&mut self, diagnostics: &dyn Diagnostics) {
        self.state.reset_units();
        let values: Vec<(String, Value)> = self.values.drain().collect();
        for (name, value) in values {
            self.dispatch(&name, value, diagnostics);
        }
    }

    pub fn enable_attribute_arrays(&mut self) {
        self.arrays_enabled = true;
    }

    pub fn disable_attribute_arrays(&mut self) {
        self.arrays_enabled = false;
    }

    /// Builds the pipeline for `key` unless it is cached.
    pub fn prepare_pipeline(&mut self, gpu: &Gpu, key: &PipelineKey) {
        let Some(linked) = self.linked.as_mut() else { return };
        if linked.pipelines.contains_key(key) {
            return;
        }
        let pipeline = build_pipeline(gpu, &self.desc.name, linked, key);
        linked.pipelines.insert(key.clone(), pipeline);
    }

    pub fn pipeline(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.linked.as_ref()?.pipelines.get(key)
    }

    #[cfg(test)]
    pub fn cached_pipelines(&self) -> usize {
        self.linked.as_ref().map_or(0, |l| l.pipelines.len())
    }
}

fn build_pipeline(gpu: &Gpu, name: &str, linked: &Linked, key: &PipelineKey) -> wgpu::RenderPipeline {
    let attributes: Vec<[wgpu::VertexAttribute; 1]> = linked
        .attributes
        .iter()
        .map(|slot| {
            [wgpu::VertexAttribute { format: slot.format, offset: 0, shader_location: slot.location }]
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = linked
        .attributes
        .iter()
        .zip(&attributes)
        .map(|(slot, attrs)| wgpu::VertexBufferLayout {
            array_stride: slot.stride(),
            step_mode: slot.step_mode(),
            attributes: attrs,
        })
        .collect();

    // Outputs beyond what the shader writes are masked off.
    let targets: Vec<Option<wgpu::ColorTargetState>> = key
        .color_formats
        .iter()
        .enumerate()
        .map(|(i, format)| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: key.raster.blend.to_wgpu(),
                write_mask: if (i as u32) < linked.fragment_outputs {
                    wgpu::ColorWrites::ALL
                } else {
                    wgpu::ColorWrites::empty()
                },
            })
        })
        .collect();

    let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
        format,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    });

    log::debug!("building pipeline for '{name}': {:?}", key.topology);

    gpu.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(name),
        layout: Some(&linked.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &linked.vertex,
            entry_point: Some(VERTEX_ENTRY),
            compilation_options: Default::default(),
            buffers: &buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: &linked.fragment,
            entry_point: Some(FRAGMENT_ENTRY),
            compilation_options: Default::default(),
            targets: &targets,
        }),
        primitive: wgpu::PrimitiveState {
            topology: key.topology,
            strip_index_format: key.strip_index_format,
            front_face: key.raster.front_face,
            cull_mode: key.raster.cull_mode(),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

// ── resolution ────────────────────────────────────────────────────────────

struct Resolved {
    uniform_binding: Option<u32>,
    uniform_size: u32,
    sampler_slots: Vec<Vec<UnitBinding>>,
    attributes: Vec<AttributeSlot>,
    variables: HashMap<String, Variable>,
}

/// Matches declarations against the reflected interface.
///
/// A declaration the shaders never use is reported and left out; a shader
/// input nobody declared, a shape mismatch, or a kind with no setter for its
/// category fails the link.
fn resolve(
    desc: &ProgramDesc,
    reflection: &Reflection,
    diagnostics: &dyn Diagnostics,
) -> Result<Resolved, String> {
    let mut variables = HashMap::new();
    let mut attributes = Vec::new();

    for decl in &desc.attributes {
        let Some(reflected) = reflection.attributes.get(&decl.name) else {
            diagnostics.warn(&format!(
                "program '{}': attribute '{}' has no location",
                desc.name, decl.name
            ));
            continue;
        };
        if !reflected.shape.accepts(decl.kind) {
            return Err(format!("attribute '{}' is not a {}", decl.name, decl.kind));
        }
        let table = match decl.source {
            AttributeSource::Buffer => &BUFFER_ATTRIBUTE_SETTERS,
            AttributeSource::Value => &VALUE_ATTRIBUTE_SETTERS,
        };
        let (Some(setter), Some(format)) = (table[decl.kind.index()], decl.kind.vertex_format()) else {
            return Err(format!("{} cannot feed attribute '{}'", decl.kind, decl.name));
        };
        let slot = attributes.len();
        attributes.push(AttributeSlot { location: reflected.location, format, source: decl.source });
        variables.insert(
            decl.name.clone(),
            Variable { kind: decl.kind, role: Role::Attribute { slot }, setter },
        );
    }

    for name in reflection.attributes.keys() {
        if !desc.attributes.iter().any(|a| &a.name == name) {
            return Err(format!("shader input '{name}' is not declared"));
        }
    }

    let mut sampler_slots: Vec<Vec<UnitBinding>> = Vec::new();
    let mut used_textures: Vec<String> = Vec::new();

    for decl in &desc.uniforms {
        let Some(setter) = UNIFORM_SETTERS[decl.kind.index()] else {
            return Err(format!("{} cannot be a uniform", decl.kind));
        };

        let role = match decl.kind {
            VarKind::Sampler2d | VarKind::SamplerArray(_) => {
                let names: Vec<String> = match decl.kind {
                    VarKind::SamplerArray(n) => (0..n).map(|i| format!("{}_{i}", decl.name)).collect(),
                    _ => vec![decl.name.clone()],
                };
                let mut units = Vec::with_capacity(names.len());
                for texture_name in &names {
                    let texture = reflection.textures.get(texture_name);
                    let sampler = reflection.samplers.get(&format!("{texture_name}_sampler"));
                    match (texture, sampler) {
                        (Some(&texture), Some(&sampler)) => {
                            units.push(UnitBinding { texture, sampler });
                            used_textures.push(texture_name.clone());
                        }
                        (Some(_), None) => {
                            return Err(format!("texture '{texture_name}' has no '{texture_name}_sampler'"));
                        }
                        _ => {}
                    }
                }
                if units.is_empty() {
                    diagnostics.warn(&format!(
                        "program '{}': uniform '{}' has no location",
                        desc.name, decl.name
                    ));
                    continue;
                }
                let slot = sampler_slots.len();
                let count = units.len() as u32;
                sampler_slots.push(units);
                Role::Sampler { slot, count }
            }
            _ => {
                let member = reflection.uniform_block.as_ref().and_then(|b| b.members.get(&decl.name));
                let Some(member) = member else {
                    diagnostics.warn(&format!(
                        "program '{}': uniform '{}' has no location",
                        desc.name, decl.name
                    ));
                    continue;
                };
                if !member.shape.accepts(decl.kind) {
                    return Err(format!("uniform '{}' is not a {}", decl.name, decl.kind));
                }
                Role::Uniform { offset: member.offset }
            }
        };

        variables.insert(decl.name.clone(), Variable { kind: decl.kind, role, setter });
    }

    for name in reflection.textures.keys() {
        if !used_textures.iter().any(|used| used == name) {
            return Err(format!("texture '{name}' is not declared"));
        }
    }
    if let Some(block) = &reflection.uniform_block {
        for name in block.members.keys() {
            if !desc.uniforms.iter().any(|u| &u.name == name) {
                // Undeclared members read as zero.
                log::debug!("program '{}': uniform member '{name}' is not declared", desc.name);
            }
        }
    }

    Ok(Resolved {
        uniform_binding: reflection.uniform_block.as_ref().map(|b| b.binding),
        uniform_size: reflection.uniform_block.as_ref().map_or(0, |b| b.size),
        sampler_slots,
        attributes,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::CaptureDiagnostics;

    const VS: &str = r#"
struct Uniforms {
    color: vec4<f32>,
    scale: f32,
};
@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) weight: f32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position * u.scale * weight, 0.0, 1.0);
}
"#;

    const FS: &str = r#"
struct Uniforms {
    color: vec4<f32>,
    scale: f32,
};
@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var tex: texture_2d<f32>;
@group(0) @binding(2) var tex_sampler: sampler;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return u.color * textureSample(tex, tex_sampler, vec2<f32>(0.5, 0.5));
}
"#;

    fn reflection() -> Reflection {
        let vs = reflect::compile(VS).unwrap();
        let fs = reflect::compile(FS).unwrap();
        match reflect::reflect(&vs, &fs) {
            Ok(r) => r,
            Err(e) => panic!("reflection failed: {e}"),
        }
    }

    fn desc() -> ProgramDesc {
        ProgramDesc::new("test")
            .attribute("position", VarKind::Vec2)
            .value_attribute("weight", VarKind::Float)
            .uniform("color", VarKind::Vec4)
            .uniform("scale", VarKind::Float)
            .uniform("tex", VarKind::Sampler2d)
    }

    // ── resolution ────────────────────────────────────────────────────────

    #[test]
    fn declared_variables_resolve_to_roles() {
        let diag = CaptureDiagnostics::new();
        let resolved = match resolve(&desc(), &reflection(), &diag) {
            Ok(r) => r,
            Err(e) => panic!("resolves: {e}"),
        };
        assert_eq!(resolved.variables["color"].role, Role::Uniform { offset: 0 });
        assert_eq!(resolved.variables["scale"].role, Role::Uniform { offset: 16 });
        assert_eq!(resolved.variables["tex"].role, Role::Sampler { slot: 0, count: 1 });
        assert_eq!(resolved.variables["weight"].role, Role::Attribute { slot: 1 });
        assert_eq!(resolved.sampler_slots, vec![vec![UnitBinding { texture: 1, sampler: 2 }]]);
        assert_eq!(resolved.attributes[1].step_mode(), wgpu::VertexStepMode::Instance);
        assert_eq!(resolved.attributes[0].stride(), 8);
        assert!(diag.messages().is_empty());
    }

    #[test]
    fn unused_declaration_is_reported_not_fatal() {
        let diag = CaptureDiagnostics::new();
        let with_extra = desc().uniform("unused", VarKind::Mat4);
        let resolved = resolve(&with_extra, &reflection(), &diag).expect("extra declarations do not fail the link");
        assert!(!resolved.variables.contains_key("unused"));
        assert!(diag.contains("uniform 'unused' has no location"));
    }

    #[test]
    fn shape_mismatch_fails() {
        let diag = CaptureDiagnostics::new();
        let wrong = ProgramDesc::new("test")
            .attribute("position", VarKind::Vec3)
            .value_attribute("weight", VarKind::Float)
            .uniform("tex", VarKind::Sampler2d);
        let Err(msg) = resolve(&wrong, &reflection(), &diag) else { panic!("vec2 input declared vec3") };
        assert_eq!(msg, "attribute 'position' is not a vec3");
    }

    #[test]
    fn undeclared_shader_input_fails() {
        let diag = CaptureDiagnostics::new();
        let missing = ProgramDesc::new("test")
            .attribute("position", VarKind::Vec2)
            .uniform("tex", VarKind::Sampler2d);
        let Err(msg) = resolve(&missing, &reflection(), &diag) else { panic!("weight is undeclared") };
        assert!(msg.contains("'weight'"));
    }

    #[test]
    fn undeclared_texture_fails() {
        let diag = CaptureDiagnostics::new();
        let missing = ProgramDesc::new("test")
            .attribute("position", VarKind::Vec2)
            .value_attribute("weight", VarKind::Float);
        let Err(msg) = resolve(&missing, &reflection(), &diag) else { panic!("tex is undeclared") };
        assert_eq!(msg, "texture 'tex' is not declared");
    }

    #[test]
    fn matrix_attribute_has_no_setter() {
        let diag = CaptureDiagnostics::new();
        let mut d = desc();
        d.attributes[0].kind = VarKind::Mat4;
        assert!(resolve(&d, &reflection(), &diag).is_err());
    }

    // ── linking ───────────────────────────────────────────────────────────

    #[test]
    fn link_failure_leaves_program_unlinked() {
        let Some(ctx) = crate::testing::gpu_context(4, 4) else { return };
        let gpu = ctx.gpu().expect("initialized");
        let diag = CaptureDiagnostics::new();
        let mut program = ShaderProgram::new(desc().vertex_shader("not wgsl").fragment_shader(FS));
        assert!(!program.link(gpu, &diag));
        assert!(!program.is_linked());
        assert!(diag.contains("shader program 'test': vertex shader"));
    }

    #[test]
    fn linked_program_stores_and_reapplies_values() {
        let Some(ctx) = crate::testing::gpu_context(4, 4) else { return };
        let gpu = ctx.gpu().expect("initialized");
        let diag = CaptureDiagnostics::new();
        let mut program = ShaderProgram::new(desc().vertex_shader(VS).fragment_shader(FS));
        assert!(program.link(gpu, &diag));

        program.dispatch("scale", Value::Float(2.0), &diag);
        program.dispatch("color", Value::Vec4([1.0, 0.0, 0.0, 1.0]), &diag);
        program.dispatch("nope", Value::Float(1.0), &diag);
        assert_eq!(program.values.len(), 2);

        program.state.uniform_bytes.fill(0);
        program.reapply(&diag);
        let floats = crate::testing::floats(&program.state.uniform_bytes);
        assert_eq!(&floats[..5], &[1.0, 0.0, 0.0, 1.0, 2.0]);
    }
}
