//! WGSL validation and interface reflection via naga.

use std::collections::HashMap;

use naga::{AddressSpace, Binding, Handle, ScalarKind, ShaderStage, Type, TypeInner, UniqueArena};

use crate::shader::VarKind;

pub(crate) const VERTEX_ENTRY: &str = "vs_main";
pub(crate) const FRAGMENT_ENTRY: &str = "fs_main";

/// Shape of a reflected value type, as far as variable kinds care.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Shape {
    Float,
    Int,
    Vector(u8),
    Matrix(u8, u8),
    Other,
}

impl Shape {
    pub fn accepts(self, kind: VarKind) -> bool {
        matches!(
            (kind, self),
            (VarKind::Float, Shape::Float)
                | (VarKind::Int, Shape::Int)
                | (VarKind::Vec2, Shape::Vector(2))
                | (VarKind::Vec3, Shape::Vector(3))
                | (VarKind::Vec4, Shape::Vector(4))
                | (VarKind::Mat3, Shape::Matrix(3, 3))
                | (VarKind::Mat4, Shape::Matrix(4, 4))
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct ReflectedAttribute {
    pub location: u32,
    pub shape: Shape,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct UniformMember {
    pub offset: u32,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformBlock {
    pub binding: u32,
    pub size: u32,
    pub members: HashMap<String, UniformMember>,
}

/// Interface of a vertex + fragment module pair.
#[derive(Debug, Clone, Default)]
pub(crate) struct Reflection {
    pub attributes: HashMap<String, ReflectedAttribute>,
    pub uniform_block: Option<UniformBlock>,
    /// Texture globals by name → binding.
    pub textures: HashMap<String, u32>,
    /// Sampler globals by name → binding.
    pub samplers: HashMap<String, u32>,
    pub fragment_outputs: u32,
}

/// Parses and validates one WGSL source.
pub(crate) fn compile(source: &str) -> Result<naga::Module, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("validation failed: {}", e.as_inner()))?;
    Ok(module)
}

/// Collects the interface of a linked vertex + fragment pair.
pub(crate) fn reflect(vertex: &naga::Module, fragment: &naga::Module) -> Result<Reflection, String> {
    let mut out = Reflection::default();

    let vs = entry_point(vertex, ShaderStage::Vertex, VERTEX_ENTRY)?;
    for arg in &vs.function.arguments {
        match &arg.binding {
            Some(Binding::Location { location, .. }) => {
                let name = arg.name.clone().unwrap_or_default();
                out.attributes.insert(
                    name,
                    ReflectedAttribute { location: *location, shape: shape_of(&vertex.types, arg.ty) },
                );
            }
            Some(Binding::BuiltIn(_)) => {}
            None => {
                // Inputs grouped in a struct.
                if let TypeInner::Struct { members, .. } = &vertex.types[arg.ty].inner {
                    for member in members {
                        if let Some(Binding::Location { location, .. }) = member.binding {
                            let name = member.name.clone().unwrap_or_default();
                            out.attributes.insert(
                                name,
                                ReflectedAttribute {
                                    location,
                                    shape: shape_of(&vertex.types, member.ty),
                                },
                            );
                        }
                    }
                }
            }
        }
    }

    let fs = entry_point(fragment, ShaderStage::Fragment, FRAGMENT_ENTRY)?;
    out.fragment_outputs = match &fs.function.result {
        None => 0,
        Some(result) => match (&result.binding, &fragment.types[result.ty].inner) {
            (Some(Binding::Location { .. }), _) => 1,
            (None, TypeInner::Struct { members, .. }) => members
                .iter()
                .filter(|m| matches!(m.binding, Some(Binding::Location { .. })))
                .count() as u32,
            _ => 0,
        },
    };

    collect_globals(vertex, &mut out)?;
    collect_globals(fragment, &mut out)?;

    Ok(out)
}

fn entry_point<'m>(
    module: &'m naga::Module,
    stage: ShaderStage,
    name: &str,
) -> Result<&'m naga::EntryPoint, String> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage && ep.name == name)
        .ok_or_else(|| format!("{stage:?} entry point '{name}' not found"))
}

fn collect_globals(module: &naga::Module, out: &mut Reflection) -> Result<(), String> {
    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else { continue };
        if binding.group != 0 {
            return Err(format!(
                "global '{}' uses bind group {}; only group 0 is supported",
                var.name.as_deref().unwrap_or("?"),
                binding.group
            ));
        }
        let name = var.name.clone().unwrap_or_default();

        match (&var.space, &module.types[var.ty].inner) {
            (AddressSpace::Uniform, TypeInner::Struct { members, span }) => {
                let block = out.uniform_block.get_or_insert_with(|| UniformBlock {
                    binding: binding.binding,
                    size: 0,
                    members: HashMap::new(),
                });
                if block.binding != binding.binding {
                    return Err(format!(
                        "uniform blocks at bindings {} and {}; only one block is supported",
                        block.binding, binding.binding
                    ));
                }
                block.size = block.size.max(*span);
                for member in members {
                    let Some(member_name) = member.name.clone() else { continue };
                    let reflected = UniformMember {
                        offset: member.offset,
                        shape: shape_of(&module.types, member.ty),
                    };
                    if let Some(existing) = block.members.get(&member_name)
                        && *existing != reflected
                    {
                        return Err(format!(
                            "uniform '{member_name}' has different layouts in the two stages"
                        ));
                    }
                    block.members.insert(member_name, reflected);
                }
            }
            (AddressSpace::Handle, TypeInner::Image { .. }) => {
                out.textures.insert(name, binding.binding);
            }
            (AddressSpace::Handle, TypeInner::Sampler { .. }) => {
                out.samplers.insert(name, binding.binding);
            }
            _ => {
                return Err(format!("unsupported global '{name}' in {:?} space", var.space));
            }
        }
    }
    Ok(())
}

fn shape_of(types: &UniqueArena<Type>, ty: Handle<Type>) -> Shape {
    let width4 = |w: u8| w == 4;
    match &types[ty].inner {
        TypeInner::Scalar(s) if s.kind == ScalarKind::Float && width4(s.width) => Shape::Float,
        TypeInner::Scalar(s) if s.kind == ScalarKind::Sint && width4(s.width) => Shape::Int,
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => {
            Shape::Vector(vector_len(*size))
        }
        TypeInner::Matrix { columns, rows, .. } => Shape::Matrix(vector_len(*columns), vector_len(*rows)),
        _ => Shape::Other,
    }
}

fn vector_len(size: naga::VectorSize) -> u8 {
    match size {
        naga::VectorSize::Bi => 2,
        naga::VectorSize::Tri => 3,
        naga::VectorSize::Quad => 4,
    }
}
