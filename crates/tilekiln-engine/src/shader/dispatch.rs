//! Per-kind setters.
//!
//! Every declared variable gets exactly one setter at link time, looked up by
//! `VarKind::index` in the table for its category. A `None` row means the
//! kind cannot be used in that category and fails the link.

use crate::ids::{BufferId, TextureId};
use crate::shader::{Value, VarKind};

/// Texture units available to one program.
pub(crate) const MAX_TEXTURE_UNITS: usize = 16;

/// Where a variable lives once linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Role {
    /// Member of the uniform block at `offset`.
    Uniform { offset: u32 },
    /// Index into the program's sampler slots.
    Sampler { slot: usize, count: u32 },
    /// Index into the program's vertex buffer slots.
    Attribute { slot: usize },
}

/// Data feeding one attribute slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AttributeInput {
    Buffer { id: BufferId, byte_offset: u64 },
    Constant(Vec<u8>),
}

/// Mutable per-program binding state the setters write to.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProgramState {
    pub uniform_bytes: Vec<u8>,
    pub units: Vec<Option<TextureId>>,
    pub next_unit: usize,
    /// First texture unit of each sampler slot.
    pub sampler_units: Vec<Option<usize>>,
    pub attributes: Vec<Option<AttributeInput>>,
}

impl ProgramState {
    pub fn new(uniform_size: u32, sampler_slots: usize, attribute_slots: usize) -> Self {
        Self {
            uniform_bytes: vec![0; uniform_size as usize],
            units: vec![None; MAX_TEXTURE_UNITS],
            next_unit: 0,
            sampler_units: vec![None; sampler_slots],
            attributes: vec![None; attribute_slots],
        }
    }

    /// Starts a full `set`: texture units are handed out from zero again.
    pub fn reset_units(&mut self) {
        self.next_unit = 0;
        for unit in &mut self.units {
            *unit = None;
        }
        for base in &mut self.sampler_units {
            *base = None;
        }
    }

    /// Forgets every attribute binding.
    pub fn clear_attributes(&mut self) {
        for input in &mut self.attributes {
            *input = None;
        }
    }

    /// Texture bound to the `index`-th texture of a sampler slot.
    pub fn sampler_texture(&self, slot: usize, index: usize) -> Option<TextureId> {
        let base = (*self.sampler_units.get(slot)?)?;
        *self.units.get(base + index)?
    }
}

pub(crate) type Setter = fn(&mut ProgramState, &Role, &Value) -> Result<(), String>;

pub(crate) const UNIFORM_SETTERS: [Option<Setter>; VarKind::COUNT] = [
    Some(uniform_float as Setter),
    Some(uniform_int as Setter),
    Some(uniform_vec2 as Setter),
    Some(uniform_vec3 as Setter),
    Some(uniform_vec4 as Setter),
    Some(uniform_mat3 as Setter),
    Some(uniform_mat4 as Setter),
    Some(bind_sampler as Setter),
    Some(bind_sampler_array as Setter),
];

pub(crate) const BUFFER_ATTRIBUTE_SETTERS: [Option<Setter>; VarKind::COUNT] = [
    Some(bind_buffer as Setter),
    None,
    Some(bind_buffer as Setter),
    Some(bind_buffer as Setter),
    Some(bind_buffer as Setter),
    None,
    None,
    None,
    None,
];

pub(crate) const VALUE_ATTRIBUTE_SETTERS: [Option<Setter>; VarKind::COUNT] = [
    Some(attribute_float as Setter),
    Some(attribute_int as Setter),
    Some(attribute_vec2 as Setter),
    Some(attribute_vec3 as Setter),
    Some(attribute_vec4 as Setter),
    None,
    None,
    None,
    None,
];

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expects {expected}, got {}", value.type_name())
}

// ── uniforms ──────────────────────────────────────────────────────────────

fn write_uniform(state: &mut ProgramState, role: &Role, bytes: &[u8]) -> Result<(), String> {
    let Role::Uniform { offset } = role else {
        return Err("is not a uniform block member".to_owned());
    };
    let start = *offset as usize;
    let Some(dst) = state.uniform_bytes.get_mut(start..start + bytes.len()) else {
        return Err(format!("offset {start} lies outside the uniform block"));
    };
    dst.copy_from_slice(bytes);
    Ok(())
}

fn uniform_float(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Float(v) = value else { return Err(mismatch("float", value)) };
    write_uniform(state, role, bytemuck::bytes_of(v))
}

fn uniform_int(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Int(v) = value else { return Err(mismatch("int", value)) };
    write_uniform(state, role, bytemuck::bytes_of(v))
}

fn uniform_vec2(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Vec2(v) = value else { return Err(mismatch("vec2", value)) };
    write_uniform(state, role, bytemuck::cast_slice(v))
}

fn uniform_vec3(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Vec3(v) = value else { return Err(mismatch("vec3", value)) };
    write_uniform(state, role, bytemuck::cast_slice(v))
}

fn uniform_vec4(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Vec4(v) = value else { return Err(mismatch("vec4", value)) };
    write_uniform(state, role, bytemuck::cast_slice(v))
}

fn uniform_mat3(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Mat3(m) = value else { return Err(mismatch("mat3", value)) };
    // mat3x3<f32> columns are vec3 padded to 16 bytes.
    let mut padded = [0.0f32; 12];
    for col in 0..3 {
        padded[col * 4..col * 4 + 3].copy_from_slice(&m[col * 3..col * 3 + 3]);
    }
    write_uniform(state, role, bytemuck::cast_slice(&padded))
}

fn uniform_mat4(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Mat4(m) = value else { return Err(mismatch("mat4", value)) };
    write_uniform(state, role, bytemuck::cast_slice(m))
}

// ── samplers ──────────────────────────────────────────────────────────────

fn take_units(state: &mut ProgramState, role: &Role, textures: &[TextureId]) -> Result<(), String> {
    let Role::Sampler { slot, count } = role else {
        return Err("is not a sampler".to_owned());
    };
    if textures.len() > *count as usize {
        return Err(format!("takes {count} textures, got {}", textures.len()));
    }
    // An incremental apply keeps the units the sampler already owns.
    let base = match state.sampler_units[*slot] {
        Some(base) => base,
        None => {
            let base = state.next_unit;
            if base + *count as usize > MAX_TEXTURE_UNITS {
                return Err(format!("out of texture units ({MAX_TEXTURE_UNITS} available)"));
            }
            state.next_unit = base + *count as usize;
            base
        }
    };
    for i in 0..*count as usize {
        state.units[base + i] = textures.get(i).copied();
    }
    state.sampler_units[*slot] = Some(base);
    Ok(())
}

fn bind_sampler(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Texture(id) = value else { return Err(mismatch("texture", value)) };
    take_units(state, role, &[*id])
}

fn bind_sampler_array(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    match value {
        Value::Textures(ids) => take_units(state, role, ids),
        Value::Texture(id) => take_units(state, role, &[*id]),
        other => Err(mismatch("texture list", other)),
    }
}

// ── attributes ────────────────────────────────────────────────────────────

fn write_attribute(state: &mut ProgramState, role: &Role, input: AttributeInput) -> Result<(), String> {
    let Role::Attribute { slot } = role else {
        return Err("is not an attribute".to_owned());
    };
    state.attributes[*slot] = Some(input);
    Ok(())
}

fn bind_buffer(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Buffer { id, byte_offset } = value else {
        return Err(mismatch("buffer", value));
    };
    write_attribute(state, role, AttributeInput::Buffer { id: *id, byte_offset: *byte_offset })
}

fn attribute_float(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Float(v) = value else { return Err(mismatch("float", value)) };
    write_attribute(state, role, AttributeInput::Constant(bytemuck::bytes_of(v).to_vec()))
}

fn attribute_int(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Int(v) = value else { return Err(mismatch("int", value)) };
    write_attribute(state, role, AttributeInput::Constant(bytemuck::bytes_of(v).to_vec()))
}

fn attribute_vec2(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Vec2(v) = value else { return Err(mismatch("vec2", value)) };
    write_attribute(state, role, AttributeInput::Constant(bytemuck::cast_slice(v).to_vec()))
}

fn attribute_vec3(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Vec3(v) = value else { return Err(mismatch("vec3", value)) };
    write_attribute(state, role, AttributeInput::Constant(bytemuck::cast_slice(v).to_vec()))
}

fn attribute_vec4(state: &mut ProgramState, role: &Role, value: &Value) -> Result<(), String> {
    let Value::Vec4(v) = value else { return Err(mismatch("vec4", value)) };
    write_attribute(state, role, AttributeInput::Constant(bytemuck::cast_slice(v).to_vec()))
}
