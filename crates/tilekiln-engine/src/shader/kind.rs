use std::fmt;

use crate::ids::{BufferId, TextureId};

/// Semantic type of a declared shader variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VarKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Sampler2d,
    /// `n` consecutive texture units.
    SamplerArray(u32),
}

impl VarKind {
    /// Size of the per-kind dispatch tables.
    pub(crate) const COUNT: usize = 9;

    /// Row in the dispatch tables.
    pub(crate) const fn index(self) -> usize {
        match self {
            VarKind::Float => 0,
            VarKind::Int => 1,
            VarKind::Vec2 => 2,
            VarKind::Vec3 => 3,
            VarKind::Vec4 => 4,
            VarKind::Mat3 => 5,
            VarKind::Mat4 => 6,
            VarKind::Sampler2d => 7,
            VarKind::SamplerArray(_) => 8,
        }
    }

    pub const fn is_sampler(self) -> bool {
        matches!(self, VarKind::Sampler2d | VarKind::SamplerArray(_))
    }

    /// Vertex format of an attribute of this kind.
    pub(crate) const fn vertex_format(self) -> Option<wgpu::VertexFormat> {
        match self {
            VarKind::Float => Some(wgpu::VertexFormat::Float32),
            VarKind::Int => Some(wgpu::VertexFormat::Sint32),
            VarKind::Vec2 => Some(wgpu::VertexFormat::Float32x2),
            VarKind::Vec3 => Some(wgpu::VertexFormat::Float32x3),
            VarKind::Vec4 => Some(wgpu::VertexFormat::Float32x4),
            _ => None,
        }
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarKind::Float => f.write_str("float"),
            VarKind::Int => f.write_str("int"),
            VarKind::Vec2 => f.write_str("vec2"),
            VarKind::Vec3 => f.write_str("vec3"),
            VarKind::Vec4 => f.write_str("vec4"),
            VarKind::Mat3 => f.write_str("mat3"),
            VarKind::Mat4 => f.write_str("mat4"),
            VarKind::Sampler2d => f.write_str("sampler2d"),
            VarKind::SamplerArray(n) => write!(f, "sampler2d[{n}]"),
        }
    }
}

/// A value handed to a program variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major.
    Mat3([f32; 9]),
    /// Column-major.
    Mat4([f32; 16]),
    Texture(TextureId),
    Textures(Vec<TextureId>),
    /// Vertex buffer feeding an attribute, starting `byte_offset` bytes in.
    Buffer { id: BufferId, byte_offset: u64 },
}

impl Value {
    /// Buffer-backed attribute source starting at the first byte.
    pub const fn buffer(id: BufferId) -> Self {
        Value::Buffer { id, byte_offset: 0 }
    }

    pub const fn buffer_at(id: BufferId, byte_offset: u64) -> Self {
        Value::Buffer { id, byte_offset }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Float(_) => "float",
            Value::Int(_) => "int",
            Value::Vec2(_) => "vec2",
            Value::Vec3(_) => "vec3",
            Value::Vec4(_) => "vec4",
            Value::Mat3(_) => "mat3",
            Value::Mat4(_) => "mat4",
            Value::Texture(_) => "texture",
            Value::Textures(_) => "texture list",
            Value::Buffer { .. } => "buffer",
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<[f32; 2]> for Value {
    fn from(v: [f32; 2]) -> Self {
        Value::Vec2(v)
    }
}

impl From<[f32; 3]> for Value {
    fn from(v: [f32; 3]) -> Self {
        Value::Vec3(v)
    }
}

impl From<[f32; 4]> for Value {
    fn from(v: [f32; 4]) -> Self {
        Value::Vec4(v)
    }
}

impl From<TextureId> for Value {
    fn from(v: TextureId) -> Self {
        Value::Texture(v)
    }
}
