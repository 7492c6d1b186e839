use crate::shader::VarKind;

/// How an attribute gets its data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttributeSource {
    /// Per-vertex data from a vertex buffer.
    Buffer,
    /// One constant value for every vertex.
    Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDecl {
    pub name: String,
    pub kind: VarKind,
    pub source: AttributeSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformDecl {
    pub name: String,
    pub kind: VarKind,
}

/// Declarative description of a shader program.
///
/// Variables are declared by name and semantic type; their GPU locations are
/// resolved from the WGSL sources at link time. Declaration order is kept and
/// decides vertex buffer slot order.
///
/// WGSL conventions:
/// - entry points are `vs_main` and `fs_main`
/// - non-sampler uniforms are members of one `var<uniform>` struct in group 0
/// - a `sampler2d` named `tex` is a `texture_2d<f32>` global `tex` plus a
///   `sampler` global `tex_sampler`; a sampler array `tex` uses `tex_0`,
///   `tex_1`, ... each with its own `_sampler`
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDesc {
    pub name: String,
    pub attributes: Vec<AttributeDecl>,
    pub uniforms: Vec<UniformDecl>,
    pub vertex_source: String,
    pub fragment_source: String,
}

impl ProgramDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            uniforms: Vec::new(),
            vertex_source: String::new(),
            fragment_source: String::new(),
        }
    }

    /// Declares a buffer-backed attribute.
    pub fn attribute(mut self, name: impl Into<String>, kind: VarKind) -> Self {
        self.attributes.push(AttributeDecl { name: name.into(), kind, source: AttributeSource::Buffer });
        self
    }

    /// Declares an attribute fed by a constant value.
    pub fn value_attribute(mut self, name: impl Into<String>, kind: VarKind) -> Self {
        self.attributes.push(AttributeDecl { name: name.into(), kind, source: AttributeSource::Value });
        self
    }

    pub fn uniform(mut self, name: impl Into<String>, kind: VarKind) -> Self {
        self.uniforms.push(UniformDecl { name: name.into(), kind });
        self
    }

    pub fn vertex_shader(mut self, source: impl Into<String>) -> Self {
        self.vertex_source = source.into();
        self
    }

    pub fn fragment_shader(mut self, source: impl Into<String>) -> Self {
        self.fragment_source = source.into();
        self
    }
}
