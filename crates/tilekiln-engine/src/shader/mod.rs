//! Typed shader programs.
//!
//! Programs are described declaratively (`ProgramDesc`), linked against
//! their WGSL sources through naga reflection, and driven through a
//! `ProgramController` borrowed from the context.

mod controller;
mod desc;
pub(crate) mod dispatch;
mod kind;
pub(crate) mod program;
pub(crate) mod reflect;

pub use controller::{DrawMode, ProgramController};
pub use desc::{AttributeDecl, AttributeSource, ProgramDesc, UniformDecl};
pub use kind::{Value, VarKind};

pub(crate) use program::ShaderProgram;
