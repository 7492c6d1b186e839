//! Headless GPU context.
//!
//! This module is responsible for:
//! - acquiring the wgpu Instance/Adapter/Device/Queue without a surface
//! - probing optional capabilities and degrading when they are absent
//! - owning the resource tables, programs, clocks and binding state

mod capabilities;
pub(crate) mod config;
mod context;
mod state;

pub use capabilities::{Capabilities, Extension};
pub use config::ContextConfig;
pub use context::GpuContext;
pub use state::{Binding, BlendMode, RasterState};

pub(crate) use context::Gpu;
