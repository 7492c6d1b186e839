//! Tilekiln engine crate.
//!
//! Headless GPU runtime for tile rasterization: a context owning every GPU
//! resource, typed shader programs, nestable offscreen render targets and a
//! texture atlas packer.

pub mod atlas;
pub mod coords;
pub mod device;
pub mod error;
pub mod ids;
pub mod logging;
pub mod resource;
pub mod shader;
pub mod target;
pub mod time;

#[cfg(test)]
mod testing;

pub use device::{ContextConfig, GpuContext};
pub use error::{GpuError, GpuResult};
