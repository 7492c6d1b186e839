//! Texture and buffer factories plus synchronous pixel readback.

mod buffer;
pub(crate) mod readback;
mod texture;

pub use buffer::{BufferInfo, BufferKind, BufferUsage};
pub use texture::{EmptyTextureDesc, TextureFilter, TextureInfo};

pub(crate) use buffer::GpuBuffer;
pub(crate) use texture::GpuTexture;
