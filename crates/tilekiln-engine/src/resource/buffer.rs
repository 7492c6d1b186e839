use wgpu::util::DeviceExt;

use crate::device::{Extension, GpuContext};
use crate::error::{GpuError, GpuResult};
use crate::ids::BufferId;

/// Largest index every backend must accept (2^24 - 1).
const MAX_PORTABLE_INDEX: u32 = 0x00FF_FFFF;

/// How often a buffer's contents are expected to change.
///
/// Buffers are immutable once uploaded; the hint is kept for callers that
/// size their own pools and shows up in debug output.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
    Stream,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Public metadata of a registered buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    pub kind: BufferKind,
    /// Components per item (vertex buffers) or 1 (index buffers).
    pub item_size: u32,
    pub item_count: u32,
    pub usage: BufferUsage,
    /// Element width of an index buffer.
    pub index_format: Option<wgpu::IndexFormat>,
    pub byte_len: u64,
}

pub(crate) struct GpuBuffer {
    pub raw: wgpu::Buffer,
    pub info: BufferInfo,
}

impl GpuContext {
    /// Uploads `f32` vertex data made of `item_size`-component items.
    ///
    /// The item count is `data.len() / item_size`.
    pub fn create_vertex_buffer(
        &mut self,
        data: &[f32],
        item_size: u32,
        usage: BufferUsage,
    ) -> GpuResult<BufferId> {
        let item_count = if item_size == 0 { 0 } else { data.len() as u32 / item_size };
        let info = BufferInfo {
            kind: BufferKind::Vertex,
            item_size,
            item_count,
            usage,
            index_format: None,
            byte_len: std::mem::size_of_val(data) as u64,
        };
        self.upload_buffer(bytemuck::cast_slice(data), wgpu::BufferUsages::VERTEX, info)
    }

    /// Uploads triangle/strip indices as `u32`.
    ///
    /// `Uint32` is accepted by every backend. Adapters without
    /// `FULL_DRAW_INDEX_UINT32` only guarantee indices below 2^24; a buffer
    /// past that is still uploaded, with a warning.
    pub fn create_index_buffer(&mut self, data: &[u32], usage: BufferUsage) -> GpuResult<BufferId> {
        if !self.has_extension(Extension::ElementIndexUint)
            && let Some(&max) = data.iter().max()
            && max > MAX_PORTABLE_INDEX
        {
            log::warn!("index {max} exceeds the range guaranteed without full 32-bit index support");
        }

        let info = BufferInfo {
            kind: BufferKind::Index,
            item_size: 1,
            item_count: data.len() as u32,
            usage,
            index_format: Some(wgpu::IndexFormat::Uint32),
            byte_len: std::mem::size_of_val(data) as u64,
        };
        self.upload_buffer(bytemuck::cast_slice(data), wgpu::BufferUsages::INDEX, info)
    }

    /// Destroys a buffer. Unknown ids are ignored with a debug log.
    pub fn delete_buffer(&mut self, id: BufferId) {
        match self.buffers.remove(&id) {
            Some(buffer) => buffer.raw.destroy(),
            None => log::debug!("delete_buffer: unknown {id}"),
        }
    }

    pub fn buffer_info(&self, id: BufferId) -> Option<BufferInfo> {
        self.buffers.get(&id).map(|b| b.info)
    }

    fn upload_buffer(
        &mut self,
        bytes: &[u8],
        usage: wgpu::BufferUsages,
        info: BufferInfo,
    ) -> GpuResult<BufferId> {
        let Some(gpu) = self.gpu() else { return Err(GpuError::NotInitialized) };

        let raw = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tilekiln buffer"),
            contents: bytes,
            usage,
        });

        let id: BufferId = self.ids.next();
        self.buffers.insert(id, GpuBuffer { raw, info });
        Ok(id)
    }
}
