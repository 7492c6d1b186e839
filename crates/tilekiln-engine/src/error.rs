use crate::ids::{BufferId, TargetId, TextureId};

/// Errors surfaced by context operations that return a value.
///
/// Acquisition and compilation failures are not represented here: those are
/// logged through the context's diagnostics and leave the affected object inert.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("GPU context is not initialized")]
    NotInitialized,

    #[error("unknown {0}")]
    UnknownTexture(TextureId),

    #[error("unknown {0}")]
    UnknownBuffer(BufferId),

    #[error("unknown {0}")]
    UnknownTarget(TargetId),

    #[error("{what} has invalid size {width}x{height}")]
    InvalidSize {
        what: &'static str,
        width: u32,
        height: u32,
    },

    #[error("destination holds {actual} bytes, {expected} required")]
    DestinationTooSmall { expected: usize, actual: usize },

    #[error("region {x},{y} {width}x{height} lies outside {target_width}x{target_height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        target_width: u32,
        target_height: u32,
    },

    #[error("render target {0} has no color attachment {1}")]
    MissingAttachment(TargetId, usize),

    #[error("shader program '{0}' is not linked")]
    ProgramNotLinked(String),

    #[error("shader program '{0}' is not the active program")]
    ProgramNotActive(String),

    #[error("{buffer} is {len} bytes long, offset {offset} is out of range")]
    BufferOffset { buffer: BufferId, offset: u64, len: u64 },

    #[error("{0} is not an index buffer")]
    NotAnIndexBuffer(BufferId),

    #[error("GPU readback failed: {0}")]
    Readback(String),
}

pub type GpuResult<T> = Result<T, GpuError>;
