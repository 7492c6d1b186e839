use thiserror::Error;
use tilekiln_engine::GpuError;

/// Why a tile could not be rendered.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("renderer is not initialized")]
    NotReady,

    #[error("output buffer holds {actual} bytes, tile needs {expected}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("invalid tile data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Why one feature was skipped.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("feature has no properties")]
    MissingGeometry,

    #[error("last property is not a geometry: {0}")]
    InvalidGeometry(#[from] serde_json::Error),
}

/// Why an icon image could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{url}': {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode '{url}': {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },

    #[error("image loader is closed")]
    Closed,
}
