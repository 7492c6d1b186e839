//! Tile renderers.
//!
//! Each renderer owns a headless context with one program and one offscreen
//! target. `render` rebuilds the GPU buffers from the tile's features, draws
//! them with the overlay raster state and reads the target back into the
//! caller's RGBA buffer.

mod common;
mod point;
mod polygon;
mod polyline;

pub use point::{IconRegistry, PointRenderer, PointRendererConfig};
pub use polygon::{PolygonRenderer, PolygonRendererConfig};
pub use polyline::{LineStyle, PolylineRenderer, PolylineRendererConfig};

use crate::error::TileError;
use crate::features::TileData;

/// Per-call style inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleContext {
    /// Layer whose icon registry entries apply.
    pub layer_id: String,
}

impl StyleContext {
    pub fn new(layer_id: impl Into<String>) -> Self {
        Self { layer_id: layer_id.into() }
    }
}

/// Turns one tile's features into pixels.
///
/// `Uninitialized → Initialized`, then any number of synchronous `render`
/// calls. A renderer whose initialization failed stays inert.
pub trait TileRenderer {
    /// Creates the context, program and target. Returns `is_ready()`.
    fn initialize(&mut self) -> bool;

    fn is_ready(&self) -> bool;

    /// Target size in pixels.
    fn size(&self) -> (u32, u32);

    /// Renders `tile` into `out` (`width * height * 4` bytes, RGBA, top row
    /// first).
    fn render(&mut self, out: &mut [u8], tile: &TileData, style: &StyleContext) -> Result<(), TileError>;

    /// Bytes `render` writes.
    fn output_len(&self) -> usize {
        let (w, h) = self.size();
        w as usize * h as usize * 4
    }
}
