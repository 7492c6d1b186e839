//! Tilekiln tile renderers.
//!
//! Turns one tile's worth of vector features into an RGBA pixel buffer:
//! point icons from a packed atlas, filled polygons and stroked polylines.
//! Geometry is rebuilt for every tile and drawn offscreen through
//! `tilekiln-engine`.

pub mod earcut;
pub mod error;
pub mod features;
pub mod line;
pub mod loader;
pub mod renderer;

#[cfg(test)]
mod testing;

pub use error::{FeatureError, LoadError, TileError};
pub use features::{FilterKey, GeoItem, Geometry, Position, TileBounds, TileData};
pub use loader::{FileImageSource, ImageLoader, ImageSource, LoaderConfig};
pub use renderer::{
    IconRegistry, LineStyle, PointRenderer, PointRendererConfig, PolygonRenderer, PolygonRendererConfig,
    PolylineRenderer, PolylineRendererConfig, StyleContext, TileRenderer,
};
