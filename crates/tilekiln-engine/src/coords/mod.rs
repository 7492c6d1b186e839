//! Small value types shared by the context, targets and renderers.
//!
//! Pixel space follows GL conventions: origin bottom-left, +Y up. Readback
//! returns the bottom row first, as GL does; tile projections flip Y so the
//! first row read back is the tile's top edge.

mod color;
mod vec2;
mod viewport;

pub use color::ColorRgba;
pub use vec2::Vec2;
pub use viewport::Viewport;
