//! Texture atlas packing.
//!
//! Icons are packed into one shared texture with a binary-tree bin packer;
//! each packed image is addressed by an `ImageId` and gets six normalized
//! texture-coordinate corners (two triangles).

mod node;
mod packer;

pub use node::AtlasRect;
pub use packer::{AtlasConfig, AtlasImage, AtlasPlacement, TextureAtlas};
