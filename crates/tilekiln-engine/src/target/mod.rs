//! Offscreen render targets and their activation stack.

mod render_target;
mod stack;

pub use render_target::{RenderTarget, RenderTargetConfig};
pub use stack::ActivationStack;

pub(crate) use render_target::TargetSlot;
