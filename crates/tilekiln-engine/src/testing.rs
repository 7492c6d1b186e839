//! Helpers shared by the GPU-dependent unit tests.

use crate::device::{ContextConfig, GpuContext};
use crate::logging::{LoggingConfig, init_logging};

/// Headless context of the given size, or `None` when no adapter exists.
pub(crate) fn gpu_context(width: u32, height: u32) -> Option<GpuContext> {
    init_logging(LoggingConfig { is_test: true, ..LoggingConfig::default() });
    let ctx = GpuContext::headless(ContextConfig::sized(width, height));
    if !ctx.is_initialized() {
        log::warn!("no GPU adapter available; skipping GPU test");
        return None;
    }
    Some(ctx)
}

/// Reads native-endian `f32`s out of a byte buffer.
pub(crate) fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
