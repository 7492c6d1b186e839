//! Helpers shared by the GPU-dependent renderer tests.

use tilekiln_engine::logging::{LoggingConfig, init_logging};
use tilekiln_engine::{ContextConfig, GpuContext};

use crate::renderer::TileRenderer;

/// Initializes `renderer`, or returns `None` when no adapter exists.
///
/// With an adapter present, initialization must succeed.
pub(crate) fn ready<R: TileRenderer>(mut renderer: R) -> Option<R> {
    init_logging(LoggingConfig { is_test: true, ..LoggingConfig::default() });
    if !GpuContext::headless(ContextConfig::sized(1, 1)).is_initialized() {
        log::warn!("no GPU adapter available; skipping GPU test");
        return None;
    }
    assert!(renderer.initialize(), "renderer initializes on an available adapter");
    Some(renderer)
}

/// RGBA of pixel `(x, y)`, row 0 first.
pub(crate) fn pixel(out: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = (y as usize * width as usize + x as usize) * 4;
    [out[i], out[i + 1], out[i + 2], out[i + 3]]
}
