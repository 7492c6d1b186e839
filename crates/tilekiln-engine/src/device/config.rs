use crate::device::Extension;

/// Largest texture edge the context will allocate.
pub const MAX_TEXTURE_SIZE: u32 = 4096;

/// Initialization parameters for a `GpuContext`.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Canvas (default destination) size in pixels. Clamped to `MAX_TEXTURE_SIZE`.
    pub width: u32,
    pub height: u32,

    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,

    /// Use a software adapter even when hardware is present.
    pub force_fallback_adapter: bool,

    /// Anisotropy clamp used by `TextureFilter::Anisotropic`.
    pub anisotropy: u16,

    /// Optional capabilities to enable when the adapter supports them.
    pub extensions: Vec<Extension>,

    /// Slots pre-allocated for nested render-target activation.
    pub stack_capacity: usize,

    pub label: &'static str,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter: false,
            anisotropy: 8,
            extensions: Extension::ALL.to_vec(),
            stack_capacity: 256,
            label: "tilekiln device",
        }
    }
}

impl ContextConfig {
    /// Default configuration for a `width`×`height` canvas.
    pub fn sized(width: u32, height: u32) -> Self {
        Self { width, height, ..Self::default() }
    }
}
