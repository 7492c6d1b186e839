use std::fmt;

/// Optional capabilities probed at initialization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// Anisotropic texture filtering.
    AnisotropicFiltering,
    /// 32-bit index buffers.
    ElementIndexUint,
    /// Half-float color attachments.
    ColorBufferFloat,
    /// Linear filtering of 32-bit float textures.
    TextureFloatLinear,
}

impl Extension {
    pub const ALL: [Extension; 4] = [
        Extension::AnisotropicFiltering,
        Extension::ElementIndexUint,
        Extension::ColorBufferFloat,
        Extension::TextureFloatLinear,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Extension::AnisotropicFiltering => "EXT_texture_filter_anisotropic",
            Extension::ElementIndexUint => "OES_element_index_uint",
            Extension::ColorBufferFloat => "EXT_color_buffer_float",
            Extension::TextureFloatLinear => "OES_texture_float_linear",
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the selected adapter can do.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub anisotropic_filtering: bool,
    pub index_uint32: bool,
    pub float_render_targets: bool,
    pub float_linear_filtering: bool,
    pub max_texture_dimension: u32,
}

impl Capabilities {
    /// Probes an adapter.
    pub fn probe(adapter: &wgpu::Adapter) -> Self {
        let downlevel = adapter.get_downlevel_capabilities();
        let half_float = adapter.get_texture_format_features(wgpu::TextureFormat::Rgba16Float);

        Self {
            anisotropic_filtering: downlevel
                .flags
                .contains(wgpu::DownlevelFlags::ANISOTROPIC_FILTERING),
            index_uint32: downlevel
                .flags
                .contains(wgpu::DownlevelFlags::FULL_DRAW_INDEX_UINT32),
            float_render_targets: half_float
                .allowed_usages
                .contains(wgpu::TextureUsages::RENDER_ATTACHMENT),
            float_linear_filtering: adapter
                .features()
                .contains(wgpu::Features::FLOAT32_FILTERABLE),
            max_texture_dimension: adapter.limits().max_texture_dimension_2d,
        }
    }

    pub fn supports(&self, ext: Extension) -> bool {
        match ext {
            Extension::AnisotropicFiltering => self.anisotropic_filtering,
            Extension::ElementIndexUint => self.index_uint32,
            Extension::ColorBufferFloat => self.float_render_targets,
            Extension::TextureFloatLinear => self.float_linear_filtering,
        }
    }

    /// Device features to request so the enabled extensions work.
    pub fn required_features(&self, requested: &[Extension]) -> wgpu::Features {
        let mut features = wgpu::Features::empty();
        if self.float_linear_filtering && requested.contains(&Extension::TextureFloatLinear) {
            features |= wgpu::Features::FLOAT32_FILTERABLE;
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_maps_each_extension() {
        let caps = Capabilities { index_uint32: true, ..Capabilities::default() };
        assert!(caps.supports(Extension::ElementIndexUint));
        assert!(!caps.supports(Extension::AnisotropicFiltering));
        assert!(!caps.supports(Extension::ColorBufferFloat));
    }

    #[test]
    fn float_filtering_is_only_requested_when_asked() {
        let caps = Capabilities { float_linear_filtering: true, ..Capabilities::default() };
        assert!(caps.required_features(&[]).is_empty());
        assert_eq!(
            caps.required_features(&[Extension::TextureFloatLinear]),
            wgpu::Features::FLOAT32_FILTERABLE
        );
    }

    #[test]
    fn names_follow_the_gl_extension_strings() {
        assert_eq!(Extension::ElementIndexUint.to_string(), "OES_element_index_uint");
    }
}
