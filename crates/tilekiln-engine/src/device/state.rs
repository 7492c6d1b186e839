use crate::coords::Viewport;
use crate::ids::TargetId;

/// Blend configuration for subsequent draws.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Source replaces destination.
    #[default]
    Disabled,
    /// `src * srcAlpha + dst * (1 - srcAlpha)` on all four channels.
    Alpha,
    /// `src * 1 + dst * 0`, written explicitly.
    Replace,
}

impl BlendMode {
    pub(crate) fn to_wgpu(self) -> Option<wgpu::BlendState> {
        match self {
            BlendMode::Disabled => None,
            BlendMode::Replace => Some(wgpu::BlendState::REPLACE),
            BlendMode::Alpha => {
                let component = wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                    operation: wgpu::BlendOperation::Add,
                };
                Some(wgpu::BlendState { color: component, alpha: component })
            }
        }
    }
}

/// Fixed-function state folded into every pipeline the context builds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub depth_test: bool,
    pub cull_back_faces: bool,
    pub front_face: wgpu::FrontFace,
    pub blend: BlendMode,
}

impl RasterState {
    /// State right after initialization: depth test and back-face culling on,
    /// counter-clockwise front faces, no blending.
    pub const fn initial() -> Self {
        Self {
            depth_test: true,
            cull_back_faces: true,
            front_face: wgpu::FrontFace::Ccw,
            blend: BlendMode::Disabled,
        }
    }

    /// State after teardown: everything off.
    pub const fn disabled() -> Self {
        Self {
            depth_test: false,
            cull_back_faces: false,
            front_face: wgpu::FrontFace::Ccw,
            blend: BlendMode::Disabled,
        }
    }

    /// The overlay state every tile render uses.
    pub const fn overlay() -> Self {
        Self {
            depth_test: false,
            cull_back_faces: false,
            front_face: wgpu::FrontFace::Ccw,
            blend: BlendMode::Alpha,
        }
    }

    pub(crate) fn cull_mode(self) -> Option<wgpu::Face> {
        self.cull_back_faces.then_some(wgpu::Face::Back)
    }
}

impl Default for RasterState {
    fn default() -> Self {
        Self::initial()
    }
}

/// The destination draws go to: a render target or the canvas (`None`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Binding {
    pub target: Option<TargetId>,
    pub viewport: Viewport,
}

impl Binding {
    pub const fn canvas(width: u32, height: u32) -> Self {
        Self { target: None, viewport: Viewport::full(width, height) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_blend_uses_src_alpha_on_both_components() {
        let state = BlendMode::Alpha.to_wgpu().expect("alpha blend has state");
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(state.alpha.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
        assert_eq!(state.color.operation, wgpu::BlendOperation::Add);
    }

    #[test]
    fn initial_state_culls_and_tests_depth() {
        let s = RasterState::initial();
        assert!(s.depth_test && s.cull_back_faces);
        assert_eq!(s.cull_mode(), Some(wgpu::Face::Back));
        assert_eq!(RasterState::disabled().cull_mode(), None);
    }
}
