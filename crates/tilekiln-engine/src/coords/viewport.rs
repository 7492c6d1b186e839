/// Viewport rectangle in physical pixels of the bound destination.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Viewport covering a whole `width`×`height` surface.
    #[inline]
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Converts a GL-style (bottom-left origin) viewport into wgpu's
    /// top-left-origin convention for a surface of `surface_height` rows.
    #[inline]
    pub fn to_wgpu(self, surface_height: u32) -> (f32, f32, f32, f32) {
        let top = surface_height.saturating_sub(self.y + self.height);
        (self.x as f32, top as f32, self.width as f32, self.height as f32)
    }
}
