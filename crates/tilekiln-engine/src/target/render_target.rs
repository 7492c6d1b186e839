use crate::coords::Viewport;
use crate::device::config::MAX_TEXTURE_SIZE;
use crate::device::{Binding, GpuContext};
use crate::error::{GpuError, GpuResult};
use crate::ids::{TargetId, TextureId};
use crate::resource::readback;
use crate::resource::{EmptyTextureDesc, TextureFilter};

/// Parameters of an offscreen render target.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderTargetConfig {
    pub width: u32,
    pub height: u32,
    /// Number of color attachments.
    pub attachments: usize,
    pub format: wgpu::TextureFormat,
    pub filter: TextureFilter,
    pub depth_format: wgpu::TextureFormat,
    pub use_depth: bool,
    /// Create no color textures; outputs are bound with `bind_output_texture`.
    pub is_bare: bool,
}

impl Default for RenderTargetConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            attachments: 1,
            format: wgpu::TextureFormat::Rgba8Unorm,
            filter: TextureFilter::Nearest,
            depth_format: wgpu::TextureFormat::Depth16Unorm,
            use_depth: true,
            is_bare: false,
        }
    }
}

impl RenderTargetConfig {
    pub fn sized(width: u32, height: u32) -> Self {
        Self { width, height, ..Self::default() }
    }
}

pub(crate) struct DepthAttachment {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

/// GPU side of a render target, owned by the context.
pub(crate) struct TargetSlot {
    pub width: u32,
    pub height: u32,
    pub colors: Vec<Option<TextureId>>,
    /// Color textures this slot created and deletes on release.
    pub owned: Vec<TextureId>,
    pub depth: Option<DepthAttachment>,
    pub active: bool,
}

impl TargetSlot {
    pub fn color(&self, index: usize) -> Option<TextureId> {
        self.colors.get(index).copied().flatten()
    }

    /// Destroys the depth attachment. Color textures live in the texture table.
    pub fn release(self) {
        if let Some(depth) = self.depth {
            depth.texture.destroy();
        }
    }
}

impl GpuContext {
    /// Color + depth slot standing in for the default framebuffer.
    pub(crate) fn create_canvas_slot(&mut self, width: u32, height: u32) -> Option<TargetId> {
        let config = RenderTargetConfig::sized(width, height);
        match self.create_target_slot(&config) {
            Ok(id) => Some(id),
            Err(err) => {
                self.diagnostics.error(&format!("unable to create canvas: {err}"));
                None
            }
        }
    }

    pub(crate) fn create_target_slot(&mut self, config: &RenderTargetConfig) -> GpuResult<TargetId> {
        let mut colors = Vec::with_capacity(config.attachments);
        let mut owned = Vec::new();
        for _ in 0..config.attachments {
            if config.is_bare {
                colors.push(None);
                continue;
            }
            let created = self.create_empty_texture(EmptyTextureDesc {
                width: config.width,
                height: config.height,
                format: config.format,
                filter: config.filter,
                renderable: true,
            });
            match created {
                Ok(id) => {
                    colors.push(Some(id));
                    owned.push(id);
                }
                Err(err) => {
                    for id in owned {
                        self.delete_texture(id);
                    }
                    return Err(err);
                }
            }
        }

        let depth = if config.use_depth {
            let Some(gpu) = self.gpu() else { return Err(GpuError::NotInitialized) };
            let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("tilekiln depth attachment"),
                size: wgpu::Extent3d {
                    width: config.width,
                    height: config.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: config.depth_format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            Some(DepthAttachment { texture, view, format: config.depth_format })
        } else {
            None
        };

        let id: TargetId = self.ids.next();
        self.targets.insert(
            id,
            TargetSlot {
                width: config.width,
                height: config.height,
                colors,
                owned,
                depth,
                active: false,
            },
        );
        Ok(id)
    }

    /// Removes a slot, deleting the color textures it created.
    pub(crate) fn release_target_slot(&mut self, id: TargetId) {
        let Some(slot) = self.targets.remove(&id) else {
            log::debug!("release_target_slot: unknown {id}");
            return;
        };
        for texture in &slot.owned {
            self.delete_texture(*texture);
        }
        slot.release();
        if self.binding.target == Some(id) {
            self.binding = self.canvas_binding();
        }
    }
}

/// An offscreen color (+ depth) destination.
///
/// Activation nests: activating target B while A is bound pushes B on the
/// context's activation stack, and deactivating B rebinds A with its own
/// viewport. Every `activate` must be matched by one `deactivate`.
#[derive(Debug)]
pub struct RenderTarget {
    config: RenderTargetConfig,
    slot: Option<TargetId>,
    complete: bool,
}

impl RenderTarget {
    pub fn new(config: RenderTargetConfig) -> Self {
        Self { config, slot: None, complete: false }
    }

    pub fn config(&self) -> &RenderTargetConfig {
        &self.config
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    pub fn id(&self) -> Option<TargetId> {
        self.slot
    }

    /// (Re)creates every attachment at the configured size.
    pub fn init(&mut self, ctx: &mut GpuContext) -> GpuResult<()> {
        let (w, h) = (self.config.width, self.config.height);
        if w == 0 || h == 0 || w > MAX_TEXTURE_SIZE || h > MAX_TEXTURE_SIZE {
            return Err(GpuError::InvalidSize { what: "render target", width: w, height: h });
        }

        let previous = self.slot.take();
        let was_bound = previous.is_some() && ctx.binding.target == previous;
        let was_active = previous.is_some_and(|id| ctx.targets.get(&id).is_some_and(|s| s.active));
        if let Some(old) = previous {
            ctx.release_target_slot(old);
        }
        self.complete = false;

        let id = ctx.create_target_slot(&self.config)?;
        self.slot = Some(id);
        self.complete = true;

        // A live activation follows the new attachments.
        if let Some(old) = previous {
            ctx.stack.replace(old, id);
            if let Some(slot) = ctx.targets.get_mut(&id) {
                slot.active = was_active;
            }
            if was_bound {
                ctx.binding = Binding { target: Some(id), viewport: Viewport::full(w, h) };
            }
        }
        log::debug!("render target {id} initialized at {w}x{h}");
        Ok(())
    }

    /// Releases every attachment. The target can be re-initialized later.
    pub fn destroy(&mut self, ctx: &mut GpuContext) {
        let Some(id) = self.slot.take() else { return };
        if ctx.stack.iter().any(|t| t == id) {
            log::warn!("render target {id} destroyed while activated");
        }
        ctx.release_target_slot(id);
        self.complete = false;
    }

    /// Binds this target and pushes it on the activation stack.
    pub fn activate(&mut self, ctx: &mut GpuContext) -> bool {
        let Some(id) = self.slot else {
            ctx.diagnostics.warn("activating a render target that was never initialized");
            return false;
        };
        if !ctx.targets.contains_key(&id) {
            ctx.diagnostics.warn(&format!("activating released render target {id}"));
            return false;
        }

        if let Some(previous) = ctx.stack.current()
            && let Some(slot) = ctx.targets.get_mut(&previous)
        {
            slot.active = false;
        }
        ctx.stack.push(id);

        let Some(slot) = ctx.targets.get_mut(&id) else { return false };
        slot.active = true;
        ctx.binding = Binding { target: Some(id), viewport: Viewport::full(slot.width, slot.height) };
        true
    }

    /// Unbinds this target and restores whatever was bound before it.
    pub fn deactivate(&mut self, ctx: &mut GpuContext) {
        let Some(id) = self.slot else { return };
        if ctx.stack.current() != Some(id) {
            log::debug!("deactivating {id} which is not the current render target");
        }
        if let Some(slot) = ctx.targets.get_mut(&id) {
            slot.active = false;
        }

        let previous = ctx.stack.pop_prev();
        if let Some(prev) = previous
            && let Some(slot) = ctx.targets.get_mut(&prev)
        {
            slot.active = true;
            ctx.binding = Binding { target: Some(prev), viewport: Viewport::full(slot.width, slot.height) };
        } else {
            ctx.binding = ctx.canvas_binding();
        }
    }

    pub fn is_active(&self, ctx: &GpuContext) -> bool {
        self.slot.and_then(|id| ctx.targets.get(&id)).is_some_and(|s| s.active)
    }

    /// Changes the configured size.
    ///
    /// Targets with a depth attachment, and any target when `force` is set,
    /// are re-initialized at the new size. Otherwise the attachments keep
    /// their old size and the target reports incomplete until re-initialized.
    pub fn set_size(&mut self, ctx: &mut GpuContext, width: u32, height: u32, force: bool) -> GpuResult<()> {
        if width == self.config.width && height == self.config.height && !force {
            return Ok(());
        }
        self.config.width = width;
        self.config.height = height;
        if self.config.use_depth || force {
            return self.init(ctx);
        }
        self.complete = false;
        Ok(())
    }

    /// Whether every attachment exists at the configured size.
    pub fn is_complete(&self, ctx: &GpuContext) -> bool {
        let Some(slot) = self.slot.and_then(|id| ctx.targets.get(&id)) else { return false };
        if !self.complete || slot.width != self.config.width || slot.height != self.config.height {
            return false;
        }
        let colors_ok = slot.colors.iter().all(|color| match color {
            Some(id) => ctx
                .texture_info(*id)
                .is_some_and(|info| info.width == slot.width && info.height == slot.height),
            None => self.config.is_bare,
        });
        let depth_ok = slot.depth.is_some() == self.config.use_depth;
        colors_ok && depth_ok && slot.colors.iter().any(Option::is_some)
    }

    /// Replaces color attachment `index` with a caller-owned texture.
    ///
    /// A texture the target created for that attachment is deleted.
    pub fn bind_output_texture(&mut self, ctx: &mut GpuContext, texture: TextureId, index: usize) -> GpuResult<()> {
        let Some(id) = self.slot else { return Err(GpuError::NotInitialized) };
        let Some(info) = ctx.texture_info(texture) else { return Err(GpuError::UnknownTexture(texture)) };
        let Some(slot) = ctx.targets.get_mut(&id) else { return Err(GpuError::UnknownTarget(id)) };
        if index >= slot.colors.len() {
            return Err(GpuError::MissingAttachment(id, index));
        }
        if !info.renderable || info.width != slot.width || info.height != slot.height {
            return Err(GpuError::InvalidSize { what: "output texture", width: info.width, height: info.height });
        }

        let replaced = slot.colors[index].replace(texture);
        let owned_replaced = replaced.filter(|old| *old != texture && slot.owned.contains(old));
        if let Some(old) = owned_replaced {
            slot.owned.retain(|t| *t != old);
            ctx.delete_texture(old);
        }
        Ok(())
    }

    /// Texture behind color attachment `index`.
    pub fn color_texture(&self, ctx: &GpuContext, index: usize) -> Option<TextureId> {
        ctx.targets.get(&self.slot?)?.color(index)
    }

    /// Reads a region of attachment `index` into `dest` (RGBA8, bottom-left origin).
    ///
    /// Does not activate anything; the pixels reflect every submitted draw.
    #[allow(clippy::too_many_arguments)]
    pub fn read_pixels(
        &self,
        ctx: &GpuContext,
        dest: &mut [u8],
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        index: usize,
    ) -> GpuResult<()> {
        let Some(gpu) = ctx.gpu() else { return Err(GpuError::NotInitialized) };
        let Some(id) = self.slot else { return Err(GpuError::NotInitialized) };
        let Some(slot) = ctx.targets.get(&id) else { return Err(GpuError::UnknownTarget(id)) };

        let fits = x.checked_add(width).is_some_and(|r| r <= slot.width)
            && y.checked_add(height).is_some_and(|t| t <= slot.height);
        if !fits {
            return Err(GpuError::RegionOutOfBounds {
                x,
                y,
                width,
                height,
                target_width: slot.width,
                target_height: slot.height,
            });
        }

        let Some(texture_id) = slot.color(index) else { return Err(GpuError::MissingAttachment(id, index)) };
        let Some(texture) = ctx.textures.get(&texture_id) else {
            return Err(GpuError::UnknownTexture(texture_id));
        };
        readback::read_region(gpu, &texture.raw, x, y, width, height, dest)
    }

    /// Reads the whole of attachment `index`.
    pub fn read_all_pixels(&self, ctx: &GpuContext, dest: &mut [u8], index: usize) -> GpuResult<()> {
        let Some(slot) = self.slot.and_then(|id| ctx.targets.get(&id)) else {
            return Err(GpuError::NotInitialized);
        };
        let (w, h) = (slot.width, slot.height);
        self.read_pixels(ctx, dest, 0, 0, w, h, index)
    }
}
