use image::RgbaImage;
use image::imageops::FilterType;

use crate::device::config::MAX_TEXTURE_SIZE;
use crate::device::{Extension, GpuContext};
use crate::error::{GpuError, GpuResult};
use crate::ids::TextureId;
use crate::resource::readback;

/// Sampling quality of a texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
    /// Linear filtering across a generated mip chain.
    Mipmap,
    /// Mipmapped with anisotropic filtering. Falls back to `Mipmap` when the
    /// adapter lacks the capability.
    Anisotropic,
}

impl TextureFilter {
    fn uses_mipmaps(self) -> bool {
        matches!(self, TextureFilter::Mipmap | TextureFilter::Anisotropic)
    }
}

/// Parameters for a texture without initial contents.
#[derive(Debug, Copy, Clone)]
pub struct EmptyTextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub filter: TextureFilter,
    /// Allow the texture to be a color attachment.
    pub renderable: bool,
}

impl Default for EmptyTextureDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            format: wgpu::TextureFormat::Rgba8Unorm,
            filter: TextureFilter::Nearest,
            renderable: true,
        }
    }
}

impl EmptyTextureDesc {
    pub fn sized(width: u32, height: u32) -> Self {
        Self { width, height, ..Self::default() }
    }
}

/// Public metadata of a registered texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub filter: TextureFilter,
    pub mip_levels: u32,
    pub renderable: bool,
}

pub(crate) struct GpuTexture {
    pub raw: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub info: TextureInfo,
}

impl GpuContext {
    /// Best filter the adapter supports for image textures.
    pub fn default_texture_filter(&self) -> TextureFilter {
        if self.has_extension(Extension::AnisotropicFiltering) {
            TextureFilter::Anisotropic
        } else {
            TextureFilter::Mipmap
        }
    }

    /// Uploads an RGBA image. Mipmapped filters get a full mip chain.
    pub fn create_texture(&mut self, image: &RgbaImage, filter: TextureFilter) -> GpuResult<TextureId> {
        let (width, height) = image.dimensions();
        check_size("texture", width, height)?;

        let filter = self.resolve_filter(filter);
        let mip_levels = if filter.uses_mipmaps() { mip_level_count(width, height) } else { 1 };
        let sampler_params = self.sampler_params(filter, wgpu::TextureFormat::Rgba8Unorm);

        let Some(gpu) = self.gpu() else { return Err(GpuError::NotInitialized) };

        let raw = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tilekiln image texture"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        write_level(&gpu.queue, &raw, 0, image);
        if mip_levels > 1 {
            for (level, mip) in mip_chain(image).iter().enumerate() {
                write_level(&gpu.queue, &raw, level as u32 + 1, mip);
            }
        }

        let sampler = create_sampler(&gpu.device, sampler_params);

        let info = TextureInfo {
            width,
            height,
            format: wgpu::TextureFormat::Rgba8Unorm,
            filter,
            mip_levels,
            renderable: false,
        };
        Ok(self.register_texture(raw, sampler, info))
    }

    /// Allocates a texture with undefined (zeroed) contents.
    pub fn create_empty_texture(&mut self, desc: EmptyTextureDesc) -> GpuResult<TextureId> {
        check_size("texture", desc.width, desc.height)?;

        let format = self.resolve_format(desc.format);
        let filter = match desc.filter {
            // No contents to build a chain from.
            TextureFilter::Mipmap | TextureFilter::Anisotropic => TextureFilter::Linear,
            other => other,
        };
        let sampler_params = self.sampler_params(filter, format);

        let Some(gpu) = self.gpu() else { return Err(GpuError::NotInitialized) };

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if desc.renderable {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        let raw = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tilekiln empty texture"),
            size: wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        let sampler = create_sampler(&gpu.device, sampler_params);

        let info = TextureInfo {
            width: desc.width,
            height: desc.height,
            format,
            filter,
            mip_levels: 1,
            renderable: desc.renderable,
        };
        Ok(self.register_texture(raw, sampler, info))
    }

    /// Destroys a texture. Unknown ids are reported and ignored.
    pub fn delete_texture(&mut self, id: TextureId) {
        match self.textures.remove(&id) {
            Some(texture) => texture.raw.destroy(),
            None => self.report_unknown_texture(id),
        }
    }

    pub fn texture_info(&self, id: TextureId) -> Option<TextureInfo> {
        self.textures.get(&id).map(|t| t.info)
    }

    /// Reads a whole RGBA8 texture, bottom row first.
    pub fn read_texture(&self, id: TextureId, dest: &mut [u8]) -> GpuResult<()> {
        let Some(gpu) = self.gpu() else { return Err(GpuError::NotInitialized) };
        let Some(texture) = self.textures.get(&id) else { return Err(GpuError::UnknownTexture(id)) };
        if texture.info.format.block_copy_size(None) != Some(4) {
            return Err(GpuError::Readback(format!("{:?} is not a 4-byte format", texture.info.format)));
        }
        let TextureInfo { width, height, .. } = texture.info;
        readback::read_region(gpu, &texture.raw, 0, 0, width, height, dest)
    }

    /// 2×2 fully transparent texture bound to samplers that were never set.
    pub fn transparent_texture(&self) -> Option<TextureId> {
        self.transparent
    }

    pub(crate) fn create_transparent_texture(&mut self) -> Option<TextureId> {
        let image = RgbaImage::new(2, 2);
        match self.create_texture(&image, TextureFilter::Nearest) {
            Ok(id) => Some(id),
            Err(err) => {
                self.diagnostics.error(&format!("unable to create default texture: {err}"));
                None
            }
        }
    }

    fn resolve_filter(&self, filter: TextureFilter) -> TextureFilter {
        if filter == TextureFilter::Anisotropic && !self.has_extension(Extension::AnisotropicFiltering) {
            log::debug!("anisotropic filtering unavailable; using mipmaps");
            return TextureFilter::Mipmap;
        }
        filter
    }

    fn resolve_format(&self, format: wgpu::TextureFormat) -> wgpu::TextureFormat {
        let is_float = matches!(
            format,
            wgpu::TextureFormat::Rgba16Float | wgpu::TextureFormat::Rgba32Float
        );
        if is_float && !self.has_extension(Extension::ColorBufferFloat) {
            self.diagnostics.warn(&format!(
                "{format:?} color buffers need '{}'; using Rgba8Unorm",
                Extension::ColorBufferFloat
            ));
            return wgpu::TextureFormat::Rgba8Unorm;
        }
        format
    }

    fn register_texture(
        &mut self,
        raw: wgpu::Texture,
        sampler: wgpu::Sampler,
        info: TextureInfo,
    ) -> TextureId {
        let view = raw.create_view(&wgpu::TextureViewDescriptor::default());
        let id: TextureId = self.ids.next();
        self.textures.insert(id, GpuTexture { raw, view, sampler, info });
        id
    }

    fn sampler_params(&self, filter: TextureFilter, format: wgpu::TextureFormat) -> SamplerParams {
        let float32 = format == wgpu::TextureFormat::Rgba32Float;
        let linear_ok = !float32 || self.has_extension(Extension::TextureFloatLinear);
        SamplerParams {
            filter: if linear_ok { filter } else { TextureFilter::Nearest },
            anisotropy: self.config.anisotropy.max(1),
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct SamplerParams {
    filter: TextureFilter,
    anisotropy: u16,
}

fn create_sampler(device: &wgpu::Device, params: SamplerParams) -> wgpu::Sampler {
    let (mag, min, mip, anisotropy) = match params.filter {
        TextureFilter::Nearest => (
            wgpu::FilterMode::Nearest,
            wgpu::FilterMode::Nearest,
            wgpu::MipmapFilterMode::Nearest,
            1,
        ),
        TextureFilter::Linear => (
            wgpu::FilterMode::Linear,
            wgpu::FilterMode::Linear,
            wgpu::MipmapFilterMode::Nearest,
            1,
        ),
        TextureFilter::Mipmap => (
            wgpu::FilterMode::Linear,
            wgpu::FilterMode::Linear,
            wgpu::MipmapFilterMode::Linear,
            1,
        ),
        TextureFilter::Anisotropic => (
            wgpu::FilterMode::Linear,
            wgpu::FilterMode::Linear,
            wgpu::MipmapFilterMode::Linear,
            params.anisotropy,
        ),
    };

    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("tilekiln sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: mag,
        min_filter: min,
        mipmap_filter: mip,
        anisotropy_clamp: anisotropy,
        ..Default::default()
    })
}

fn check_size(what: &'static str, width: u32, height: u32) -> GpuResult<()> {
    if width == 0 || height == 0 || width > MAX_TEXTURE_SIZE || height > MAX_TEXTURE_SIZE {
        return Err(GpuError::InvalidSize { what, width, height });
    }
    Ok(())
}

fn write_level(queue: &wgpu::Queue, texture: &wgpu::Texture, level: u32, image: &RgbaImage) {
    let (width, height) = image.dimensions();
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        image.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
    );
}

/// Number of levels down to 1×1.
pub(crate) fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Levels 1.. of the mip chain, each half the previous size.
pub(crate) fn mip_chain(base: &RgbaImage) -> Vec<RgbaImage> {
    let (mut w, mut h) = base.dimensions();
    let mut levels: Vec<RgbaImage> = Vec::new();
    while w > 1 || h > 1 {
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        let source = levels.last().unwrap_or(base);
        levels.push(image::imageops::resize(source, w, h, FilterType::Triangle));
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::gpu_context;

    // ── mip chain ─────────────────────────────────────────────────────────

    #[test]
    fn mip_level_count_reaches_one_pixel() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(1024, 16), 11);
        assert_eq!(mip_level_count(5, 3), 3);
    }

    #[test]
    fn mip_chain_halves_each_level() {
        let base = RgbaImage::new(8, 2);
        let dims: Vec<(u32, u32)> = mip_chain(&base).iter().map(|m| m.dimensions()).collect();
        assert_eq!(dims, vec![(4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn mip_chain_preserves_solid_color() {
        let base = RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
        let chain = mip_chain(&base);
        let last = chain.last().expect("4x4 has a chain");
        assert_eq!(last.get_pixel(0, 0).0, [10, 20, 30, 255]);
    }

    // ── factory ───────────────────────────────────────────────────────────

    #[test]
    fn create_texture_requires_device() {
        let mut ctx = GpuContext::new(Default::default());
        let image = RgbaImage::new(2, 2);
        assert!(matches!(
            ctx.create_texture(&image, TextureFilter::Nearest),
            Err(GpuError::NotInitialized)
        ));
    }

    #[test]
    fn zero_sized_texture_is_rejected() {
        let Some(mut ctx) = gpu_context(8, 8) else { return };
        let result = ctx.create_empty_texture(EmptyTextureDesc::sized(0, 4));
        assert!(matches!(result, Err(GpuError::InvalidSize { .. })));
    }

    #[test]
    fn anisotropic_falls_back_to_mipmap_when_unsupported() {
        let Some(mut ctx) = gpu_context(8, 8) else { return };
        ctx.extensions.remove(&Extension::AnisotropicFiltering);
        assert_eq!(ctx.default_texture_filter(), TextureFilter::Mipmap);

        let image = RgbaImage::new(16, 16);
        let id = ctx.create_texture(&image, TextureFilter::Anisotropic).expect("texture creation");
        let info = ctx.texture_info(id).expect("registered");
        assert_eq!(info.filter, TextureFilter::Mipmap);
        assert_eq!(info.mip_levels, 5);
    }

    #[test]
    fn empty_texture_defaults_to_rgba8_nearest() {
        let Some(mut ctx) = gpu_context(8, 8) else { return };
        let id = ctx.create_empty_texture(EmptyTextureDesc::sized(32, 16)).expect("texture creation");
        let info = ctx.texture_info(id).expect("registered");
        assert_eq!(info.format, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(info.filter, TextureFilter::Nearest);
        assert!(info.renderable);
    }

    #[test]
    fn delete_texture_forgets_the_id() {
        let Some(mut ctx) = gpu_context(8, 8) else { return };
        let id = ctx.create_empty_texture(EmptyTextureDesc::default()).expect("texture creation");
        ctx.delete_texture(id);
        assert!(ctx.texture_info(id).is_none());
        // Second delete only reports.
        ctx.delete_texture(id);
    }
}
