//! Point features drawn as atlas icons.

use std::collections::HashMap;

use tilekiln_engine::atlas::{AtlasConfig, AtlasImage, TextureAtlas};
use tilekiln_engine::ids::ImageId;
use tilekiln_engine::shader::{DrawMode, ProgramDesc, Value, VarKind};

use crate::error::TileError;
use crate::features::{FilterKey, Geometry, TileData};
use crate::renderer::common::Surface;
use crate::renderer::{StyleContext, TileRenderer};

const PROGRAM: &str = "billboard";
const SHADER: &str = include_str!("shaders/point.wgsl");

/// Quad corners of the two icon triangles, in atlas tex-coord order.
const CORNERS: [[f32; 2]; 6] = [[-0.5, -0.5], [-0.5, 0.5], [0.5, 0.5], [0.5, 0.5], [0.5, -0.5], [-0.5, -0.5]];

/// A registered icon: its atlas entry plus a pixel offset from the point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Icon {
    pub image: ImageId,
    pub offset: [f32; 2],
}

/// Icons by layer and style filter.
#[derive(Debug, Clone, Default)]
pub struct IconRegistry {
    layers: HashMap<String, HashMap<FilterKey, Icon>>,
    fallback: Option<Icon>,
}

impl IconRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `icon`, returning the one it replaces.
    pub fn insert(&mut self, layer: &str, filter: FilterKey, icon: Icon) -> Option<Icon> {
        self.layers.entry(layer.to_owned()).or_default().insert(filter, icon)
    }

    /// Icon used when a feature's layer or filter has no entry.
    pub fn set_fallback(&mut self, icon: Option<Icon>) {
        self.fallback = icon;
    }

    pub fn fallback(&self) -> Option<Icon> {
        self.fallback
    }

    pub fn get(&self, layer: &str, filter: Option<&FilterKey>) -> Option<Icon> {
        filter
            .and_then(|f| self.layers.get(layer)?.get(f))
            .copied()
            .or(self.fallback)
    }

    pub fn len(&self) -> usize {
        self.layers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.layers.clear();
        self.fallback = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointRendererConfig {
    pub target_size: (u32, u32),
    pub atlas: AtlasConfig,
    /// Property index holding a rotation in degrees. No rotation when unset.
    pub rotation_property: Option<usize>,
    /// Shift points across the date line on world-edge tiles.
    pub wrap_dateline: bool,
}

impl Default for PointRendererConfig {
    fn default() -> Self {
        Self {
            target_size: (256, 256),
            atlas: AtlasConfig::default(),
            rotation_property: None,
            wrap_dateline: true,
        }
    }
}

/// Per-vertex attribute streams of one tile.
#[derive(Debug, Clone, Default, PartialEq)]
struct PointBatch {
    /// Corner xy + atlas uv.
    vert_tex: Vec<f32>,
    /// Projected xy + rotation.
    lonlat_rotation: Vec<f32>,
    /// Icon size + offset.
    size_offset: Vec<f32>,
}

impl PointBatch {
    fn vertex_count(&self) -> u32 {
        (self.lonlat_rotation.len() / 3) as u32
    }

    fn is_empty(&self) -> bool {
        self.lonlat_rotation.is_empty()
    }

    fn push_quad(&mut self, position: [f32; 2], rotation: f32, tex: &[f32; 12], size: [f32; 2], offset: [f32; 2]) {
        for (k, corner) in CORNERS.iter().enumerate() {
            self.vert_tex.extend([corner[0], corner[1], tex[2 * k], tex[2 * k + 1]]);
            self.lonlat_rotation.extend([position[0], position[1], rotation]);
            self.size_offset.extend([size[0], size[1], offset[0], offset[1]]);
        }
    }
}

/// Draws POINT and MULTIPOINT features as icons from a texture atlas.
pub struct PointRenderer {
    config: PointRendererConfig,
    surface: Option<Surface>,
    atlas: TextureAtlas,
    icons: IconRegistry,
}

impl PointRenderer {
    pub fn new(config: PointRendererConfig) -> Self {
        let atlas = TextureAtlas::new(config.atlas);
        Self { config, surface: None, atlas, icons: IconRegistry::new() }
    }

    pub fn config(&self) -> &PointRendererConfig {
        &self.config
    }

    pub fn icons(&self) -> &IconRegistry {
        &self.icons
    }

    pub fn atlas(&self) -> &TextureAtlas {
        &self.atlas
    }

    /// Packs `image` and registers it for `(layer, filter)`.
    ///
    /// Returns `Ok(None)` when the image is empty or no longer fits the atlas.
    pub fn append_icon(
        &mut self,
        layer: &str,
        filter: impl Into<FilterKey>,
        image: AtlasImage,
    ) -> Result<Option<ImageId>, TileError> {
        self.append_icon_with_offset(layer, filter, image, [0.0, 0.0])
    }

    /// Like [`append_icon`](Self::append_icon), drawn `offset` pixels away
    /// from the point.
    pub fn append_icon_with_offset(
        &mut self,
        layer: &str,
        filter: impl Into<FilterKey>,
        image: AtlasImage,
        offset: [f32; 2],
    ) -> Result<Option<ImageId>, TileError> {
        let Some(id) = self.pack(image)? else { return Ok(None) };
        self.upload_atlas()?;
        self.icons.insert(layer, filter.into(), Icon { image: id, offset });
        Ok(Some(id))
    }

    /// Registers one image per style; style `i` answers filter `i`.
    ///
    /// Returns how many images were packed.
    pub fn append_styles(
        &mut self,
        layer: &str,
        images: impl IntoIterator<Item = AtlasImage>,
    ) -> Result<usize, TileError> {
        let mut packed = 0;
        for (index, image) in images.into_iter().enumerate() {
            if let Some(id) = self.pack(image)? {
                self.icons.insert(layer, FilterKey::Index(index as u64), Icon { image: id, offset: [0.0, 0.0] });
                packed += 1;
            }
        }
        if packed > 0 {
            self.upload_atlas()?;
        }
        Ok(packed)
    }

    /// Icon drawn for features without a registered one.
    pub fn set_fallback_icon(&mut self, image: AtlasImage) -> Result<Option<ImageId>, TileError> {
        let Some(id) = self.pack(image)? else { return Ok(None) };
        self.upload_atlas()?;
        self.icons.set_fallback(Some(Icon { image: id, offset: [0.0, 0.0] }));
        Ok(Some(id))
    }

    /// Forgets every icon and uploads the empty atlas.
    pub fn clear_icons(&mut self) -> Result<(), TileError> {
        self.icons.clear();
        match self.surface.as_mut() {
            Some(surface) => self.atlas.clear(&mut surface.ctx)?,
            None => self.atlas.remove_all(),
        }
        Ok(())
    }

    fn pack(&mut self, image: AtlasImage) -> Result<Option<ImageId>, TileError> {
        let Some(surface) = self.surface.as_mut() else { return Err(TileError::NotReady) };
        let (w, h) = image.size();
        match self.atlas.add_image(surface.ctx.id_allocator(), image, true) {
            Some((id, _)) => Ok(Some(id)),
            None => {
                log::warn!("point renderer: icon {w}x{h} was not packed");
                Ok(None)
            }
        }
    }

    fn upload_atlas(&mut self) -> Result<(), TileError> {
        let Some(surface) = self.surface.as_mut() else { return Err(TileError::NotReady) };
        self.atlas.create_texture(&mut surface.ctx)?;
        Ok(())
    }

    fn program_desc() -> ProgramDesc {
        ProgramDesc::new(PROGRAM)
            .attribute("a_vert_tex", VarKind::Vec4)
            .attribute("a_lonlat_rotation", VarKind::Vec3)
            .attribute("a_size_offset", VarKind::Vec4)
            .uniform("extentParams", VarKind::Vec4)
            .uniform("invSize", VarKind::Vec2)
            .uniform("u_texture", VarKind::Sampler2d)
            .vertex_shader(SHADER)
            .fragment_shader(SHADER)
    }
}

/// Builds the icon quads of every point feature in `tile`.
///
/// Features without an icon (and no fallback) still get a quad, with zero
/// size and zero tex coords, so they draw nothing.
fn build_batch(
    atlas: &TextureAtlas,
    icons: &IconRegistry,
    config: &PointRendererConfig,
    tile: &TileData,
    layer: &str,
) -> PointBatch {
    let mut batch = PointBatch::default();
    let bounds = tile.bounds();
    let border = atlas.config().border;

    for (item, geometry) in tile.features() {
        let points = match geometry {
            Geometry::Point(p) => vec![p],
            Geometry::MultiPoint(ps) => ps,
            other => {
                log::debug!("point renderer: ignoring {} feature", other.kind());
                continue;
            }
        };

        let rotation = config.rotation_property.and_then(|i| item.number(i)).unwrap_or(0.0) as f32;
        let icon = icons.get(layer, item.filter());
        let tex = icon.and_then(|i| atlas.tex_coords(i.image)).unwrap_or([0.0; 12]);
        let size = icon
            .and_then(|i| atlas.rect(i.image))
            .map_or([0.0, 0.0], |r| {
                [r.width().saturating_sub(border) as f32, r.height().saturating_sub(border) as f32]
            });
        let offset = icon.map_or([0.0, 0.0], |i| i.offset);

        for p in points {
            let x = if config.wrap_dateline { bounds.wrap_x(p[0]) } else { p[0] };
            batch.push_quad(bounds.to_local([x, p[1]]), rotation, &tex, size, offset);
        }
    }
    batch
}

impl TileRenderer for PointRenderer {
    fn initialize(&mut self) -> bool {
        if self.surface.is_none() {
            let (w, h) = self.config.target_size;
            self.surface = Surface::create_logged("point", w, h, Self::program_desc());
        }
        self.is_ready()
    }

    fn is_ready(&self) -> bool {
        self.surface.is_some()
    }

    fn size(&self) -> (u32, u32) {
        self.config.target_size
    }

    fn render(&mut self, out: &mut [u8], tile: &TileData, style: &StyleContext) -> Result<(), TileError> {
        let Some(surface) = self.surface.as_mut() else { return Err(TileError::NotReady) };

        let batch = build_batch(&self.atlas, &self.icons, &self.config, tile, &style.layer_id);
        let buffers = if batch.is_empty() {
            None
        } else {
            Some([
                surface.upload_vertices(&batch.vert_tex, 4)?,
                surface.upload_vertices(&batch.lonlat_rotation, 3)?,
                surface.upload_vertices(&batch.size_offset, 4)?,
            ])
        };

        let (w, h) = surface.size();
        let extent = tile.bounds().local_extent_params();
        let inv_size = [2.0 / w as f32, 2.0 / h as f32];
        let texture = self.atlas.texture();
        let count = batch.vertex_count();

        surface.run(out, |program| {
            let Some([vert_tex, lonlat_rotation, size_offset]) = buffers else { return Ok(()) };
            let mut values = vec![
                ("extentParams", Value::Vec4(extent)),
                ("invSize", Value::Vec2(inv_size)),
                ("a_vert_tex", Value::buffer(vert_tex)),
                ("a_lonlat_rotation", Value::buffer(lonlat_rotation)),
                ("a_size_offset", Value::buffer(size_offset)),
            ];
            if let Some(texture) = texture {
                values.push(("u_texture", Value::Texture(texture)));
            }
            program.set(&values);
            program.draw_arrays(DrawMode::Triangles, 0, count)
        })
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};
    use serde_json::json;
    use tilekiln_engine::ids::IdAllocator;

    use super::*;
    use crate::features::{MERCATOR_HALF_WORLD, TileBounds};
    use crate::testing::{pixel, ready};

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> AtlasImage {
        AtlasImage::new(RgbaImage::from_pixel(w, h, Rgba(rgba)))
    }

    fn point_tile(bounds: TileBounds, points: &[([f64; 2], Option<FilterKey>)]) -> TileData {
        let mut tile = TileData::new(bounds);
        for (p, filter) in points {
            tile.push(json!({ "type": "POINT", "coordinates": p }), filter.clone());
        }
        tile
    }

    // ── registry ──────────────────────────────────────────────────────────

    #[test]
    fn registry_falls_back() {
        let mut ids = IdAllocator::new();
        let a = Icon { image: ids.next(), offset: [0.0, 0.0] };
        let b = Icon { image: ids.next(), offset: [1.0, 2.0] };

        let mut reg = IconRegistry::new();
        reg.insert("ships", FilterKey::Index(3), a);
        assert_eq!(reg.get("ships", Some(&FilterKey::Index(3))), Some(a));
        assert_eq!(reg.get("ships", Some(&FilterKey::Index(4))), None);
        assert_eq!(reg.get("other", Some(&FilterKey::Index(3))), None);

        reg.set_fallback(Some(b));
        assert_eq!(reg.get("ships", None), Some(b));
        assert_eq!(reg.get("other", Some(&FilterKey::Index(3))), Some(b));
        assert_eq!(reg.len(), 1);
    }

    // ── batch building ────────────────────────────────────────────────────

    #[test]
    fn quads_use_icon_size_and_tex_coords() {
        let mut ids = IdAllocator::new();
        let config = PointRendererConfig::default();
        let mut atlas = TextureAtlas::new(config.atlas);
        let (id, placement) = atlas.add_image(&mut ids, solid(10, 6, [255, 0, 0, 255]), true).expect("icon fits");
        let mut icons = IconRegistry::new();
        icons.insert("ships", FilterKey::Index(0), Icon { image: id, offset: [0.0, 0.0] });

        let tile = point_tile(TileBounds::new(0.0, 0.0, 256.0, 256.0), &[([128.0, 64.0], Some(FilterKey::Index(0)))]);
        let batch = build_batch(&atlas, &icons, &config, &tile, "ships");

        assert_eq!(batch.vertex_count(), 6);
        assert_eq!(batch.vert_tex.len(), 24);
        assert_eq!(batch.lonlat_rotation.len(), 18);
        assert_eq!(&batch.size_offset[..4], &[10.0, 6.0, 0.0, 0.0]);
        assert_eq!(&batch.lonlat_rotation[..3], &[128.0, 64.0, 0.0]);
        for k in 0..6 {
            assert_eq!(batch.vert_tex[4 * k + 2], placement.tex_coords[2 * k]);
            assert_eq!(batch.vert_tex[4 * k + 3], placement.tex_coords[2 * k + 1]);
        }
    }

    #[test]
    fn missing_icon_draws_nothing() {
        let config = PointRendererConfig::default();
        let atlas = TextureAtlas::new(config.atlas);
        let tile = point_tile(TileBounds::new(0.0, 0.0, 1.0, 1.0), &[([0.5, 0.5], Some("unknown".into()))]);
        let batch = build_batch(&atlas, &IconRegistry::new(), &config, &tile, "ships");
        assert_eq!(batch.vertex_count(), 6);
        assert!(batch.size_offset.iter().all(|&v| v == 0.0));
        assert!(batch.vert_tex.chunks_exact(4).all(|c| c[2] == 0.0 && c[3] == 0.0));
    }

    #[test]
    fn multipoints_rotation_and_other_geometries() {
        let config = PointRendererConfig { rotation_property: Some(0), ..PointRendererConfig::default() };
        let atlas = TextureAtlas::new(config.atlas);
        let mut tile = TileData::new(TileBounds::new(0.0, 0.0, 10.0, 10.0));
        tile.geo_items.push(crate::features::GeoItem {
            properties: vec![json!(90.0), json!({ "type": "MULTIPOINT", "coordinates": [[1, 1], [2, 2]] })],
            item: Default::default(),
        });
        tile.push(json!({ "type": "LINESTRING", "coordinates": [[0, 0], [1, 1]] }), None);

        let batch = build_batch(&atlas, &IconRegistry::new(), &config, &tile, "any");
        assert_eq!(batch.vertex_count(), 12);
        assert!(batch.lonlat_rotation.chunks_exact(3).all(|c| c[2] == 90.0));
        assert_eq!(&batch.lonlat_rotation[18..20], &[2.0, 2.0]);
    }

    #[test]
    fn east_edge_tile_wraps_western_points() {
        let h = MERCATOR_HALF_WORLD;
        let bounds = TileBounds::new(h - 1000.0, 0.0, h, 1000.0);
        let tile = point_tile(bounds, &[([-h + 100.0, 10.0], None)]);

        let config = PointRendererConfig::default();
        let atlas = TextureAtlas::new(config.atlas);
        let batch = build_batch(&atlas, &IconRegistry::new(), &config, &tile, "any");
        // Stored relative to the tile's west edge at h - 1000.
        assert_eq!(batch.lonlat_rotation[0], 1100.0);

        let config = PointRendererConfig { wrap_dateline: false, ..config };
        let batch = build_batch(&atlas, &IconRegistry::new(), &config, &tile, "any");
        assert_eq!(batch.lonlat_rotation[0], (-h + 100.0 - (h - 1000.0)) as f32);
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    #[test]
    fn render_before_initialize_is_refused() {
        let mut r = PointRenderer::new(PointRendererConfig::default());
        assert!(!r.is_ready());
        let mut out = vec![0u8; r.output_len()];
        let tile = TileData::new(TileBounds::new(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(r.render(&mut out, &tile, &StyleContext::default()), Err(TileError::NotReady)));
        assert!(matches!(r.append_icon("l", 0u64, solid(2, 2, [0; 4])), Err(TileError::NotReady)));
    }

    // ── rendering ─────────────────────────────────────────────────────────

    #[test]
    fn icon_at_tile_center() {
        let Some(mut r) = ready(PointRenderer::new(PointRendererConfig::default())) else { return };
        r.append_icon("ships", 0u64, solid(10, 10, [255, 0, 0, 255])).expect("icon packs").expect("icon fits");

        let tile = point_tile(TileBounds::new(0.0, 0.0, 256.0, 256.0), &[([128.0, 128.0], Some(FilterKey::Index(0)))]);
        let mut out = vec![0u8; r.output_len()];
        r.render(&mut out, &tile, &StyleContext::new("ships")).expect("render");

        assert_eq!(pixel(&out, 256, 128, 128), [255, 0, 0, 255]);
        for (x, y) in [(0, 0), (255, 0), (0, 255), (255, 255)] {
            assert_eq!(pixel(&out, 256, x, y), [0, 0, 0, 0], "corner {x},{y}");
        }
        // Icon is 10 pixels wide.
        assert_eq!(pixel(&out, 256, 128 + 8, 128), [0, 0, 0, 0]);
    }

    #[test]
    fn empty_tile_is_transparent() {
        let Some(mut r) = ready(PointRenderer::new(PointRendererConfig::default())) else { return };
        let mut out = vec![7u8; r.output_len()];
        let tile = TileData::new(TileBounds::new(0.0, 0.0, 256.0, 256.0));
        r.render(&mut out, &tile, &StyleContext::default()).expect("render");
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn short_output_is_refused() {
        let Some(mut r) = ready(PointRenderer::new(PointRendererConfig::default())) else { return };
        let mut out = vec![0u8; 16];
        let tile = TileData::new(TileBounds::new(0.0, 0.0, 256.0, 256.0));
        let Err(TileError::BufferTooSmall { expected, actual }) = r.render(&mut out, &tile, &StyleContext::default())
        else {
            panic!("short buffer refused")
        };
        assert_eq!((expected, actual), (256 * 256 * 4, 16));
    }

    #[test]
    fn styles_map_to_filter_indices() {
        let Some(mut r) = ready(PointRenderer::new(PointRendererConfig::default())) else { return };
        let images = vec![solid(4, 4, [0, 255, 0, 255]), solid(6, 6, [0, 0, 255, 255])];
        assert_eq!(r.append_styles("ships", images).expect("atlas upload"), 2);
        assert!(r.icons().get("ships", Some(&FilterKey::Index(1))).is_some());
        assert!(r.atlas().texture().is_some());

        r.clear_icons().expect("atlas clears");
        assert!(r.icons().is_empty());
        assert!(r.atlas().is_empty());
    }
}
