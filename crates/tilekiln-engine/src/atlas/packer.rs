use std::collections::HashMap;

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::atlas::node::{AtlasRect, PackTree};
use crate::device::GpuContext;
use crate::error::GpuResult;
use crate::ids::{IdAllocator, ImageId, TextureId};
use crate::resource::TextureFilter;

/// Size and padding of an atlas.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AtlasConfig {
    pub width: u32,
    pub height: u32,
    /// Padding around every image, split evenly between both sides.
    pub border: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self { width: 1024, height: 1024, border: 4 }
    }
}

/// An image queued for packing.
#[derive(Debug, Clone)]
pub struct AtlasImage {
    pub pixels: RgbaImage,
    /// Size the image is drawn at inside the atlas. Defaults to its own size.
    pub atlas_size: Option<(u32, u32)>,
}

impl AtlasImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels, atlas_size: None }
    }

    pub fn with_atlas_size(mut self, width: u32, height: u32) -> Self {
        self.atlas_size = Some((width, height));
        self
    }

    /// Drawn size inside the atlas.
    pub fn size(&self) -> (u32, u32) {
        self.atlas_size.unwrap_or_else(|| self.pixels.dimensions())
    }
}

/// Where a packed image ended up.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AtlasPlacement {
    /// Cell including the border.
    pub rect: AtlasRect,
    /// Two triangles of a quad: (l,t) (l,b) (r,b) (r,b) (r,t) (l,t), normalized.
    pub tex_coords: [f32; 12],
}

/// Packs many small images into one texture.
///
/// Images are kept in insertion order. A full repack sorts them by size,
/// clears the canvas and rebuilds the packing tree; a fast insert only adds
/// the newest image to the existing tree. An image that does not fit stays
/// known to the atlas but has no placement.
pub struct TextureAtlas {
    config: AtlasConfig,
    canvas: RgbaImage,
    images: Vec<(ImageId, AtlasImage)>,
    tree: Option<PackTree>,
    placements: HashMap<ImageId, AtlasPlacement>,
    texture: Option<TextureId>,
}

impl TextureAtlas {
    pub fn new(config: AtlasConfig) -> Self {
        Self {
            config,
            canvas: RgbaImage::new(config.width, config.height),
            images: Vec::new(),
            tree: None,
            placements: HashMap::new(),
            texture: None,
        }
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// Backing pixels.
    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Texture created by the last `create_texture`.
    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Adds an image and packs it.
    ///
    /// Returns `None` for an empty image (not stored) or when the image does
    /// not fit (stored, retried on the next full repack).
    pub fn add_image(
        &mut self,
        ids: &mut IdAllocator,
        image: AtlasImage,
        fast_insert: bool,
    ) -> Option<(ImageId, AtlasPlacement)> {
        let (w, h) = image.size();
        if w == 0 || h == 0 {
            log::debug!("atlas: ignoring empty image");
            return None;
        }

        let id: ImageId = ids.next();
        self.images.push((id, image));
        self.make_atlas(fast_insert);

        let placement = self.placements.get(&id).copied();
        if placement.is_none() {
            log::debug!(
                "atlas: {id} ({w}x{h}) does not fit {}x{}",
                self.config.width,
                self.config.height
            );
        }
        placement.map(|p| (id, p))
    }

    pub fn tex_coords(&self, id: ImageId) -> Option<[f32; 12]> {
        self.placements.get(&id).map(|p| p.tex_coords)
    }

    pub fn rect(&self, id: ImageId) -> Option<AtlasRect> {
        self.placements.get(&id).map(|p| p.rect)
    }

    pub fn placements(&self) -> impl Iterator<Item = (ImageId, &AtlasPlacement)> + '_ {
        self.placements.iter().map(|(id, p)| (*id, p))
    }

    /// Forgets every image and clears the canvas. The texture is kept.
    pub fn remove_all(&mut self) {
        self.images.clear();
        self.placements.clear();
        self.tree = None;
        clear_canvas(&mut self.canvas);
    }

    /// Forgets every image and re-uploads the empty canvas.
    pub fn clear(&mut self, ctx: &mut GpuContext) -> GpuResult<()> {
        self.remove_all();
        self.create_texture(ctx).map(|_| ())
    }

    /// Uploads the canvas as a mipmapped texture, deleting the previous one.
    pub fn create_texture(&mut self, ctx: &mut GpuContext) -> GpuResult<TextureId> {
        if let Some(old) = self.texture.take() {
            ctx.delete_texture(old);
        }
        let id = ctx.create_texture(&self.canvas, TextureFilter::Mipmap)?;
        self.texture = Some(id);
        Ok(id)
    }

    fn make_atlas(&mut self, fast_insert: bool) {
        if fast_insert && let Some(tree) = self.tree.as_mut() {
            if let Some((id, image)) = self.images.last() {
                place(tree, &mut self.canvas, &self.config, &mut self.placements, *id, image);
            }
            return;
        }

        let mut order: Vec<usize> = (0..self.images.len()).collect();
        order.sort_by(|&a, &b| {
            let (aw, ah) = self.images[a].1.size();
            let (bw, bh) = self.images[b].1.size();
            bw.cmp(&aw).then(bh.cmp(&ah))
        });

        let mut tree = PackTree::new(self.config.width, self.config.height);
        clear_canvas(&mut self.canvas);
        let mut placements = HashMap::with_capacity(self.images.len());
        for i in order {
            let (id, image) = &self.images[i];
            place(&mut tree, &mut self.canvas, &self.config, &mut placements, *id, image);
        }
        self.placements = placements;
        self.tree = Some(tree);
    }
}

fn clear_canvas(canvas: &mut RgbaImage) {
    for px in canvas.pixels_mut() {
        *px = image::Rgba([0, 0, 0, 0]);
    }
}

/// Inserts one image into the tree and draws it at its cell.
fn place(
    tree: &mut PackTree,
    canvas: &mut RgbaImage,
    config: &AtlasConfig,
    placements: &mut HashMap<ImageId, AtlasPlacement>,
    id: ImageId,
    image: &AtlasImage,
) {
    let (w, h) = image.size();
    let Some(leaf) = tree.insert(id, w + config.border, h + config.border) else { return };
    let rect = tree.node(leaf).rect;
    let bs = (config.border as f32 * 0.5).round() as u32;

    if image.pixels.dimensions() == (w, h) {
        imageops::replace(canvas, &image.pixels, (rect.left + bs) as i64, (rect.top + bs) as i64);
    } else {
        let scaled = imageops::resize(&image.pixels, w, h, FilterType::Triangle);
        imageops::replace(canvas, &scaled, (rect.left + bs) as i64, (rect.top + bs) as i64);
    }

    placements.insert(id, AtlasPlacement { rect, tex_coords: tex_coords(rect, bs, config) });
}

fn tex_coords(r: AtlasRect, bs: u32, config: &AtlasConfig) -> [f32; 12] {
    let w = config.width as f32;
    let h = config.height as f32;
    let l = (r.left + bs) as f32 / w;
    let t = (r.top + bs) as f32 / h;
    let rt = (r.right - bs) as f32 / w;
    let b = (r.bottom - bs) as f32 / h;
    [l, t, l, b, rt, b, rt, b, rt, t, l, t]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, v: u8) -> AtlasImage {
        AtlasImage::new(RgbaImage::from_pixel(w, h, image::Rgba([v, v, v, 255])))
    }

    fn small_atlas() -> TextureAtlas {
        TextureAtlas::new(AtlasConfig { width: 64, height: 64, border: 4 })
    }

    // ── packing ───────────────────────────────────────────────────────────

    #[test]
    fn single_image_lands_inside_border() {
        let mut ids = IdAllocator::new();
        let mut atlas = small_atlas();
        let (id, placement) = atlas.add_image(&mut ids, solid(10, 10, 200), false).expect("fits");
        assert_eq!(placement.rect, AtlasRect::new(0, 0, 14, 14));
        assert_eq!(atlas.canvas().get_pixel(2, 2).0, [200, 200, 200, 255]);
        assert_eq!(atlas.canvas().get_pixel(1, 1).0, [0, 0, 0, 0]);
        assert_eq!(atlas.canvas().get_pixel(12, 12).0, [0, 0, 0, 0]);

        let tc = atlas.tex_coords(id).expect("placed");
        let (lo, hi) = (2.0 / 64.0, 12.0 / 64.0);
        assert_eq!(tc, [lo, lo, lo, hi, hi, hi, hi, hi, hi, lo, lo, lo]);
    }

    #[test]
    fn full_repack_is_idempotent() {
        let mut ids = IdAllocator::new();
        let mut atlas = small_atlas();
        let mut added = Vec::new();
        for (w, h) in [(6, 10), (12, 4), (8, 8), (3, 3)] {
            if let Some((id, _)) = atlas.add_image(&mut ids, solid(w, h, 90), false) {
                added.push(id);
            }
        }
        let before: Vec<_> = added.iter().map(|id| atlas.tex_coords(*id)).collect();
        atlas.make_atlas(false);
        let after: Vec<_> = added.iter().map(|id| atlas.tex_coords(*id)).collect();
        assert_eq!(before, after);
        assert_eq!(added.len(), 4);
    }

    #[test]
    fn repack_orders_largest_width_first() {
        let mut ids = IdAllocator::new();
        let mut atlas = small_atlas();
        let (small, _) = atlas.add_image(&mut ids, solid(4, 4, 1), false).expect("fits");
        let (wide, _) = atlas.add_image(&mut ids, solid(20, 4, 2), false).expect("fits");
        assert_eq!(atlas.rect(wide).map(|r| (r.left, r.top)), Some((0, 0)));
        assert_ne!(atlas.rect(small).map(|r| (r.left, r.top)), Some((0, 0)));
    }

    #[test]
    fn packed_cells_are_disjoint() {
        let mut ids = IdAllocator::new();
        let mut atlas = small_atlas();
        for (i, (w, h)) in [(10, 10), (5, 20), (20, 5), (7, 7), (12, 3), (3, 12), (9, 9)].into_iter().enumerate() {
            atlas.add_image(&mut ids, solid(w, h, i as u8), false);
        }
        let rects: Vec<AtlasRect> = atlas.placements().map(|(_, p)| p.rect).collect();
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                assert!(!a.intersects(b), "{a:?} and {b:?} overlap");
            }
        }
    }

    #[test]
    fn oversize_image_is_not_placed() {
        let mut ids = IdAllocator::new();
        let mut atlas = small_atlas();
        assert!(atlas.add_image(&mut ids, solid(64, 8, 1), false).is_none());
        assert_eq!(atlas.len(), 1);
        assert!(atlas.add_image(&mut ids, AtlasImage::new(RgbaImage::new(0, 4)), false).is_none());
        assert_eq!(atlas.len(), 1);
    }

    // ── fast insert ───────────────────────────────────────────────────────

    #[test]
    fn fast_insert_keeps_existing_placements() {
        let mut ids = IdAllocator::new();
        let mut atlas = small_atlas();
        let (first, p1) = atlas.add_image(&mut ids, solid(4, 4, 1), false).expect("fits");
        let (_, p2) = atlas.add_image(&mut ids, solid(20, 20, 2), true).expect("fits");
        // A full repack would have moved the larger image to the origin.
        assert_eq!(atlas.rect(first), Some(p1.rect));
        assert!(!p1.rect.intersects(&p2.rect));
    }

    #[test]
    fn fast_insert_without_tree_repacks() {
        let mut ids = IdAllocator::new();
        let mut atlas = small_atlas();
        let (_, p) = atlas.add_image(&mut ids, solid(4, 4, 1), true).expect("fits");
        assert_eq!(p.rect, AtlasRect::new(0, 0, 8, 8));
    }

    #[test]
    fn atlas_size_scales_the_drawn_image() {
        let mut ids = IdAllocator::new();
        let mut atlas = small_atlas();
        let image = solid(2, 2, 77).with_atlas_size(6, 6);
        let (_, p) = atlas.add_image(&mut ids, image, false).expect("fits");
        assert_eq!((p.rect.width(), p.rect.height()), (10, 10));
        assert_eq!(atlas.canvas().get_pixel(7, 7).0, [77, 77, 77, 255]);
    }

    #[test]
    fn remove_all_forgets_images() {
        let mut ids = IdAllocator::new();
        let mut atlas = small_atlas();
        let (id, _) = atlas.add_image(&mut ids, solid(4, 4, 9), false).expect("fits");
        atlas.remove_all();
        assert!(atlas.is_empty());
        assert_eq!(atlas.tex_coords(id), None);
        assert!(atlas.canvas().pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    // ── texture ───────────────────────────────────────────────────────────

    #[test]
    fn create_texture_replaces_previous() {
        let Some(mut ctx) = crate::testing::gpu_context(4, 4) else { return };
        let mut atlas = small_atlas();
        let first = atlas.create_texture(&mut ctx).expect("upload");
        let second = atlas.create_texture(&mut ctx).expect("upload");
        assert_ne!(first, second);
        assert!(ctx.texture_info(first).is_none());
        let info = ctx.texture_info(second).expect("registered");
        assert_eq!(info.filter, TextureFilter::Mipmap);
        assert_eq!(info.mip_levels, 7);
    }
}
