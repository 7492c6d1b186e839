//! Stroked lines and polygon outlines.

use tilekiln_engine::coords::ColorRgba;
use tilekiln_engine::shader::{DrawMode, ProgramDesc, Value, VarKind};

use crate::error::TileError;
use crate::features::{Geometry, TileData};
use crate::line::{CURRENT_OFFSET, LineGeometry, NEXT_OFFSET, PREV_OFFSET};
use crate::renderer::common::Surface;
use crate::renderer::{StyleContext, TileRenderer};

const PROGRAM: &str = "polyline";
const SHADER: &str = include_str!("shaders/polyline.wgsl");

/// `(thicknessOutline, alpha)` of the feathered pass and the exact pass
/// drawn for every width tier.
const PASSES: [(f32, f32); 2] = [(2.0, 0.54), (1.0, 1.0)];

/// Two-tier stroke: a wide outline under a narrower line.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineStyle {
    pub outline_width: f32,
    pub outline_color: ColorRgba,
    pub line_width: f32,
    pub line_color: ColorRgba,
}

impl Default for LineStyle {
    fn default() -> Self {
        Self {
            outline_width: 4.0,
            outline_color: ColorRgba::white(),
            line_width: 2.0,
            line_color: ColorRgba::new(1.0, 0.0, 0.0, 1.0),
        }
    }
}

impl LineStyle {
    /// Width tiers in draw order.
    fn tiers(&self) -> [(f32, ColorRgba); 2] {
        [(self.outline_width, self.outline_color), (self.line_width, self.line_color)]
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PolylineRendererConfig {
    pub target_size: (u32, u32),
    pub style: LineStyle,
}

impl Default for PolylineRendererConfig {
    fn default() -> Self {
        Self { target_size: (256, 256), style: LineStyle::default() }
    }
}

/// Strip geometry of every line and ring in `tile`.
fn build_lines(tile: &TileData) -> LineGeometry {
    let bounds = tile.bounds();
    let mut lines = LineGeometry::with_origin([bounds.min.x, bounds.min.y]);
    for (_, geometry) in tile.features() {
        match geometry {
            Geometry::LineString(path) => {
                lines.append_path(&path, false);
            }
            Geometry::MultiLineString(paths) => {
                lines.append_paths(&paths, false);
            }
            Geometry::Polygon(rings) => {
                lines.append_paths(&rings, true);
            }
            Geometry::MultiPolygon(polygons) => {
                for rings in &polygons {
                    lines.append_paths(rings, true);
                }
            }
            other => log::debug!("polyline renderer: ignoring {} feature", other.kind()),
        }
    }
    lines
}

/// Strokes LINESTRING features and the rings of polygon features.
pub struct PolylineRenderer {
    config: PolylineRendererConfig,
    surface: Option<Surface>,
}

impl PolylineRenderer {
    pub fn new(config: PolylineRendererConfig) -> Self {
        Self { config, surface: None }
    }

    pub fn config(&self) -> &PolylineRendererConfig {
        &self.config
    }

    pub fn set_style(&mut self, style: LineStyle) {
        self.config.style = style;
    }

    fn program_desc() -> ProgramDesc {
        ProgramDesc::new(PROGRAM)
            .attribute("prev", VarKind::Vec2)
            .attribute("current", VarKind::Vec2)
            .attribute("next", VarKind::Vec2)
            .attribute("order", VarKind::Float)
            .uniform("extentParams", VarKind::Vec4)
            .uniform("viewport", VarKind::Vec2)
            .uniform("thickness", VarKind::Float)
            .uniform("thicknessOutline", VarKind::Float)
            .uniform("color", VarKind::Vec4)
            .uniform("alpha", VarKind::Float)
            .vertex_shader(SHADER)
            .fragment_shader(SHADER)
    }
}

impl TileRenderer for PolylineRenderer {
    fn initialize(&mut self) -> bool {
        if self.surface.is_none() {
            let (w, h) = self.config.target_size;
            self.surface = Surface::create_logged("polyline", w, h, Self::program_desc());
        }
        self.is_ready()
    }

    fn is_ready(&self) -> bool {
        self.surface.is_some()
    }

    fn size(&self) -> (u32, u32) {
        self.config.target_size
    }

    fn render(&mut self, out: &mut [u8], tile: &TileData, _style: &StyleContext) -> Result<(), TileError> {
        let Some(surface) = self.surface.as_mut() else { return Err(TileError::NotReady) };

        let lines = build_lines(tile);
        let buffers = if lines.is_empty() {
            None
        } else {
            Some((
                surface.upload_vertices(&lines.vertices, 2)?,
                surface.upload_vertices(&lines.orders, 1)?,
                surface.upload_indices(&lines.indices)?,
            ))
        };

        let (w, h) = surface.size();
        let extent = tile.bounds().local_extent_params();
        let tiers = self.config.style.tiers();

        surface.run(out, |program| {
            let Some((vertices, orders, indices)) = buffers else { return Ok(()) };
            program.set(&[
                ("extentParams", Value::Vec4(extent)),
                ("viewport", Value::Vec2([w as f32, h as f32])),
                ("prev", Value::buffer_at(vertices, PREV_OFFSET)),
                ("current", Value::buffer_at(vertices, CURRENT_OFFSET)),
                ("next", Value::buffer_at(vertices, NEXT_OFFSET)),
                ("order", Value::buffer(orders)),
            ]);

            for (width, color) in tiers {
                if width <= 0.0 {
                    continue;
                }
                program.apply("thickness", Value::Float(width));
                program.apply("color", Value::Vec4(color.to_array()));
                for (outline, alpha) in PASSES {
                    program.apply("thicknessOutline", Value::Float(outline));
                    program.apply("alpha", Value::Float(alpha));
                    program.draw_indexed(DrawMode::TriangleStrip, indices)?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::features::TileBounds;
    use crate::testing::{pixel, ready};

    // ── strip building ────────────────────────────────────────────────────

    #[test]
    fn lines_open_and_rings_closed() {
        let mut tile = TileData::new(TileBounds::new(0.0, 0.0, 10.0, 10.0));
        tile.push(json!({ "type": "LINESTRING", "coordinates": [[0, 0], [1, 0], [2, 1]] }), None);
        let open = build_lines(&tile);
        // Mirrored end points.
        assert_eq!(&open.vertices[..2], &[-1.0, 0.0]);
        assert_eq!(&open.vertices[open.vertices.len() - 2..], &[3.0, 2.0]);

        let mut tile = TileData::new(TileBounds::new(0.0, 0.0, 10.0, 10.0));
        tile.push(
            json!({ "type": "POLYGON", "coordinates": [[[0, 0], [4, 0], [4, 4], [0, 0]], [[1, 1], [2, 1], [2, 2], [1, 1]]] }),
            None,
        );
        let closed = build_lines(&tile);
        // Two rings of three points, each with before/after blocks.
        assert_eq!(closed.vertex_count(), 2 * 5 * 4);
        assert_eq!(&closed.vertices[..2], &[4.0, 4.0]);
    }

    #[test]
    fn multi_geometries_and_points() {
        let mut tile = TileData::new(TileBounds::new(0.0, 0.0, 10.0, 10.0));
        tile.push(json!({ "type": "MULTILINESTRING", "coordinates": [[[0, 0], [1, 1]], [[5, 5]]] }), None);
        tile.push(
            json!({ "type": "MULTIPOLYGON", "coordinates": [[[[0, 0], [1, 0], [1, 1], [0, 0]]]] }),
            None,
        );
        tile.push(json!({ "type": "POINT", "coordinates": [3, 3] }), None);

        let lines = build_lines(&tile);
        // One kept path of 2 points, one ring of 3.
        assert_eq!(lines.vertex_count(), (4 + 5) * 4);
    }

    // ── rendering ─────────────────────────────────────────────────────────

    #[test]
    fn horizontal_line_crosses_center() {
        let style = LineStyle {
            outline_width: 0.0,
            line_width: 8.0,
            line_color: ColorRgba::new(0.0, 1.0, 0.0, 1.0),
            ..LineStyle::default()
        };
        let config = PolylineRendererConfig { style, ..PolylineRendererConfig::default() };
        let Some(mut r) = ready(PolylineRenderer::new(config)) else { return };

        let mut tile = TileData::new(TileBounds::new(0.0, 0.0, 256.0, 256.0));
        tile.push(json!({ "type": "LINESTRING", "coordinates": [[16, 128], [240, 128]] }), None);

        let mut out = vec![0u8; r.output_len()];
        r.render(&mut out, &tile, &StyleContext::default()).expect("render");
        assert_eq!(pixel(&out, 256, 128, 128), [0, 255, 0, 255]);
        assert_eq!(pixel(&out, 256, 128, 100), [0, 0, 0, 0]);
        for (x, y) in [(0, 0), (255, 0), (0, 255), (255, 255)] {
            assert_eq!(pixel(&out, 256, x, y), [0, 0, 0, 0], "corner {x},{y}");
        }
    }

    #[test]
    fn empty_tile_is_transparent() {
        let Some(mut r) = ready(PolylineRenderer::new(PolylineRendererConfig::default())) else { return };
        let mut out = vec![1u8; r.output_len()];
        let tile = TileData::new(TileBounds::new(0.0, 0.0, 256.0, 256.0));
        r.render(&mut out, &tile, &StyleContext::default()).expect("render");
        assert!(out.iter().all(|&b| b == 0));
    }
}
