//! Filled polygons.

use tilekiln_engine::coords::ColorRgba;
use tilekiln_engine::shader::{DrawMode, ProgramDesc, Value, VarKind};

use crate::earcut;
use crate::error::TileError;
use crate::features::{Geometry, Position, TileBounds, TileData};
use crate::renderer::common::Surface;
use crate::renderer::{StyleContext, TileRenderer};

const PROGRAM: &str = "polygon";
const SHADER: &str = include_str!("shaders/polygon.wgsl");

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PolygonRendererConfig {
    pub target_size: (u32, u32),
    pub fill: ColorRgba,
}

impl Default for PolygonRendererConfig {
    fn default() -> Self {
        Self { target_size: (256, 256), fill: ColorRgba::new(1.0, 0.0, 0.0, 0.5) }
    }
}

/// Triangulated polygons of one tile.
#[derive(Debug, Clone, Default, PartialEq)]
struct PolygonMesh {
    /// `x, y` per vertex.
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl PolygonMesh {
    fn vertex_count(&self) -> u32 {
        (self.vertices.len() / 2) as u32
    }

    /// Triangulates one polygon (outer ring, then holes) into the mesh,
    /// storing vertices relative to the tile's min corner.
    fn append(&mut self, rings: &[Vec<Position>], bounds: &TileBounds) {
        let flat = earcut::flatten(rings);
        let triangles = earcut::earcut(&flat.vertices, &flat.holes, 2);
        if triangles.is_empty() {
            log::debug!("polygon renderer: ring of {} vertices has no triangles", flat.vertex_count());
            return;
        }
        let base = self.vertex_count();
        self.indices.extend(triangles.iter().map(|i| i + base));
        for xy in flat.vertices.chunks_exact(2) {
            self.vertices.extend(bounds.to_local([xy[0], xy[1]]));
        }
    }
}

fn build_mesh(tile: &TileData) -> PolygonMesh {
    let mut mesh = PolygonMesh::default();
    let bounds = tile.bounds();
    for (_, geometry) in tile.features() {
        match geometry {
            Geometry::Polygon(rings) => mesh.append(&rings, bounds),
            Geometry::MultiPolygon(polygons) => {
                for rings in &polygons {
                    mesh.append(rings, bounds);
                }
            }
            other => log::debug!("polygon renderer: ignoring {} feature", other.kind()),
        }
    }
    mesh
}

/// Fills POLYGON and MULTIPOLYGON features with one color.
pub struct PolygonRenderer {
    config: PolygonRendererConfig,
    surface: Option<Surface>,
}

impl PolygonRenderer {
    pub fn new(config: PolygonRendererConfig) -> Self {
        Self { config, surface: None }
    }

    pub fn config(&self) -> &PolygonRendererConfig {
        &self.config
    }

    pub fn set_fill(&mut self, fill: ColorRgba) {
        self.config.fill = fill;
    }

    fn program_desc() -> ProgramDesc {
        ProgramDesc::new(PROGRAM)
            .attribute("coordinates", VarKind::Vec2)
            .uniform("extentParams", VarKind::Vec4)
            .uniform("color", VarKind::Vec4)
            .vertex_shader(SHADER)
            .fragment_shader(SHADER)
    }
}

impl TileRenderer for PolygonRenderer {
    fn initialize(&mut self) -> bool {
        if self.surface.is_none() {
            let (w, h) = self.config.target_size;
            self.surface = Surface::create_logged("polygon", w, h, Self::program_desc());
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

        let mesh = build_mesh(tile);
        let buffers = if mesh.indices.is_empty() {
            None
        } else {
            Some((surface.upload_vertices(&mesh.vertices, 2)?, surface.upload_indices(&mesh.indices)?))
        };

        let extent = tile.bounds().local_extent_params();
        let color = self.config.fill.to_array();

        surface.run(out, |program| {
            let Some((vertices, indices)) = buffers else { return Ok(()) };
            program.set(&[
                ("extentParams", Value::Vec4(extent)),
                ("color", Value::Vec4(color)),
                ("coordinates", Value::buffer(vertices)),
            ]);
            program.draw_indexed(DrawMode::Triangles, indices)
        })
    }
}
