//! Tile batch data model.
//!
//! A batch arrives as JSON:
//!
//! ```json
//! {
//!   "geoItems": [
//!     { "properties": [1, "name", { "type": "POINT", "coordinates": [x, y] }],
//!       "item": { "currentFilter": 0 } }
//!   ],
//!   "topLeft": { "bounds": { "min": { "x": 0, "y": 0 }, "max": { "x": 1, "y": 1 } } }
//! }
//! ```
//!
//! The geometry is always the last property. Coordinates are projected
//! (web mercator) units.

use std::fmt;

use serde::Deserialize;

use crate::error::{FeatureError, TileError};

/// Half the web mercator world width.
pub const MERCATOR_HALF_WORLD: f64 = 20_037_508.342_789_248;

/// Projected `[x, y]` coordinate.
pub type Position = [f64; 2];

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

/// Projected bounding box of a tile.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
pub struct TileBounds {
    pub min: ProjectedPoint,
    pub max: ProjectedPoint,
}

impl TileBounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min: ProjectedPoint { x: min_x, y: min_y }, max: ProjectedPoint { x: max_x, y: max_y } }
    }

    /// `[minX, minY, 2/(maxX-minX), 2/(maxY-minY)]`: maps the box onto clip
    /// space once shaders subtract the origin, scale and flip Y.
    pub fn extent_params(&self) -> [f32; 4] {
        [
            self.min.x as f32,
            self.min.y as f32,
            (2.0 / (self.max.x - self.min.x)) as f32,
            (2.0 / (self.max.y - self.min.y)) as f32,
        ]
    }

    /// `p` relative to the tile's min corner.
    ///
    /// The subtraction happens in `f64`, so web mercator coordinates near
    /// the world edge keep sub-metre precision once narrowed to `f32`.
    pub fn to_local(&self, p: Position) -> [f32; 2] {
        [(p[0] - self.min.x) as f32, (p[1] - self.min.y) as f32]
    }

    /// `extent_params` for coordinates already passed through `to_local`.
    pub fn local_extent_params(&self) -> [f32; 4] {
        let [_, _, sx, sy] = self.extent_params();
        [0.0, 0.0, sx, sy]
    }

    /// Whether the tile sits on the eastern edge of the world.
    pub fn touches_east_edge(&self) -> bool {
        self.max.x == MERCATOR_HALF_WORLD
    }

    /// Whether the tile sits on the western edge of the world.
    pub fn touches_west_edge(&self) -> bool {
        self.min.x == -MERCATOR_HALF_WORLD
    }

    /// Moves `x` across the date line so features of an edge tile that wrap
    /// around the world land next to it. A tile spanning both edges keeps
    /// every coordinate as is.
    pub fn wrap_x(&self, x: f64) -> f64 {
        match (self.touches_east_edge(), self.touches_west_edge()) {
            (true, false) if x < 0.0 => MERCATOR_HALF_WORLD + (x + MERCATOR_HALF_WORLD),
            (false, true) if x > 0.0 => -MERCATOR_HALF_WORLD - (MERCATOR_HALF_WORLD - x),
            _ => x,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
pub struct TopLeft {
    pub bounds: TileBounds,
}

/// Style selector of a feature: an index into a layer's style list, or a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum FilterKey {
    Index(u64),
    Name(String),
}

impl From<u64> for FilterKey {
    fn from(v: u64) -> Self {
        FilterKey::Index(v)
    }
}

impl From<&str> for FilterKey {
    fn from(v: &str) -> Self {
        FilterKey::Name(v.to_owned())
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKey::Index(i) => write!(f, "#{i}"),
            FilterKey::Name(n) => f.write_str(n),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInfo {
    #[serde(default)]
    pub current_filter: Option<FilterKey>,
}

/// One feature of a batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeoItem {
    pub properties: Vec<serde_json::Value>,
    #[serde(default)]
    pub item: ItemInfo,
}

impl GeoItem {
    /// Parses the geometry carried by the last property.
    pub fn geometry(&self) -> Result<Geometry, FeatureError> {
        let Some(last) = self.properties.last() else { return Err(FeatureError::MissingGeometry) };
        Ok(Geometry::deserialize(last)?)
    }

    pub fn filter(&self) -> Option<&FilterKey> {
        self.item.current_filter.as_ref()
    }

    /// Numeric property, e.g. a rotation in degrees.
    pub fn number(&self, index: usize) -> Option<f64> {
        self.properties.get(index).and_then(serde_json::Value::as_f64)
    }
}

/// Feature geometry in projected coordinates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "coordinates", rename_all = "UPPERCASE")]
pub enum Geometry {
    #[serde(alias = "Point")]
    Point(Position),
    #[serde(alias = "MultiPoint")]
    MultiPoint(Vec<Position>),
    #[serde(alias = "LineString")]
    LineString(Vec<Position>),
    #[serde(alias = "MultiLineString")]
    MultiLineString(Vec<Vec<Position>>),
    /// Outer ring followed by holes.
    #[serde(alias = "Polygon")]
    Polygon(Vec<Vec<Position>>),
    #[serde(alias = "MultiPolygon")]
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "POINT",
            Geometry::MultiPoint(_) => "MULTIPOINT",
            Geometry::LineString(_) => "LINESTRING",
            Geometry::MultiLineString(_) => "MULTILINESTRING",
            Geometry::Polygon(_) => "POLYGON",
            Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        }
    }
}

/// One tile's features plus its projected bounds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileData {
    #[serde(default)]
    pub geo_items: Vec<GeoItem>,
    pub top_left: TopLeft,
}

impl TileData {
    pub fn new(bounds: TileBounds) -> Self {
        Self { geo_items: Vec::new(), top_left: TopLeft { bounds } }
    }

    pub fn from_json(json: &str) -> Result<Self, TileError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Appends a feature whose only property is its geometry.
    pub fn push(&mut self, geometry: serde_json::Value, filter: Option<FilterKey>) {
        self.geo_items.push(GeoItem { properties: vec![geometry], item: ItemInfo { current_filter: filter } });
    }

    pub fn bounds(&self) -> &TileBounds {
        &self.top_left.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.geo_items.is_empty()
    }

    /// Features with a parseable geometry. The rest are logged and skipped.
    pub fn features(&self) -> impl Iterator<Item = (&GeoItem, Geometry)> + '_ {
        self.geo_items.iter().enumerate().filter_map(|(i, item)| match item.geometry() {
            Ok(geometry) => Some((item, geometry)),
            Err(err) => {
                log::debug!("skipping feature {i}: {err}");
                None
            }
        })
    }
}
