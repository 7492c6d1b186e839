//! Polyline strip geometry.
//!
//! Every path point is emitted as four vertices tagged with an order
//! (`+1`, `-1`, `+2`, `-2`). The vertex buffer is read three times at
//! different byte offsets so each drawn vertex sees its previous, current
//! and next point; a virtual point before the first and after the last
//! vertex gives the path ends a neighbor on both sides. Paths are joined
//! into one triangle strip with repeated "bridge" indices.

use tilekiln_engine::coords::Vec2;

use crate::features::Position;

/// Order tags of the four vertices emitted per point.
pub const ORDERS: [f32; 4] = [1.0, -1.0, 2.0, -2.0];

/// Byte offsets of the `prev`, `current` and `next` attribute views into the
/// vertex buffer (stride 8, one point block is 32 bytes).
pub const PREV_OFFSET: u64 = 0;
pub const CURRENT_OFFSET: u64 = 32;
pub const NEXT_OFFSET: u64 = 64;

/// Strip geometry of every path appended so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineGeometry {
    /// `x, y` per vertex.
    pub vertices: Vec<f32>,
    /// One order tag per vertex.
    pub orders: Vec<f32>,
    pub indices: Vec<u32>,
    next_start: u32,
    /// Subtracted from every point before narrowing to `f32`.
    origin: Position,
}

impl LineGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Geometry whose vertices are stored relative to `origin`.
    pub fn with_origin(origin: Position) -> Self {
        Self { origin, ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.orders.len()
    }

    /// Appends one path. A closed path that repeats its first point at the
    /// end has the duplicate dropped. Returns `false` for paths with fewer
    /// than two distinct points, which add nothing.
    pub fn append_path(&mut self, path: &[Position], closed: bool) -> bool {
        let path = match path {
            [first, .., last] if closed && first == last => &path[..path.len() - 1],
            _ => path,
        };
        if path.len() < 2 {
            log::debug!("line: skipping path with {} point(s)", path.len());
            return false;
        }

        let start = self.next_start;
        self.indices.extend([start, start]);

        let n = path.len();
        let before = if closed { path[n - 1] } else { mirror(path[0], path[1]) };
        self.push_point(before);

        let mut index = start;
        for &p in path {
            self.push_point(p);
            self.indices.extend([index, index + 1, index + 2, index + 3]);
            index += 4;
        }

        let after = if closed {
            self.indices.extend([start, start + 1, start + 1, start + 1]);
            path[0]
        } else {
            self.indices.extend([index - 1; 4]);
            mirror(path[n - 1], path[n - 2])
        };
        self.push_point(after);

        self.next_start = index + 8;
        true
    }

    /// Appends several paths; returns how many were kept.
    pub fn append_paths<'a>(&mut self, paths: impl IntoIterator<Item = &'a Vec<Position>>, closed: bool) -> usize {
        paths.into_iter().filter(|p| self.append_path(p, closed)).count()
    }

    fn push_point(&mut self, p: Position) {
        let (x, y) = ((p[0] - self.origin[0]) as f32, (p[1] - self.origin[1]) as f32);
        for order in ORDERS {
            self.vertices.extend([x, y]);
            self.orders.push(order);
        }
    }
}

/// `2 * p - q`: `q` mirrored across `p`.
fn mirror(p: Position, q: Position) -> Position {
    [p[0] + p[0] - q[0], p[1] + p[1] - q[1]]
}

// ── join resolution ───────────────────────────────────────────────────────

/// Which branch placed a strip vertex.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JoinKind {
    /// Neighbors on the same side: offset along the previous edge normal.
    Colinear,
    /// Intersection of both offset edges.
    Miter,
    /// Sharp turn whose miter pointed backwards; replaced by an edge normal.
    SharpTurn,
    /// Miter longer than the shorter adjacent segment; next-edge normal.
    Bevel,
}

/// Uniform inputs of the line vertex stage.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct JoinParams {
    pub extent: [f32; 4],
    pub viewport: Vec2,
    pub thickness: f32,
    pub thickness_outline: f32,
}

/// Projected coordinate to clip space, north up.
pub fn project(extent: [f32; 4], c: Vec2) -> Vec2 {
    let origin = Vec2::new(extent[0], extent[1]);
    let scale = Vec2::new(extent[2], extent[3]);
    let p = Vec2::new(-1.0, -1.0) + (c - origin).mul_elem(scale);
    Vec2::new(p.x, -p.y)
}

/// Clip-space position the line shader gives a strip vertex.
pub fn resolve_join(prev: Vec2, current: Vec2, next: Vec2, order: f32, params: &JoinParams) -> (JoinKind, Vec2) {
    let mut prv = prev;
    let mut nxt = next;
    if prev == current {
        if next == current {
            nxt = current + Vec2::new(1.0, 0.0);
            prv = current - next;
        } else {
            prv = current + (current - next).normalize();
        }
    }
    if next == current {
        nxt = current + (current - prv).normalize();
    }

    let s_next = project(params.extent, nxt);
    let s_current = project(params.extent, current);
    let s_prev = project(params.extent, prv);
    let dir_next = (s_next - s_current).normalize();
    let dir_prev = (s_prev - s_current).normalize();
    let dot_np = dir_next.dot(dir_prev);

    let normal_next = Vec2::new(-dir_next.y, dir_next.x).normalize();
    let normal_prev = Vec2::new(dir_prev.y, -dir_prev.x).normalize();
    let half = (params.thickness + params.thickness_outline) * 0.5 * sign(order);
    let d = Vec2::new(half, half).div_elem(params.viewport);

    if dot_np >= 0.99991 {
        return (JoinKind::Colinear, s_current - normal_prev.mul_elem(d));
    }

    let dir = normal_prev + normal_next;
    let m = s_current + dir.mul_elem(d) / dir_next.cross(dir);

    if dot_np > 0.5 && (dir_next + dir_prev).dot(m - s_current) < 0.0 {
        let occw = order * sign(dir_next.cross(dir_prev));
        let m = match occw {
            -1.0 | 2.0 => s_current + normal_prev.mul_elem(d),
            1.0 | -2.0 => s_current + normal_next.mul_elem(d),
            _ => m,
        };
        return (JoinKind::SharpTurn, m);
    }
    if s_current.distance(m) > s_current.distance(s_next).min(s_current.distance(s_prev)) {
        return (JoinKind::Bevel, s_current + normal_next.mul_elem(d));
    }
    (JoinKind::Miter, m)
}

/// Shader `sign`: zero stays zero.
fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn params() -> JoinParams {
        // Identity extent: project((x, y)) == (x, -y).
        JoinParams { extent: [-1.0, -1.0, 1.0, 1.0], viewport: Vec2::new(1.0, 1.0), thickness: 0.2, thickness_outline: 0.0 }
    }

    fn close(a: Vec2, b: Vec2) -> bool {
        a.distance(b) < EPS
    }

    fn v(x: f32, y: f32) -> Vec2 {
        Vec2::new(x, y)
    }

    // ── strip layout ──────────────────────────────────────────────────────

    #[test]
    fn open_path_layout() {
        let mut g = LineGeometry::new();
        assert!(g.append_path(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]], false));

        // before + 3 points + after, four vertices each.
        assert_eq!(g.vertex_count(), 5 * 4);
        assert_eq!(g.vertices.len(), 5 * 4 * 2);
        assert_eq!(&g.orders[..4], &ORDERS);
        assert_eq!(&g.vertices[..2], &[-1.0, 0.0]);
        assert_eq!(&g.vertices[g.vertices.len() - 2..], &[1.0, 2.0]);

        let expected: Vec<u32> = [0, 0].into_iter().chain(0..12).chain([11; 4]).collect();
        assert_eq!(g.indices, expected);
    }

    #[test]
    fn closed_path_wraps_around() {
        let mut g = LineGeometry::new();
        let ring = [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 0.0]];
        assert!(g.append_path(&ring, true));

        // Closing duplicate dropped: before + 3 points + after.
        assert_eq!(g.vertex_count(), 5 * 4);
        assert_eq!(&g.vertices[..2], &[2.0, 2.0]);
        assert_eq!(&g.vertices[g.vertices.len() - 2..], &[0.0, 0.0]);
        assert_eq!(&g.indices[g.indices.len() - 4..], &[0, 1, 1, 1]);
    }

    #[test]
    fn paths_are_bridged() {
        let mut g = LineGeometry::new();
        assert!(g.append_path(&[[0.0, 0.0], [1.0, 0.0]], false));
        assert!(g.append_path(&[[5.0, 5.0], [6.0, 5.0]], false));

        // First path: bridge, 8 indices, 4 closing, ending at vertex 7.
        // Its vertex blocks occupy 0..16, so the second path starts at 16.
        assert_eq!(&g.indices[14..16], &[16, 16]);
        assert_eq!(&g.indices[16..20], &[16, 17, 18, 19]);
        assert_eq!(g.vertex_count(), 32);
        // Every index has its `next` block in range.
        let max = g.indices.iter().copied().max().unwrap_or_default() as usize;
        assert!(max + 8 < g.vertex_count());
    }

    #[test]
    fn short_paths_are_skipped() {
        let mut g = LineGeometry::new();
        assert!(!g.append_path(&[[0.0, 0.0]], false));
        assert!(!g.append_path(&[], true));
        assert!(!g.append_path(&[[0.0, 0.0], [0.0, 0.0]], true));
        assert!(g.is_empty());
        assert_eq!(g.append_paths(&vec![vec![[0.0, 0.0]], vec![[0.0, 0.0], [1.0, 1.0]]], false), 1);
    }

    #[test]
    fn origin_is_subtracted_before_narrowing() {
        let edge = 20_037_000.0;
        let mut g = LineGeometry::with_origin([edge, edge]);
        assert!(g.append_path(&[[edge + 0.25, edge], [edge + 1.25, edge]], false));
        // Mirrored start point, then the first real point.
        assert_eq!(&g.vertices[..2], &[-0.75, 0.0]);
        assert_eq!(&g.vertices[8..10], &[0.25, 0.0]);
    }

    // ── joins ─────────────────────────────────────────────────────────────

    #[test]
    fn straight_path_takes_unclamped_miter_along_normal() {
        let (kind, m) = resolve_join(v(-1.0, 0.0), v(0.0, 0.0), v(1.0, 0.0), 1.0, &params());
        assert_eq!(kind, JoinKind::Miter);
        assert!(close(m, v(0.0, 0.1)), "{m:?}");

        let (_, m) = resolve_join(v(-1.0, 0.0), v(0.0, 0.0), v(1.0, 0.0), -1.0, &params());
        assert!(close(m, v(0.0, -0.1)), "{m:?}");
    }

    #[test]
    fn reversal_gives_bounded_normal_offset_not_runaway_miter() {
        let (kind, m) = resolve_join(v(1.0, 0.0), v(0.0, 0.0), v(1.0, 0.0), 1.0, &params());
        assert_eq!(kind, JoinKind::Colinear);
        assert!(close(m, v(0.0, 0.1)), "{m:?}");
    }

    #[test]
    fn hairpin_is_clamped() {
        let (kind, m) = resolve_join(v(1.0, 0.1), v(0.0, 0.0), v(1.0, 0.0), 1.0, &params());
        assert_eq!(kind, JoinKind::SharpTurn);
        assert!((m.length() - 0.1).abs() < EPS, "{m:?}");
    }

    #[test]
    fn right_angle_mitres() {
        let (kind, m) = resolve_join(v(-1.0, 0.0), v(0.0, 0.0), v(0.0, 1.0), 1.0, &params());
        assert_eq!(kind, JoinKind::Miter);
        assert!((m.length() - 0.1 * 2f32.sqrt()).abs() < EPS, "{m:?}");
    }

    #[test]
    fn short_segment_bevels() {
        let (kind, m) = resolve_join(v(-1.0, 0.0), v(0.0, 0.0), v(0.0, 0.05), 1.0, &params());
        assert_eq!(kind, JoinKind::Bevel);
        assert!(close(m, v(0.1, 0.0)), "{m:?}");
    }

    #[test]
    fn degenerate_neighbors_stay_finite() {
        let c = v(0.5, 0.5);
        for (prev, next) in [(c, c), (c, v(1.0, 0.5)), (v(0.0, 0.5), c)] {
            let (_, m) = resolve_join(prev, c, next, 2.0, &params());
            assert!(m.is_finite(), "{prev:?} {next:?} -> {m:?}");
        }
    }
}
