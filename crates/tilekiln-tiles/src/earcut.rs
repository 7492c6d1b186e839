//! Ear-clipping polygon triangulation with hole support.
//!
//! Rings live in a node arena as circular doubly linked lists. Holes are
//! bridged into the outer ring before clipping. Polygons with more than 80
//! vertices additionally keep a z-order curve so ear tests only look at
//! nearby points.

use crate::features::Position;

/// A polygon flattened for [`earcut`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatPolygon {
    /// `x, y` pairs of every ring, outer ring first.
    pub vertices: Vec<f64>,
    /// Vertex index where each hole starts.
    pub holes: Vec<usize>,
}

impl FlatPolygon {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 2
    }
}

/// Flattens rings (outer first, then holes) into one coordinate array.
pub fn flatten(rings: &[Vec<Position>]) -> FlatPolygon {
    let total: usize = rings.iter().map(Vec::len).sum();
    let mut vertices = Vec::with_capacity(total * 2);
    let mut holes = Vec::with_capacity(rings.len().saturating_sub(1));
    let mut hole_index = 0;
    for (i, ring) in rings.iter().enumerate() {
        for p in ring {
            vertices.extend_from_slice(p);
        }
        if i > 0 {
            hole_index += rings[i - 1].len();
            holes.push(hole_index);
        }
    }
    FlatPolygon { vertices, holes }
}

/// Triangulates a flat polygon.
///
/// `data` holds `dim` values per vertex (the first two are x and y),
/// `hole_indices` the vertex index where each hole ring starts. Returns
/// vertex indices, three per triangle. Degenerate input yields no triangles.
pub fn earcut(data: &[f64], hole_indices: &[usize], dim: usize) -> Vec<u32> {
    let mut triangles = Vec::new();
    if dim < 2 || data.len() < dim * 3 {
        return triangles;
    }

    let outer_len = hole_indices.first().map_or(data.len(), |&h| (h * dim).min(data.len()));
    let mut arena = Arena::with_capacity(data.len() / dim * 3 / 2);

    let Some(mut outer) = arena.linked_list(data, 0, outer_len, dim, true) else { return triangles };
    if arena.nodes[outer].next == arena.nodes[outer].prev {
        return triangles;
    }
    if !hole_indices.is_empty() {
        outer = arena.eliminate_holes(data, hole_indices, outer, dim);
    }

    let mut hash = None;
    if data.len() > 80 * dim {
        let (mut min_x, mut min_y) = (data[0], data[1]);
        let (mut max_x, mut max_y) = (min_x, min_y);
        for p in data[..outer_len].chunks_exact(dim).skip(1) {
            min_x = min_x.min(p[0]);
            min_y = min_y.min(p[1]);
            max_x = max_x.max(p[0]);
            max_y = max_y.max(p[1]);
        }
        let size = (max_x - min_x).max(max_y - min_y);
        if size != 0.0 {
            hash = Some(ZHash { min_x, min_y, inv_size: 32767.0 / size });
        }
    }

    arena.earcut_linked(Some(outer), &mut triangles, hash, Pass::Initial);
    triangles
}

/// Relative difference between the polygon's area and the area covered by
/// `triangles`. Zero for an exact triangulation.
pub fn deviation(data: &[f64], hole_indices: &[usize], dim: usize, triangles: &[u32]) -> f64 {
    let outer_len = hole_indices.first().map_or(data.len(), |&h| (h * dim).min(data.len()));
    let mut polygon_area = signed_area(data, 0, outer_len, dim).abs();
    for (k, &h) in hole_indices.iter().enumerate() {
        let start = h * dim;
        let end = hole_indices.get(k + 1).map_or(data.len(), |&n| n * dim);
        polygon_area -= signed_area(data, start, end, dim).abs();
    }

    let mut triangles_area = 0.0;
    for t in triangles.chunks_exact(3) {
        let a = t[0] as usize * dim;
        let b = t[1] as usize * dim;
        let c = t[2] as usize * dim;
        triangles_area += ((data[a] - data[c]) * (data[b + 1] - data[a + 1])
            - (data[a] - data[b]) * (data[c + 1] - data[a + 1]))
            .abs();
    }

    if polygon_area == 0.0 && triangles_area == 0.0 {
        0.0
    } else {
        ((triangles_area - polygon_area) / polygon_area).abs()
    }
}

// ── internals ─────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Pass {
    Initial,
    Filtered,
    Cured,
}

#[derive(Debug, Copy, Clone)]
struct ZHash {
    min_x: f64,
    min_y: f64,
    inv_size: f64,
}

impl ZHash {
    /// Morton code of a point within the bounding box, 15 bits per axis.
    fn z_order(&self, x: f64, y: f64) -> u32 {
        let x = ((x - self.min_x) * self.inv_size) as u32;
        let y = ((y - self.min_y) * self.inv_size) as u32;
        spread_bits(x) | (spread_bits(y) << 1)
    }
}

fn spread_bits(mut v: u32) -> u32 {
    v = (v | (v << 8)) & 0x00FF_00FF;
    v = (v | (v << 4)) & 0x0F0F_0F0F;
    v = (v | (v << 2)) & 0x3333_3333;
    (v | (v << 1)) & 0x5555_5555
}

#[derive(Debug, Copy, Clone)]
struct Node {
    /// Vertex index in the input.
    i: u32,
    x: f64,
    y: f64,
    prev: usize,
    next: usize,
    z: u32,
    prev_z: Option<usize>,
    next_z: Option<usize>,
    /// Single-point hole; never filtered out.
    steiner: bool,
}

impl Node {
    fn new(i: u32, x: f64, y: f64, at: usize) -> Self {
        Self { i, x, y, prev: at, next: at, z: 0, prev_z: None, next_z: None, steiner: false }
    }
}

struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    fn with_capacity(n: usize) -> Self {
        Self { nodes: Vec::with_capacity(n) }
    }

    // ── list plumbing ─────────────────────────────────────────────────────

    fn insert_node(&mut self, i: u32, x: f64, y: f64, last: Option<usize>) -> usize {
        let p = self.nodes.len();
        let mut node = Node::new(i, x, y, p);
        if let Some(last) = last {
            let last_next = self.nodes[last].next;
            node.prev = last;
            node.next = last_next;
            self.nodes.push(node);
            self.nodes[last_next].prev = p;
            self.nodes[last].next = p;
        } else {
            self.nodes.push(node);
        }
        p
    }

    /// Unlinks `p`. Its own links stay intact so callers can keep walking.
    fn remove_node(&mut self, p: usize) {
        let Node { prev, next, prev_z, next_z, .. } = self.nodes[p];
        self.nodes[next].prev = prev;
        self.nodes[prev].next = next;
        if let Some(pz) = prev_z {
            self.nodes[pz].next_z = next_z;
        }
        if let Some(nz) = next_z {
            self.nodes[nz].prev_z = prev_z;
        }
    }

    /// Builds a ring with the requested winding. Returns its last node.
    fn linked_list(&mut self, data: &[f64], start: usize, end: usize, dim: usize, clockwise: bool) -> Option<usize> {
        if end <= start {
            return None;
        }
        let mut last = None;
        if clockwise == (signed_area(data, start, end, dim) > 0.0) {
            for i in (start..end).step_by(dim) {
                last = Some(self.insert_node((i / dim) as u32, data[i], data[i + 1], last));
            }
        } else {
            for i in (start..end).step_by(dim).rev() {
                last = Some(self.insert_node((i / dim) as u32, data[i], data[i + 1], last));
            }
        }

        if let Some(l) = last
            && self.equals(l, self.nodes[l].next)
        {
            self.remove_node(l);
            last = Some(self.nodes[l].next);
        }
        last
    }

    /// Drops duplicate and collinear points between `start` and `end`.
    fn filter_points(&mut self, start: usize, end: Option<usize>) -> usize {
        let mut end = end.unwrap_or(start);
        let mut p = start;
        loop {
            let mut again = false;
            let node = self.nodes[p];
            if !node.steiner && (self.equals(p, node.next) || self.area(node.prev, p, node.next) == 0.0) {
                self.remove_node(p);
                p = node.prev;
                end = node.prev;
                if p == self.nodes[p].next {
                    break;
                }
                again = true;
            } else {
                p = node.next;
            }
            if !again && p == end {
                break;
            }
        }
        end
    }

    fn split_polygon(&mut self, a: usize, b: usize) -> usize {
        let na = self.nodes[a];
        let nb = self.nodes[b];
        let a2 = self.nodes.len();
        let b2 = a2 + 1;
        self.nodes.push(Node::new(na.i, na.x, na.y, a2));
        self.nodes.push(Node::new(nb.i, nb.x, nb.y, b2));

        let an = na.next;
        let bp = nb.prev;

        self.nodes[a].next = b;
        self.nodes[b].prev = a;

        self.nodes[a2].next = an;
        self.nodes[an].prev = a2;

        self.nodes[b2].next = a2;
        self.nodes[a2].prev = b2;

        self.nodes[bp].next = b2;
        self.nodes[b2].prev = bp;

        b2
    }

    // ── clipping ──────────────────────────────────────────────────────────

    fn earcut_linked(&mut self, ear: Option<usize>, triangles: &mut Vec<u32>, hash: Option<ZHash>, pass: Pass) {
        let Some(mut ear) = ear else { return };
        if pass == Pass::Initial
            && let Some(h) = hash
        {
            self.index_curve(ear, h);
        }

        let mut stop = ear;
        while self.nodes[ear].prev != self.nodes[ear].next {
            let prev = self.nodes[ear].prev;
            let next = self.nodes[ear].next;

            let is_ear = match hash {
                Some(h) => self.is_ear_hashed(ear, h),
                None => self.is_ear(ear),
            };
            if is_ear {
                triangles.extend([self.nodes[prev].i, self.nodes[ear].i, self.nodes[next].i]);
                self.remove_node(ear);
                // Skipping the next vertex leads to less sliver triangles.
                ear = self.nodes[next].next;
                stop = ear;
                continue;
            }

            ear = next;
            if ear == stop {
                match pass {
                    Pass::Initial => {
                        let filtered = self.filter_points(ear, None);
                        self.earcut_linked(Some(filtered), triangles, hash, Pass::Filtered);
                    }
                    Pass::Filtered => {
                        let filtered = self.filter_points(ear, None);
                        let cured = self.cure_local_intersections(filtered, triangles);
                        self.earcut_linked(Some(cured), triangles, hash, Pass::Cured);
                    }
                    Pass::Cured => self.split_earcut(ear, triangles, hash),
                }
                break;
            }
        }
    }

    fn is_ear(&self, ear: usize) -> bool {
        let b = self.nodes[ear];
        let a = self.nodes[b.prev];
        let c = self.nodes[b.next];
        if self.area(b.prev, ear, b.next) >= 0.0 {
            return false;
        }

        let (x0, y0, x1, y1) = triangle_bbox(&a, &b, &c);
        let mut p = c.next;
        while p != b.prev {
            let n = self.nodes[p];
            if n.x >= x0
                && n.x <= x1
                && n.y >= y0
                && n.y <= y1
                && point_in_triangle((a.x, a.y), (b.x, b.y), (c.x, c.y), (n.x, n.y))
                && self.area(n.prev, p, n.next) >= 0.0
            {
                return false;
            }
            p = n.next;
        }
        true
    }

    fn is_ear_hashed(&self, ear: usize, hash: ZHash) -> bool {
        let b = self.nodes[ear];
        let (ia, ic) = (b.prev, b.next);
        let a = self.nodes[ia];
        let c = self.nodes[ic];
        if self.area(ia, ear, ic) >= 0.0 {
            return false;
        }

        let (x0, y0, x1, y1) = triangle_bbox(&a, &b, &c);
        let min_z = hash.z_order(x0, y0);
        let max_z = hash.z_order(x1, y1);

        let blocks = |q: usize| {
            let n = self.nodes[q];
            q != ia
                && q != ic
                && n.x >= x0
                && n.x <= x1
                && n.y >= y0
                && n.y <= y1
                && point_in_triangle((a.x, a.y), (b.x, b.y), (c.x, c.y), (n.x, n.y))
                && self.area(n.prev, q, n.next) >= 0.0
        };

        // Walk both z directions at once, then finish whichever is left.
        let mut p = b.prev_z;
        let mut n = b.next_z;
        while let (Some(pi), Some(ni)) = (p, n) {
            if self.nodes[pi].z < min_z || self.nodes[ni].z > max_z {
                break;
            }
            if blocks(pi) {
                return false;
            }
            p = self.nodes[pi].prev_z;
            if blocks(ni) {
                return false;
            }
            n = self.nodes[ni].next_z;
        }
        while let Some(pi) = p {
            if self.nodes[pi].z < min_z {
                break;
            }
            if blocks(pi) {
                return false;
            }
            p = self.nodes[pi].prev_z;
        }
        while let Some(ni) = n {
            if self.nodes[ni].z > max_z {
                break;
            }
            if blocks(ni) {
                return false;
            }
            n = self.nodes[ni].next_z;
        }
        true
    }

    /// Clips triangles over small self-intersections.
    fn cure_local_intersections(&mut self, mut start: usize, triangles: &mut Vec<u32>) -> usize {
        let mut p = start;
        loop {
            let a = self.nodes[p].prev;
            let pn = self.nodes[p].next;
            let b = self.nodes[pn].next;

            if !self.equals(a, b)
                && self.intersects(a, p, pn, b)
                && self.locally_inside(a, b)
                && self.locally_inside(b, a)
            {
                triangles.extend([self.nodes[a].i, self.nodes[p].i, self.nodes[b].i]);
                self.remove_node(p);
                self.remove_node(pn);
                p = b;
                start = b;
            }
            p = self.nodes[p].next;
            if p == start {
                break;
            }
        }
        self.filter_points(p, None)
    }

    /// Last resort: split along a valid diagonal and clip both halves.
    fn split_earcut(&mut self, start: usize, triangles: &mut Vec<u32>, hash: Option<ZHash>) {
        let mut a = start;
        loop {
            let mut b = self.nodes[self.nodes[a].next].next;
            while b != self.nodes[a].prev {
                if self.nodes[a].i != self.nodes[b].i && self.is_valid_diagonal(a, b) {
                    let c = self.split_polygon(a, b);

                    let a_next = self.nodes[a].next;
                    let a = self.filter_points(a, Some(a_next));
                    let c_next = self.nodes[c].next;
                    let c = self.filter_points(c, Some(c_next));

                    self.earcut_linked(Some(a), triangles, hash, Pass::Initial);
                    self.earcut_linked(Some(c), triangles, hash, Pass::Initial);
                    return;
                }
                b = self.nodes[b].next;
            }
            a = self.nodes[a].next;
            if a == start {
                break;
            }
        }
    }

    // ── holes ─────────────────────────────────────────────────────────────

    fn eliminate_holes(&mut self, data: &[f64], hole_indices: &[usize], mut outer: usize, dim: usize) -> usize {
        let mut queue = Vec::with_capacity(hole_indices.len());
        for (k, &h) in hole_indices.iter().enumerate() {
            let start = h * dim;
            let end = hole_indices.get(k + 1).map_or(data.len(), |&n| (n * dim).min(data.len()));
            let Some(list) = self.linked_list(data, start, end, dim, false) else { continue };
            if list == self.nodes[list].next {
                self.nodes[list].steiner = true;
            }
            queue.push(self.leftmost(list));
        }

        queue.sort_by(|&a, &b| self.nodes[a].x.total_cmp(&self.nodes[b].x));

        for hole in queue {
            outer = self.eliminate_hole(hole, outer);
        }
        outer
    }

    fn eliminate_hole(&mut self, hole: usize, outer: usize) -> usize {
        let Some(bridge) = self.find_hole_bridge(hole, outer) else { return outer };
        let bridge_reverse = self.split_polygon(bridge, hole);

        let reverse_next = self.nodes[bridge_reverse].next;
        self.filter_points(bridge_reverse, Some(reverse_next));
        let bridge_next = self.nodes[bridge].next;
        self.filter_points(bridge, Some(bridge_next))
    }

    /// Outer-ring vertex the hole can connect to without crossing an edge.
    fn find_hole_bridge(&self, hole: usize, outer: usize) -> Option<usize> {
        let (hx, hy) = (self.nodes[hole].x, self.nodes[hole].y);
        let mut qx = f64::NEG_INFINITY;
        let mut candidate = None;

        // Nearest edge intersection of a ray cast left from the hole point.
        let mut p = outer;
        loop {
            let n = self.nodes[p];
            let next = self.nodes[n.next];
            if hy <= n.y && hy >= next.y && next.y != n.y {
                let x = n.x + (hy - n.y) * (next.x - n.x) / (next.y - n.y);
                if x <= hx && x > qx {
                    qx = x;
                    let m = if n.x < next.x { p } else { n.next };
                    candidate = Some(m);
                    if x == hx {
                        // Hole touches the outer ring.
                        return Some(m);
                    }
                }
            }
            p = n.next;
            if p == outer {
                break;
            }
        }

        // Points inside the triangle (hole point, ray hit, candidate) could
        // block the bridge; take the one with the smallest angle to the ray.
        let mut m = candidate?;
        let stop = m;
        let (mx, my) = (self.nodes[m].x, self.nodes[m].y);
        let mut tan_min = f64::INFINITY;

        let mut p = m;
        loop {
            let n = self.nodes[p];
            let (ax, cx) = if hy < my { (hx, qx) } else { (qx, hx) };
            if hx >= n.x && n.x >= mx && hx != n.x && point_in_triangle((ax, hy), (mx, my), (cx, hy), (n.x, n.y)) {
                let tan = (hy - n.y).abs() / (hx - n.x);
                let mnode = self.nodes[m];
                if self.locally_inside(p, hole)
                    && (tan < tan_min
                        || (tan == tan_min
                            && (n.x > mnode.x || (n.x == mnode.x && self.sector_contains_sector(m, p)))))
                {
                    m = p;
                    tan_min = tan;
                }
            }
            p = n.next;
            if p == stop {
                break;
            }
        }
        Some(m)
    }

    fn sector_contains_sector(&self, m: usize, p: usize) -> bool {
        let nm = self.nodes[m];
        let np = self.nodes[p];
        self.area(nm.prev, m, np.prev) < 0.0 && self.area(np.next, m, nm.next) < 0.0
    }

    fn leftmost(&self, start: usize) -> usize {
        let mut p = start;
        let mut leftmost = start;
        loop {
            let n = self.nodes[p];
            let l = self.nodes[leftmost];
            if n.x < l.x || (n.x == l.x && n.y < l.y) {
                leftmost = p;
            }
            p = n.next;
            if p == start {
                break;
            }
        }
        leftmost
    }

    // ── z-order ───────────────────────────────────────────────────────────

    /// Assigns z values and links the ring in z order.
    fn index_curve(&mut self, start: usize, hash: ZHash) {
        let mut ring = Vec::new();
        let mut p = start;
        loop {
            let n = self.nodes[p];
            if n.z == 0 {
                self.nodes[p].z = hash.z_order(n.x, n.y);
            }
            ring.push(p);
            p = n.next;
            if p == start {
                break;
            }
        }

        ring.sort_by_key(|&i| self.nodes[i].z);
        for (k, &i) in ring.iter().enumerate() {
            self.nodes[i].prev_z = k.checked_sub(1).map(|j| ring[j]);
            self.nodes[i].next_z = ring.get(k + 1).copied();
        }
    }

    // ── predicates ────────────────────────────────────────────────────────

    fn area(&self, p: usize, q: usize, r: usize) -> f64 {
        let (p, q, r) = (&self.nodes[p], &self.nodes[q], &self.nodes[r]);
        (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y)
    }

    fn equals(&self, a: usize, b: usize) -> bool {
        let (a, b) = (&self.nodes[a], &self.nodes[b]);
        a.x == b.x && a.y == b.y
    }

    fn intersects(&self, p1: usize, q1: usize, p2: usize, q2: usize) -> bool {
        let o1 = sign(self.area(p1, q1, p2));
        let o2 = sign(self.area(p1, q1, q2));
        let o3 = sign(self.area(p2, q2, p1));
        let o4 = sign(self.area(p2, q2, q1));

        if o1 != o2 && o3 != o4 {
            return true;
        }
        (o1 == 0 && self.on_segment(p1, p2, q1))
            || (o2 == 0 && self.on_segment(p1, q2, q1))
            || (o3 == 0 && self.on_segment(p2, p1, q2))
            || (o4 == 0 && self.on_segment(p2, q1, q2))
    }

    /// For collinear `p`, `q`, `r`: whether `q` lies on segment `pr`.
    fn on_segment(&self, p: usize, q: usize, r: usize) -> bool {
        let (p, q, r) = (&self.nodes[p], &self.nodes[q], &self.nodes[r]);
        q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
    }

    fn intersects_polygon(&self, a: usize, b: usize) -> bool {
        let (ai, bi) = (self.nodes[a].i, self.nodes[b].i);
        let mut p = a;
        loop {
            let n = self.nodes[p];
            let next_i = self.nodes[n.next].i;
            if n.i != ai && next_i != ai && n.i != bi && next_i != bi && self.intersects(p, n.next, a, b) {
                return true;
            }
            p = n.next;
            if p == a {
                break;
            }
        }
        false
    }

    fn locally_inside(&self, a: usize, b: usize) -> bool {
        let n = self.nodes[a];
        if self.area(n.prev, a, n.next) < 0.0 {
            self.area(a, b, n.next) >= 0.0 && self.area(a, n.prev, b) >= 0.0
        } else {
            self.area(a, b, n.prev) < 0.0 || self.area(a, n.next, b) < 0.0
        }
    }

    fn middle_inside(&self, a: usize, b: usize) -> bool {
        let (na, nb) = (self.nodes[a], self.nodes[b]);
        let px = (na.x + nb.x) / 2.0;
        let py = (na.y + nb.y) / 2.0;
        let mut inside = false;
        let mut p = a;
        loop {
            let n = self.nodes[p];
            let next = self.nodes[n.next];
            if (n.y > py) != (next.y > py)
                && next.y != n.y
                && px < (next.x - n.x) * (py - n.y) / (next.y - n.y) + n.x
            {
                inside = !inside;
            }
            p = n.next;
            if p == a {
                break;
            }
        }
        inside
    }

    fn is_valid_diagonal(&self, a: usize, b: usize) -> bool {
        let (na, nb) = (self.nodes[a], self.nodes[b]);
        let dont_touch = self.nodes[na.next].i != nb.i && self.nodes[na.prev].i != nb.i;
        if !dont_touch || self.intersects_polygon(a, b) {
            return false;
        }
        let visible = self.locally_inside(a, b)
            && self.locally_inside(b, a)
            && self.middle_inside(a, b)
            && (self.area(na.prev, a, nb.prev) != 0.0 || self.area(a, nb.prev, b) != 0.0);
        let zero_length = self.equals(a, b)
            && self.area(na.prev, a, na.next) > 0.0
            && self.area(nb.prev, b, nb.next) > 0.0;
        visible || zero_length
    }
}

fn signed_area(data: &[f64], start: usize, end: usize, dim: usize) -> f64 {
    if end <= start || end < dim {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut j = end - dim;
    for i in (start..end).step_by(dim) {
        sum += (data[j] - data[i]) * (data[i + 1] + data[j + 1]);
        j = i;
    }
    sum
}

fn triangle_bbox(a: &Node, b: &Node, c: &Node) -> (f64, f64, f64, f64) {
    (
        a.x.min(b.x).min(c.x),
        a.y.min(b.y).min(c.y),
        a.x.max(b.x).max(c.x),
        a.y.max(b.y).max(c.y),
    )
}

fn point_in_triangle(a: (f64, f64), b: (f64, f64), c: (f64, f64), p: (f64, f64)) -> bool {
    (c.0 - p.0) * (a.1 - p.1) >= (a.0 - p.0) * (c.1 - p.1)
        && (a.0 - p.0) * (b.1 - p.1) >= (b.0 - p.0) * (a.1 - p.1)
        && (b.0 - p.0) * (c.1 - p.1) >= (c.0 - p.0) * (b.1 - p.1)
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Position> {
        vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]]
    }

    // ── simple rings ──────────────────────────────────────────────────────

    #[test]
    fn convex_quad_gives_two_triangles() {
        let flat = flatten(&[square(0.0, 0.0, 10.0, 10.0)]);
        let tris = earcut(&flat.vertices, &flat.holes, 2);
        assert_eq!(tris.len(), 6);
        assert!(tris.iter().all(|&i| i < 4));
        assert_eq!(deviation(&flat.vertices, &flat.holes, 2, &tris), 0.0);
    }

    #[test]
    fn closing_duplicate_is_ignored() {
        let mut ring = square(0.0, 0.0, 4.0, 2.0);
        ring.push(ring[0]);
        let flat = flatten(&[ring]);
        let tris = earcut(&flat.vertices, &flat.holes, 2);
        assert_eq!(tris.len(), 6);
        assert_eq!(deviation(&flat.vertices, &flat.holes, 2, &tris), 0.0);
    }

    #[test]
    fn concave_ring_is_covered_exactly() {
        // An L shape.
        let ring = vec![[0.0, 0.0], [6.0, 0.0], [6.0, 2.0], [2.0, 2.0], [2.0, 6.0], [0.0, 6.0]];
        let flat = flatten(&[ring]);
        let tris = earcut(&flat.vertices, &flat.holes, 2);
        assert_eq!(tris.len(), 4 * 3);
        assert!(deviation(&flat.vertices, &flat.holes, 2, &tris) < 1e-12);
    }

    #[test]
    fn degenerate_input_gives_nothing() {
        assert!(earcut(&[0.0, 0.0, 1.0, 1.0], &[], 2).is_empty());
        assert!(earcut(&[0.0, 0.0, 1.0, 0.0, 2.0, 0.0], &[], 2).is_empty());
        assert!(earcut(&[], &[], 2).is_empty());
    }

    // ── holes ─────────────────────────────────────────────────────────────

    #[test]
    fn flatten_records_hole_offsets() {
        let flat = flatten(&[square(0.0, 0.0, 10.0, 10.0), square(2.0, 2.0, 4.0, 4.0), square(6.0, 6.0, 8.0, 8.0)]);
        assert_eq!(flat.vertex_count(), 12);
        assert_eq!(flat.holes, vec![4, 8]);
        // Hole vertices sit in the flat array before triangulation.
        assert_eq!(&flat.vertices[8..10], &[2.0, 2.0]);
    }

    #[test]
    fn hole_interior_is_not_covered() {
        let flat = flatten(&[square(0.0, 0.0, 10.0, 10.0), square(3.0, 3.0, 7.0, 7.0)]);
        let tris = earcut(&flat.vertices, &flat.holes, 2);
        assert_eq!(tris.len(), 8 * 3);
        assert!(deviation(&flat.vertices, &flat.holes, 2, &tris) < 1e-12);

        // No triangle contains the hole's center.
        let v = &flat.vertices;
        for t in tris.chunks_exact(3) {
            let p = |k: usize| (v[t[k] as usize * 2], v[t[k] as usize * 2 + 1]);
            let (a, b, c) = (p(0), p(1), p(2));
            let inside = point_in_triangle(a, b, c, (5.0, 5.0)) || point_in_triangle(c, b, a, (5.0, 5.0));
            assert!(!inside, "triangle {t:?} covers the hole");
        }
    }

    // ── z-order path ──────────────────────────────────────────────────────

    #[test]
    fn large_ring_uses_hashing_and_stays_exact() {
        let n = 120;
        let ring: Vec<Position> = (0..n)
            .map(|k| {
                let a = k as f64 / n as f64 * std::f64::consts::TAU;
                [100.0 * a.cos(), 100.0 * a.sin()]
            })
            .collect();
        let flat = flatten(&[ring]);
        assert!(flat.vertices.len() > 80 * 2);
        let tris = earcut(&flat.vertices, &flat.holes, 2);
        assert_eq!(tris.len(), (n - 2) * 3);
        assert!(deviation(&flat.vertices, &flat.holes, 2, &tris) < 1e-9);
    }

    #[test]
    fn spread_bits_interleaves() {
        assert_eq!(spread_bits(0b11), 0b101);
        let hash = ZHash { min_x: 0.0, min_y: 0.0, inv_size: 1.0 };
        assert_eq!(hash.z_order(1.0, 0.0), 0b01);
        assert_eq!(hash.z_order(0.0, 1.0), 0b10);
    }
}
