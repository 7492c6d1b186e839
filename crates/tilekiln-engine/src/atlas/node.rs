use crate::ids::ImageId;

/// Pixel rectangle inside the atlas, top-left origin, exclusive right/bottom.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct AtlasRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl AtlasRect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self { left, top, right, bottom }
    }

    #[inline]
    pub const fn width(&self) -> u32 {
        self.right - self.left
    }

    #[inline]
    pub const fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Exact fit.
    #[inline]
    pub const fn fits_exactly(&self, w: u32, h: u32) -> bool {
        self.width() == w && self.height() == h
    }

    pub fn intersects(&self, other: &AtlasRect) -> bool {
        self.left < other.right && other.left < self.right && self.top < other.bottom && other.top < self.bottom
    }
}

/// Node of the packing tree. Children are arena indices.
#[derive(Debug, Clone)]
pub(crate) struct AtlasNode {
    pub rect: AtlasRect,
    pub children: Option<[usize; 2]>,
    pub image: Option<ImageId>,
}

/// Binary-tree rectangle packer over a node arena.
#[derive(Debug, Clone)]
pub(crate) struct PackTree {
    nodes: Vec<AtlasNode>,
}

impl PackTree {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            nodes: vec![AtlasNode { rect: AtlasRect::new(0, 0, width, height), children: None, image: None }],
        }
    }

    pub fn node(&self, index: usize) -> &AtlasNode {
        &self.nodes[index]
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Places a `w`×`h` cell (border included) and returns the leaf index.
    pub fn insert(&mut self, image: ImageId, w: u32, h: u32) -> Option<usize> {
        self.insert_at(0, image, w, h)
    }

    fn insert_at(&mut self, index: usize, image: ImageId, w: u32, h: u32) -> Option<usize> {
        if let Some([first, second]) = self.nodes[index].children {
            return self.insert_at(first, image, w, h).or_else(|| self.insert_at(second, image, w, h));
        }

        let node = &self.nodes[index];
        if node.image.is_some() {
            return None;
        }
        let rc = node.rect;
        if w > rc.width() || h > rc.height() {
            return None;
        }
        if rc.fits_exactly(w, h) {
            self.nodes[index].image = Some(image);
            return Some(index);
        }

        // Split along the axis with more slack; the first child is sized to the cell.
        let dw = rc.width() - w;
        let dh = rc.height() - h;
        let (a, b) = if dw > dh {
            (
                AtlasRect::new(rc.left, rc.top, rc.left + w, rc.bottom),
                AtlasRect::new(rc.left + w, rc.top, rc.right, rc.bottom),
            )
        } else {
            (
                AtlasRect::new(rc.left, rc.top, rc.right, rc.top + h),
                AtlasRect::new(rc.left, rc.top + h, rc.right, rc.bottom),
            )
        };
        let first = self.nodes.len();
        self.nodes.push(AtlasNode { rect: a, children: None, image: None });
        self.nodes.push(AtlasNode { rect: b, children: None, image: None });
        self.nodes[index].children = Some([first, first + 1]);

        self.insert_at(first, image, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(n: u64) -> ImageId {
        ImageId::from(n)
    }

    #[test]
    fn exact_fit_occupies_root() {
        let mut tree = PackTree::new(16, 16);
        assert_eq!(tree.insert(img(1), 16, 16), Some(0));
        assert_eq!(tree.insert(img(2), 1, 1), None);
    }

    #[test]
    fn wider_slack_splits_vertically() {
        let mut tree = PackTree::new(64, 16);
        let leaf = tree.insert(img(1), 8, 8).expect("fits");
        // Width slack 56 > height slack 8: left strip 8 wide, then split along height.
        assert_eq!(tree.node(leaf).rect, AtlasRect::new(0, 0, 8, 8));
        let Some([left, right]) = tree.node(0).children else { panic!("root split") };
        assert_eq!(tree.node(left).rect, AtlasRect::new(0, 0, 8, 16));
        assert_eq!(tree.node(right).rect, AtlasRect::new(8, 0, 64, 16));
    }

    #[test]
    fn oversize_cell_is_rejected() {
        let mut tree = PackTree::new(32, 32);
        assert_eq!(tree.insert(img(1), 33, 4), None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn cells_never_overlap() {
        let mut tree = PackTree::new(64, 64);
        let sizes = [(20, 12), (12, 20), (8, 8), (30, 6), (6, 30), (16, 16), (10, 10), (4, 24)];
        let mut placed: Vec<AtlasRect> = Vec::new();
        for (i, (w, h)) in sizes.into_iter().enumerate() {
            if let Some(leaf) = tree.insert(img(i as u64), w, h) {
                let rect = tree.node(leaf).rect;
                assert_eq!((rect.width(), rect.height()), (w, h));
                assert!(placed.iter().all(|p| !p.intersects(&rect)), "{rect:?} overlaps");
                placed.push(rect);
            }
        }
        assert!(placed.len() >= 6);
    }
}
