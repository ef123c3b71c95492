//! Node addressing and the stable chunk key derived from it.

use glam::DVec2;
use regolith_cubesphere::{CubeFace, FaceDirection};

/// Identifies a quadtree node by face, depth and grid cell.
///
/// At depth `d` the face is divided into a `2^d x 2^d` grid; `(x, y)` counts
/// cells from the face's `(-h, -h)` corner. Center and size derive from the
/// address, so two rebuilds that produce the same region produce equal addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress {
    /// Which cube face this node belongs to.
    pub face: CubeFace,
    /// Subdivision depth; the root is 0.
    pub depth: u8,
    /// Column at this depth.
    pub x: u32,
    /// Row at this depth.
    pub y: u32,
}

/// Axis-aligned rectangle in face-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceRect {
    /// Lower-left corner.
    pub min: DVec2,
    /// Upper-right corner.
    pub max: DVec2,
}

impl FaceRect {
    /// Center point.
    #[must_use]
    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    /// Whether `p` lies inside or on the boundary.
    #[must_use]
    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Area of the overlap with `other` (0 when they only touch).
    #[must_use]
    pub fn overlap_area(&self, other: &FaceRect) -> f64 {
        let w = self.max.x.min(other.max.x) - self.min.x.max(other.min.x);
        let h = self.max.y.min(other.max.y) - self.min.y.max(other.min.y);
        if w > 0.0 && h > 0.0 { w * h } else { 0.0 }
    }

    /// Width times height.
    #[must_use]
    pub fn area(&self) -> f64 {
        let d = self.max - self.min;
        d.x * d.y
    }
}

impl NodeAddress {
    /// Deepest subdivision an address can describe.
    pub const MAX_DEPTH: u8 = 30;

    /// The root node of `face`.
    #[must_use]
    pub fn root(face: CubeFace) -> Self {
        Self {
            face,
            depth: 0,
            x: 0,
            y: 0,
        }
    }

    /// Cells per axis at `depth`.
    #[inline]
    #[must_use]
    pub fn grid_size(depth: u8) -> u32 {
        1 << depth
    }

    /// Edge length of this node on a face of half-width `half_extent`.
    #[inline]
    #[must_use]
    pub fn size(&self, half_extent: f64) -> f64 {
        2.0 * half_extent / Self::grid_size(self.depth) as f64
    }

    /// Face-local bounds of this node.
    #[must_use]
    pub fn bounds(&self, half_extent: f64) -> FaceRect {
        let size = self.size(half_extent);
        let min = DVec2::new(
            -half_extent + self.x as f64 * size,
            -half_extent + self.y as f64 * size,
        );
        FaceRect {
            min,
            max: min + DVec2::splat(size),
        }
    }

    /// The four children, ordered bottom-left, bottom-right, top-left, top-right.
    #[must_use]
    pub fn children(&self) -> [NodeAddress; 4] {
        let depth = self.depth + 1;
        let (cx, cy) = (self.x * 2, self.y * 2);
        [(cx, cy), (cx + 1, cy), (cx, cy + 1), (cx + 1, cy + 1)].map(|(x, y)| NodeAddress {
            face: self.face,
            depth,
            x,
            y,
        })
    }

    /// The enclosing node one level up, or `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeAddress> {
        (self.depth > 0).then(|| NodeAddress {
            face: self.face,
            depth: self.depth - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:?}, depth={}, x={}, y={})",
            self.face, self.depth, self.x, self.y
        )
    }
}

/// Per-edge stitching strides of a leaf.
///
/// A stride of `k` on an edge means the neighbor across it is `k` times
/// larger, so only every `k`-th boundary sample may be independent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EdgeStrides {
    /// Stride on the `+y` edge.
    pub north: u32,
    /// Stride on the `-y` edge.
    pub south: u32,
    /// Stride on the `+x` edge.
    pub east: u32,
    /// Stride on the `-x` edge.
    pub west: u32,
}

impl EdgeStrides {
    /// No stitching on any edge.
    pub const UNIFORM: EdgeStrides = EdgeStrides {
        north: 1,
        south: 1,
        east: 1,
        west: 1,
    };

    /// Stride on the edge facing `dir`.
    #[must_use]
    pub fn get(&self, dir: FaceDirection) -> u32 {
        match dir {
            FaceDirection::North => self.north,
            FaceDirection::South => self.south,
            FaceDirection::East => self.east,
            FaceDirection::West => self.west,
        }
    }

    /// Set the stride on the edge facing `dir`.
    pub fn set(&mut self, dir: FaceDirection, stride: u32) {
        match dir {
            FaceDirection::North => self.north = stride,
            FaceDirection::South => self.south = stride,
            FaceDirection::East => self.east = stride,
            FaceDirection::West => self.west = stride,
        }
    }
}

impl Default for EdgeStrides {
    fn default() -> Self {
        Self::UNIFORM
    }
}

/// Stable identity of a rendered chunk across quadtree rebuilds.
///
/// Equivalent to `(face, center, size, strides)`: the address fixes face,
/// center and size exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    /// Region covered.
    pub address: NodeAddress,
    /// Edge stitching the geometry was built with.
    pub strides: EdgeStrides,
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = &self.strides;
        write!(
            f,
            "{} strides=[n{} s{} e{} w{}]",
            self.address, s.north, s.south, s.east, s.west
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_root_covers_entire_face() {
        let b = NodeAddress::root(CubeFace::PosX).bounds(1000.0);
        assert_eq!(b.min, DVec2::splat(-1000.0));
        assert_eq!(b.max, DVec2::splat(1000.0));
    }

    #[test]
    fn test_children_tile_parent() {
        let parent = NodeAddress {
            face: CubeFace::NegZ,
            depth: 3,
            x: 5,
            y: 2,
        };
        let pb = parent.bounds(500.0);
        let children = parent.children();
        let area: f64 = children.iter().map(|c| c.bounds(500.0).area()).sum();
        assert!((area - pb.area()).abs() < 1e-9);
        for (i, a) in children.iter().enumerate() {
            assert_eq!(a.parent(), Some(parent));
            for b in &children[i + 1..] {
                assert_eq!(a.bounds(500.0).overlap_area(&b.bounds(500.0)), 0.0);
            }
        }
    }

    #[test]
    fn test_size_halves_per_depth() {
        let root = NodeAddress::root(CubeFace::PosY);
        assert_eq!(root.size(1000.0), 2000.0);
        assert_eq!(root.children()[3].size(1000.0), 1000.0);
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_keys_distinguish_strides() {
        let address = NodeAddress::root(CubeFace::PosZ);
        let mut strided = EdgeStrides::UNIFORM;
        strided.set(FaceDirection::East, 2);
        let mut set = HashSet::new();
        set.insert(ChunkKey {
            address,
            strides: EdgeStrides::UNIFORM,
        });
        set.insert(ChunkKey {
            address,
            strides: strided,
        });
        set.insert(ChunkKey {
            address,
            strides: EdgeStrides::default(),
        });
        assert_eq!(set.len(), 2);
        assert_eq!(strided.get(FaceDirection::East), 2);
    }
}
