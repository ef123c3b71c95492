//! Cross-face adjacency for nodes at cube-face edges.
//!
//! When a node sits at the boundary of a cube face, its neighbor in one
//! direction lies on a different face. This module encodes the cube's face
//! adjacency topology as a constant table and maps face-local points across seams.

use glam::DVec2;

use crate::{CubeFace, FaceDirection};

/// Describes the relationship between a face edge and its adjacent face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceEdgeAdjacency {
    /// The adjacent face.
    pub neighbor_face: CubeFace,
    /// Which edge of the neighbor face this connects to.
    pub neighbor_edge: FaceDirection,
    /// Whether the coordinate along the shared edge changes sign.
    /// If true, `t` on this edge is `-t` on the neighbor edge.
    pub flipped: bool,
}

const fn adj(
    neighbor_face: CubeFace,
    neighbor_edge: FaceDirection,
    flipped: bool,
) -> FaceEdgeAdjacency {
    FaceEdgeAdjacency {
        neighbor_face,
        neighbor_edge,
        flipped,
    }
}

/// Adjacency indexed by `[face index][direction index]`.
///
/// Derived from the tangent/bitangent basis in [`CubeFace`]: 24 entries,
/// 12 unique edges, each listed once from either side.
const ADJACENCY: [[FaceEdgeAdjacency; 4]; 6] = {
    use CubeFace::*;
    use FaceDirection::*;
    [
        // PosX: North, South, East, West
        [
            adj(PosY, East, false),
            adj(NegY, East, true),
            adj(NegZ, West, false),
            adj(PosZ, East, false),
        ],
        // NegX
        [
            adj(PosY, West, true),
            adj(NegY, West, false),
            adj(PosZ, West, false),
            adj(NegZ, East, false),
        ],
        // PosY
        [
            adj(NegZ, North, true),
            adj(PosZ, North, false),
            adj(PosX, North, false),
            adj(NegX, North, true),
        ],
        // NegY
        [
            adj(PosZ, South, false),
            adj(NegZ, South, true),
            adj(PosX, South, true),
            adj(NegX, South, false),
        ],
        // PosZ
        [
            adj(PosY, South, false),
            adj(NegY, North, false),
            adj(PosX, West, false),
            adj(NegX, East, false),
        ],
        // NegZ
        [
            adj(PosY, North, true),
            adj(NegY, South, true),
            adj(NegX, West, false),
            adj(PosX, East, false),
        ],
    ]
};

/// Which face touches `face` across `edge`, and how coordinates transform.
#[must_use]
pub fn face_adjacency(face: CubeFace, edge: FaceDirection) -> FaceEdgeAdjacency {
    ADJACENCY[face.index()][edge.index()]
}

/// Map a point lying `depth` beyond the `dir` edge of `face` onto the adjacent face.
///
/// `along` is the coordinate parallel to the edge (`x` for North/South edges,
/// `y` for East/West). The result lies `depth` inside the neighbor's shared edge.
#[must_use]
pub fn map_across_edge(
    face: CubeFace,
    dir: FaceDirection,
    along: f64,
    depth: f64,
    half_extent: f64,
) -> (CubeFace, DVec2) {
    let adjacency = face_adjacency(face, dir);
    let t = if adjacency.flipped { -along } else { along };
    let inner = half_extent - depth;

    let local = match adjacency.neighbor_edge {
        FaceDirection::North => DVec2::new(t, inner),
        FaceDirection::South => DVec2::new(t, -inner),
        FaceDirection::East => DVec2::new(inner, t),
        FaceDirection::West => DVec2::new(-inner, t),
    };
    (adjacency.neighbor_face, local)
}
