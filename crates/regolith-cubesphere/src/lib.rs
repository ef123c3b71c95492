//! Cube-sphere topology: face orientations, edge adjacency, and cube-to-sphere projection.

mod cross_face;
mod cube_face;
mod direction;
mod projection;

pub use cross_face::{FaceEdgeAdjacency, face_adjacency, map_across_edge};
pub use cube_face::CubeFace;
pub use direction::FaceDirection;
pub use projection::{face_point_to_cube, face_point_to_direction};
