//! Distance-driven quadtree LOD over the six faces of a cube-sphere body.
//!
//! [`CubeFaceSet`] rebuilds one [`FaceQuadtree`] per face from the camera
//! position, then resolves every leaf's neighbors (including across face
//! seams) into per-edge stitching strides carried by each [`ChunkKey`].

mod address;
mod body;
mod error;
mod face_set;
mod height_grid;
mod quadtree;

pub use address::{ChunkKey, EdgeStrides, FaceRect, NodeAddress};
pub use body::Body;
pub use error::LodError;
pub use face_set::{CubeFaceSet, FaceLeaves, LeafNode};
pub use height_grid::{HeightSampleGrid, HeightSource};
pub use quadtree::{FaceQuadtree, NeighborRef, NodeId, QuadNode};
