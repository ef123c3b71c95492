//! The six face quadtrees of one body and the seam-aware neighbor pass.

use std::time::Instant;

use glam::{DMat3, DVec2, DVec3};
use regolith_cubesphere::{CubeFace, FaceDirection, map_across_edge};

use crate::{
    Body, ChunkKey, FaceQuadtree, FaceRect, HeightSampleGrid, HeightSource, LodError,
    NeighborRef, QuadNode,
};

/// A renderable leaf, detached from the arena that produced it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeafNode {
    /// Stable identity used for chunk reuse.
    pub key: ChunkKey,
    /// Face-local center.
    pub center: DVec2,
    /// Edge length in face-local units.
    pub size: f64,
    /// Face-local footprint.
    pub bounds: FaceRect,
    /// Center projected onto the displaced, stretched surface.
    pub sphere_center: DVec3,
}

impl LeafNode {
    fn from_node(node: &QuadNode) -> Self {
        Self {
            key: ChunkKey {
                address: node.address,
                strides: node.strides(),
            },
            center: node.center,
            size: node.size,
            bounds: node.bounds,
            sphere_center: node.sphere_center,
        }
    }
}

/// Leaves of one face together with its orientation.
#[derive(Clone, Debug)]
pub struct FaceLeaves {
    /// Which face.
    pub face: CubeFace,
    /// Columns are the face tangent, bitangent and normal.
    pub transform: DMat3,
    /// Current leaves of the face.
    pub leaves: Vec<LeafNode>,
}

/// Six face quadtrees sharing one [`Body`].
pub struct CubeFaceSet {
    body: Body,
    grids: Vec<HeightSampleGrid>,
    trees: Vec<FaceQuadtree>,
    camera: Option<DVec3>,
}

impl CubeFaceSet {
    /// Sample every face's height grid and create root-only trees.
    ///
    /// Fails if the height source yields a non-finite sample.
    pub fn new(body: Body, heights: &dyn HeightSource) -> Result<Self, LodError> {
        let grids = CubeFace::ALL
            .iter()
            .map(|&face| HeightSampleGrid::build(face, &body, heights))
            .collect::<Result<Vec<_>, _>>()?;
        let trees = grids
            .iter()
            .map(|grid| FaceQuadtree::new(grid.face(), &body, grid))
            .collect();

        tracing::debug!(
            radius = body.radius,
            grid_resolution = body.height_grid_resolution,
            "cube face set created"
        );

        Ok(Self {
            body,
            grids,
            trees,
            camera: None,
        })
    }

    /// Shared body parameters.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Position passed to the last [`CubeFaceSet::set_camera_position`].
    pub fn camera(&self) -> Option<DVec3> {
        self.camera
    }

    /// Rebuild all six trees for `camera`, then resolve every leaf's neighbors.
    ///
    /// Same-face subdivision finishes on every face before any neighbor is
    /// looked up, since a leaf's neighbor may sit on a face processed later.
    pub fn set_camera_position(&mut self, camera: DVec3) {
        let start = Instant::now();
        for (tree, grid) in self.trees.iter_mut().zip(&self.grids) {
            tree.rebuild(camera, &self.body, grid);
        }
        self.resolve_neighbors();
        self.camera = Some(camera);

        tracing::debug!(
            leaves = self.leaf_count(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "cube face set rebuilt"
        );
    }

    fn resolve_neighbors(&mut self) {
        let mut links = Vec::new();
        for tree in &self.trees {
            for &id in tree.leaf_ids() {
                let leaf = tree.node(id);
                for dir in FaceDirection::ALL {
                    let (face, point) = self.point_across(tree.face(), leaf, dir);
                    let other = &self.trees[face.index()];
                    if let Some(found) = other.find_node(point, leaf.address.depth) {
                        let neighbor = NeighborRef {
                            face,
                            node: found,
                            size: other.node(found).size,
                        };
                        links.push((tree.face(), id, dir, neighbor));
                    }
                }
            }
        }
        for (face, id, dir, neighbor) in links {
            self.trees[face.index()].set_neighbor(id, dir, neighbor);
        }
    }

    /// Center of the same-size cell across `dir`, on whichever face holds it.
    fn point_across(
        &self,
        face: CubeFace,
        leaf: &QuadNode,
        dir: FaceDirection,
    ) -> (CubeFace, DVec2) {
        let h = self.body.half_extent();
        let step = match dir {
            FaceDirection::North => DVec2::Y,
            FaceDirection::South => DVec2::NEG_Y,
            FaceDirection::East => DVec2::X,
            FaceDirection::West => DVec2::NEG_X,
        };
        let point = leaf.center + step * leaf.size;
        if point.x.abs() < h && point.y.abs() < h {
            return (face, point);
        }
        let along = if dir.is_horizontal_edge() {
            leaf.center.x
        } else {
            leaf.center.y
        };
        map_across_edge(face, dir, along, leaf.size * 0.5, h)
    }

    /// Current leaves grouped by face.
    pub fn leaves(&self) -> Vec<FaceLeaves> {
        self.trees
            .iter()
            .map(|tree| FaceLeaves {
                face: tree.face(),
                transform: tree.face().orientation(),
                leaves: tree.leaves().map(LeafNode::from_node).collect(),
            })
            .collect()
    }

    /// Iterate over all current leaves on all faces.
    pub fn iter_leaves(&self) -> impl Iterator<Item = LeafNode> + '_ {
        self.trees
            .iter()
            .flat_map(|tree| tree.leaves().map(LeafNode::from_node))
    }

    /// Number of leaves across all faces.
    pub fn leaf_count(&self) -> usize {
        self.trees.iter().map(|t| t.leaf_ids().len()).sum()
    }

    /// Quadtree of `face`.
    pub fn tree(&self, face: CubeFace) -> &FaceQuadtree {
        &self.trees[face.index()]
    }

    /// Coarse height grid of `face`.
    pub fn height_grid(&self, face: CubeFace) -> &HeightSampleGrid {
        &self.grids[face.index()]
    }

    /// Raw `(min, max)` height over a face-local rectangle of `face`.
    pub fn sample_heights(
        &self,
        face: CubeFace,
        u_min: f64,
        u_max: f64,
        v_min: f64,
        v_max: f64,
    ) -> (f64, f64) {
        self.grids[face.index()].sample(u_min, u_max, v_min, v_max)
    }
}
