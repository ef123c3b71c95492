//! Arena-backed quadtree over one cube face, rebuilt from scratch per camera update.

use glam::{DVec2, DVec3};
use regolith_cubesphere::{CubeFace, FaceDirection};

use crate::{Body, EdgeStrides, FaceRect, HeightSampleGrid, NodeAddress};

/// Index of a node inside its [`FaceQuadtree`] arena.
///
/// Only valid until the next rebuild of the tree that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Position in the arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The touching node across one edge of a leaf.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborRef {
    /// Face the neighbor lives on (differs from the leaf's at face seams).
    pub face: CubeFace,
    /// Neighbor node in that face's arena.
    pub node: NodeId,
    /// Neighbor edge length, never smaller than the leaf's.
    pub size: f64,
}

/// One node of a face quadtree.
#[derive(Clone, Debug)]
pub struct QuadNode {
    /// Face, depth and cell of this node.
    pub address: NodeAddress,
    /// Face-local footprint.
    pub bounds: FaceRect,
    /// Face-local center.
    pub center: DVec2,
    /// Edge length in face-local units.
    pub size: f64,
    /// Center projected onto the body at the lowest sampled height in the footprint.
    pub sphere_center: DVec3,
    /// Children in bottom-left, bottom-right, top-left, top-right order; `None` for a leaf.
    pub children: Option<[NodeId; 4]>,
    /// Touching node per direction, indexed by [`FaceDirection::index`]. Filled for leaves only.
    pub neighbors: [Option<NeighborRef>; 4],
}

impl QuadNode {
    fn new(address: NodeAddress, body: &Body, grid: &HeightSampleGrid) -> Self {
        let bounds = address.bounds(body.half_extent());
        let center = bounds.center();
        let (min_height, _) = grid.sample(bounds.min.x, bounds.max.x, bounds.min.y, bounds.max.y);
        Self {
            address,
            bounds,
            center,
            size: address.size(body.half_extent()),
            sphere_center: body.surface_point(address.face, center, min_height),
            children: None,
            neighbors: [None; 4],
        }
    }

    /// Only leaves are rendered.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Neighbor across `dir`, if resolved.
    pub fn neighbor(&self, dir: FaceDirection) -> Option<&NeighborRef> {
        self.neighbors[dir.index()].as_ref()
    }

    /// Stitching stride per edge: `max(1, neighbor_size / size)`.
    pub fn strides(&self) -> EdgeStrides {
        let mut strides = EdgeStrides::UNIFORM;
        for dir in FaceDirection::ALL {
            if let Some(n) = self.neighbor(dir) {
                let ratio = (n.size / self.size).round();
                strides.set(dir, (ratio as u32).max(1));
            }
        }
        strides
    }
}

/// Quadtree partition of one cube face.
///
/// The root always spans the whole face. [`FaceQuadtree::rebuild`] discards
/// every node and subdivides again from the root, so [`NodeId`]s do not
/// survive a rebuild.
#[derive(Clone, Debug)]
pub struct FaceQuadtree {
    face: CubeFace,
    nodes: Vec<QuadNode>,
    leaves: Vec<NodeId>,
}

impl FaceQuadtree {
    /// A tree holding only the root leaf.
    pub fn new(face: CubeFace, body: &Body, grid: &HeightSampleGrid) -> Self {
        let root = QuadNode::new(NodeAddress::root(face), body, grid);
        Self {
            face,
            nodes: vec![root],
            leaves: vec![NodeId(0)],
        }
    }

    /// Face this tree partitions.
    pub fn face(&self) -> CubeFace {
        self.face
    }

    /// Recompute the leaf set for a camera at `camera` (body-centered world space).
    ///
    /// Neighbor links are cleared; the owning [`crate::CubeFaceSet`] resolves
    /// them once every face has been rebuilt.
    pub fn rebuild(&mut self, camera: DVec3, body: &Body, grid: &HeightSampleGrid) {
        self.nodes.clear();
        self.leaves.clear();
        self.nodes.push(QuadNode::new(NodeAddress::root(self.face), body, grid));

        let mut stack = vec![NodeId(0)];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.index()];
            let distance = node.sphere_center.distance(camera);
            if !body.should_split(distance, node.size)
                || node.address.depth >= NodeAddress::MAX_DEPTH
            {
                self.leaves.push(id);
                continue;
            }

            let first = self.nodes.len() as u32;
            let children = node.address.children();
            for address in children {
                self.nodes.push(QuadNode::new(address, body, grid));
            }
            let ids = [
                NodeId(first),
                NodeId(first + 1),
                NodeId(first + 2),
                NodeId(first + 3),
            ];
            self.nodes[id.index()].children = Some(ids);
            // Reversed so the bottom-left child is expanded first.
            stack.extend(ids.iter().rev());
        }
    }

    /// Node by id.
    #[inline]
    pub fn node(&self, id: NodeId) -> &QuadNode {
        &self.nodes[id.index()]
    }

    /// The whole-face root.
    pub fn root(&self) -> &QuadNode {
        &self.nodes[0]
    }

    /// Ids of all current leaves.
    pub fn leaf_ids(&self) -> &[NodeId] {
        &self.leaves
    }

    /// Iterate over all current leaves.
    pub fn leaves(&self) -> impl Iterator<Item = &QuadNode> + '_ {
        self.leaves.iter().map(|&id| self.node(id))
    }

    /// Total number of nodes, interior ones included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest node containing `point` whose depth does not exceed `max_depth`.
    ///
    /// Returns `None` when `point` lies outside the face.
    pub fn find_node(&self, point: DVec2, max_depth: u8) -> Option<NodeId> {
        let mut id = NodeId(0);
        if !self.node(id).bounds.contains(point) {
            return None;
        }
        loop {
            let node = self.node(id);
            let Some(children) = node.children else {
                return Some(id);
            };
            if node.address.depth >= max_depth {
                return Some(id);
            }
            let east = usize::from(point.x >= node.center.x);
            let north = usize::from(point.y >= node.center.y);
            id = children[east + 2 * north];
        }
    }

    pub(crate) fn set_neighbor(&mut self, id: NodeId, dir: FaceDirection, neighbor: NeighborRef) {
        self.nodes[id.index()].neighbors[dir.index()] = Some(neighbor);
    }
}
