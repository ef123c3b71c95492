//! The renderable unit bound to one quadtree leaf, and its vertex format.

use glam::{DVec2, DVec3};
use regolith_cubesphere::CubeFace;
use regolith_lod::{ChunkKey, LeafNode};

use crate::{ChunkGeometry, SurfaceData, TerrainError, apron_len};

/// Coordinator-assigned chunk identity. Survives pooling and reuse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub u64);

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a chunk is in its lifecycle.
///
/// `Allocated -> AwaitingGeometry -> AwaitingSurfaceData -> Ready -> Visible
/// -> Retired -> Pooled`, after which [`Chunk::reconfigure`] starts over.
/// A chunk that is not pooled is disposed instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkState {
    Allocated,
    AwaitingGeometry,
    AwaitingSurfaceData,
    Ready,
    Visible,
    Retired,
    Pooled,
}

/// Everything a chunk needs to know about the leaf it renders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkParams {
    /// Stable identity of the leaf and its edge stitching.
    pub key: ChunkKey,
    /// Face-local center of the leaf.
    pub center: DVec2,
    /// Leaf edge length.
    pub size: f64,
    /// World-space anchor the vertex positions are relative to.
    pub origin: DVec3,
    /// Quads per edge.
    pub resolution: u32,
}

impl ChunkParams {
    /// Parameters for rendering `leaf` at `resolution` quads per edge.
    pub fn from_leaf(leaf: &LeafNode, resolution: u32) -> Self {
        Self {
            key: leaf.key,
            center: leaf.center,
            size: leaf.size,
            origin: leaf.sphere_center,
            resolution,
        }
    }

    /// Face of the leaf.
    pub fn face(&self) -> CubeFace {
        self.key.address.face
    }

    /// Quadtree depth, which fixes the edge size.
    pub fn depth(&self) -> u8 {
        self.key.address.depth
    }

    /// `(resolution + 1)^2`.
    pub fn vertex_count(&self) -> usize {
        let side = self.resolution as usize + 1;
        side * side
    }
}

/// Interleaved vertex for GPU upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TerrainVertex {
    /// Position relative to the chunk origin.
    pub position: [f32; 3],
    /// Outward unit normal.
    pub normal: [f32; 3],
    /// RGBA8 color.
    pub color: [u8; 4],
}

static_assertions::assert_eq_size!(TerrainVertex, [u8; 28]);

/// Triangle list for a `(resolution + 1)^2` vertex grid, row-major from the
/// face-local `(-x, -y)` corner.
///
/// Triangles wind counter-clockwise in face-local space, which is outward
/// facing on every cube face.
pub fn grid_indices(resolution: u32) -> Vec<u32> {
    let side = resolution + 1;
    let mut indices = Vec::with_capacity((resolution * resolution * 6) as usize);
    for y in 0..resolution {
        for x in 0..resolution {
            let bl = y * side + x;
            let br = bl + 1;
            let tl = bl + side;
            let tr = tl + 1;
            indices.extend_from_slice(&[bl, br, tr, bl, tr, tl]);
        }
    }
    indices
}

/// Geometry buffers and lifecycle of one rendered leaf.
///
/// Buffers always hold exactly `(resolution + 1)^2` entries.
#[derive(Debug)]
pub struct Chunk {
    id: ChunkId,
    params: ChunkParams,
    state: ChunkState,
    token: u64,
    visible: bool,
    positions: Vec<[f32; 3]>,
    apron: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    colors: Vec<[u8; 4]>,
}

impl Chunk {
    /// A freshly constructed chunk with zeroed buffers.
    pub fn new(id: ChunkId, params: ChunkParams) -> Self {
        let n = params.vertex_count();
        Self {
            id,
            params,
            state: ChunkState::Allocated,
            token: 0,
            visible: false,
            positions: vec![[0.0; 3]; n],
            apron: vec![[0.0; 3]; apron_len(params.resolution)],
            normals: vec![[0.0; 3]; n],
            colors: vec![[0; 4]; n],
        }
    }

    /// Reinitialize a pooled chunk for a new leaf.
    ///
    /// Buffers are resized to the new vertex count and zeroed so nothing from
    /// the previous leaf survives.
    pub fn reconfigure(&mut self, params: ChunkParams) {
        let n = params.vertex_count();
        for buf in [&mut self.positions, &mut self.normals] {
            buf.clear();
            buf.resize(n, [0.0; 3]);
        }
        self.apron.clear();
        self.apron.resize(apron_len(params.resolution), [0.0; 3]);
        self.colors.clear();
        self.colors.resize(n, [0; 4]);
        self.params = params;
        self.state = ChunkState::Allocated;
        self.visible = false;
    }

    /// Expect geometry tagged with `token`.
    pub fn begin_build(&mut self, token: u64) {
        self.token = token;
        self.state = ChunkState::AwaitingGeometry;
    }

    /// Store built positions and advance to [`ChunkState::AwaitingSurfaceData`].
    ///
    /// Rejects results for any other token or for a chunk that is not waiting
    /// for geometry, and buffers of the wrong length.
    pub fn assign_geometry(
        &mut self,
        token: u64,
        geometry: &ChunkGeometry,
    ) -> Result<(), TerrainError> {
        if token != self.token || self.state != ChunkState::AwaitingGeometry {
            return Err(TerrainError::StaleResult {
                chunk: self.id,
                expected: self.token,
                received: token,
            });
        }
        for (expected, received) in [
            (self.positions.len(), geometry.positions.len()),
            (self.apron.len(), geometry.apron.len()),
        ] {
            if received != expected {
                return Err(TerrainError::GeometryLength { expected, received });
            }
        }
        self.positions.copy_from_slice(&geometry.positions);
        self.apron.copy_from_slice(&geometry.apron);
        self.state = ChunkState::AwaitingSurfaceData;
        Ok(())
    }

    /// Store synthesized normals and colors and advance to [`ChunkState::Ready`].
    ///
    /// Only a chunk whose geometry has arrived accepts surface data.
    pub fn assign_surface_data(&mut self, data: &SurfaceData) -> Result<(), TerrainError> {
        if self.state != ChunkState::AwaitingSurfaceData {
            return Err(TerrainError::UnexpectedState {
                chunk: self.id,
                state: self.state,
            });
        }
        let expected = self.positions.len();
        for received in [data.normals.len(), data.colors.len()] {
            if received != expected {
                return Err(TerrainError::GeometryLength { expected, received });
            }
        }
        self.normals.copy_from_slice(&data.normals);
        self.colors.copy_from_slice(&data.colors);
        self.state = ChunkState::Ready;
        Ok(())
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Reveal a ready chunk. Has no effect before surface data arrives.
    pub fn show(&mut self) {
        if matches!(self.state, ChunkState::Ready | ChunkState::Visible) {
            self.state = ChunkState::Visible;
            self.visible = true;
        }
    }

    /// Remove from the visible set ahead of pooling or disposal.
    pub fn retire(&mut self) {
        self.visible = false;
        self.state = ChunkState::Retired;
    }

    pub(crate) fn mark_pooled(&mut self) {
        self.state = ChunkState::Pooled;
    }

    /// Release the chunk's buffers for good.
    pub fn dispose(self) {
        tracing::trace!(chunk = %self.id, key = %self.params.key, "chunk disposed");
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn params(&self) -> &ChunkParams {
        &self.params
    }

    pub fn key(&self) -> ChunkKey {
        self.params.key
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Token of the build this chunk currently expects.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Positions relative to [`ChunkParams::origin`].
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    /// Surface samples one step past each edge, for border normals.
    pub fn apron(&self) -> &[[f32; 3]] {
        &self.apron
    }

    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    /// Interleave the buffers for upload alongside [`grid_indices`].
    pub fn vertices(&self) -> Vec<TerrainVertex> {
        self.positions
            .iter()
            .zip(&self.normals)
            .zip(&self.colors)
            .map(|((&position, &normal), &color)| TerrainVertex {
                position,
                normal,
                color,
            })
            .collect()
    }
}
