//! Chunk lifecycle for cube-sphere terrain: allocation, background geometry
//! builds, time-sliced surface synthesis, and atomic wave swaps.
//!
//! [`TerrainBuildCoordinator`] is the host-facing entry point. It turns each
//! camera update of a [`regolith_lod::CubeFaceSet`] into a build wave, hands
//! geometry jobs to a [`BuildWorker`], and reveals the whole wave at once when
//! every new chunk is ready. Retired chunks are recycled through a [`ChunkPool`].

mod build;
mod chunk;
mod coordinator;
mod error;
mod height;
mod pool;
mod surface;

pub use build::{
    BuildJob, BuildResult, BuildWorker, ChunkGeometry, InlineBuildWorker, ThreadedBuildWorker,
    apron_len, build_chunk_geometry,
};
pub use chunk::{Chunk, ChunkId, ChunkParams, ChunkState, TerrainVertex, grid_indices};
pub use coordinator::{
    CameraUpdate, CoordinatorStats, Renderable, SynthesisReport, TerrainBuildCoordinator,
    UpdateOutcome,
};
pub use error::{BuildError, PoolError, TerrainError};
pub use height::{NoiseHeightSource, NoiseParams};
pub use pool::{ChunkPool, ReleaseOutcome};
pub use surface::{ColorRamp, RampSurfaceSynthesizer, SurfaceData, SurfaceInput, SurfaceSynthesizer};
