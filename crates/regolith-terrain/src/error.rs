//! Error types for chunk building, pooling and surface synthesis.

use regolith_lod::LodError;

use crate::{ChunkId, ChunkState};

/// Errors surfaced by the terrain coordinator and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    /// Engine construction failed in the LOD layer (bad config or height grid).
    #[error(transparent)]
    Lod(#[from] LodError),

    /// Surface synthesis was requested before the color ramp was loaded.
    #[error("surface synthesis requested before the color ramp was loaded")]
    SynthesisNotReady,

    /// A build result carried a token the chunk no longer expects.
    #[error("stale build result for chunk {chunk}: expected token {expected}, received {received}")]
    StaleResult {
        chunk: ChunkId,
        expected: u64,
        received: u64,
    },

    /// A buffer handed to a chunk does not match its vertex count.
    #[error("buffer holds {received} vertices, chunk expects {expected}")]
    GeometryLength { expected: usize, received: usize },

    /// A chunk was handed data its lifecycle state does not accept.
    #[error("chunk {chunk} cannot accept this data in state {state:?}")]
    UnexpectedState { chunk: ChunkId, state: ChunkState },

    /// A background build job failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The surface synthesizer rejected its input.
    #[error("surface synthesis failed: {0}")]
    Synthesis(String),

    /// A chunk pool invariant was violated.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Color ramp data could not be decoded.
    #[error("invalid color ramp: {0}")]
    ColorRamp(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Violations detected when a chunk is returned to the [`ChunkPool`](crate::ChunkPool).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("chunk {chunk} released in state {state:?}, expected Retired")]
    NotRetired { chunk: ChunkId, state: ChunkState },

    #[error("chunk {chunk} is already pooled")]
    DoubleRelease { chunk: ChunkId },

    #[error("chunk {chunk} has {actual} vertices, pool holds {expected}-vertex chunks")]
    BufferSizeMismatch {
        chunk: ChunkId,
        expected: usize,
        actual: usize,
    },
}

/// Failure reported by a background build job.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// A generated vertex was NaN or infinite.
    #[error("vertex {index} is not finite")]
    NonFinite { index: usize },

    /// The height source panicked while the job was running.
    #[error("build panicked: {message}")]
    Panicked { message: String },
}
