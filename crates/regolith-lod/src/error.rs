//! Errors raised while constructing the LOD structures.

use regolith_config::ConfigError;
use regolith_cubesphere::CubeFace;

/// Errors that prevent a [`CubeFaceSet`](crate::CubeFaceSet) from being built.
#[derive(Debug, thiserror::Error)]
pub enum LodError {
    /// The body configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The height source produced a non-finite sample for the coarse grid.
    #[error("height source returned {value} on {face:?} at grid sample ({x}, {y})")]
    HeightSynthesis {
        /// Face being sampled.
        face: CubeFace,
        /// Grid column.
        x: usize,
        /// Grid row.
        y: usize,
        /// The offending value.
        value: f64,
    },
}
