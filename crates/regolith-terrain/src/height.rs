//! Default height source: fractal Brownian motion over 3D simplex noise.
//!
//! Sampling on the unit direction rather than on face-local coordinates
//! keeps the field continuous across cube-face seams.

use glam::DVec3;
use noise::{NoiseFn, Simplex};
use regolith_lod::HeightSource;

/// Parameters of the fBm height field.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseParams {
    /// Seed for the permutation table.
    pub seed: u32,
    /// Number of octaves composited.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per unit direction.
    pub base_frequency: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 6,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 1.5,
        }
    }
}

/// Heights in roughly `[-1, 1]`, scaled by the body's displacement weight downstream.
pub struct NoiseHeightSource {
    noise: Simplex,
    params: NoiseParams,
    normalizer: f64,
}

impl NoiseHeightSource {
    pub fn new(params: NoiseParams) -> Self {
        let mut sum = 0.0;
        let mut amp = 1.0;
        for _ in 0..params.octaves {
            sum += amp;
            amp *= params.persistence;
        }
        Self {
            noise: Simplex::new(params.seed),
            normalizer: if sum > 0.0 { 1.0 / sum } else { 0.0 },
            params,
        }
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }
}

impl HeightSource for NoiseHeightSource {
    fn height(&self, direction: DVec3) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = 1.0;

        for _ in 0..self.params.octaves {
            let p = direction * frequency;
            total += self.noise.get([p.x, p.y, p.z]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total * self.normalizer
    }
}
