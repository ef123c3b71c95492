//! Coarse per-face height samples used to bias LOD distance checks.

use glam::{DVec2, DVec3};
use regolith_cubesphere::{CubeFace, face_point_to_direction};

use crate::{Body, LodError};

/// Source of raw terrain heights, sampled on the unit sphere.
///
/// Returned heights are unweighted; [`Body::displacement_weight`] scales them.
pub trait HeightSource: Send + Sync {
    /// Height at a unit direction from the body center.
    fn height(&self, direction: DVec3) -> f64;
}

impl<F> HeightSource for F
where
    F: Fn(DVec3) -> f64 + Send + Sync,
{
    fn height(&self, direction: DVec3) -> f64 {
        self(direction)
    }
}

/// An `N x N` grid of raw heights covering one face's `[-h, h]^2` extent.
///
/// Built once at engine construction, read-only afterwards.
#[derive(Clone, Debug)]
pub struct HeightSampleGrid {
    face: CubeFace,
    resolution: usize,
    half_extent: f64,
    samples: Vec<f64>,
}

impl HeightSampleGrid {
    /// Sample `heights` at `body.height_grid_resolution` points per axis.
    ///
    /// Fails if any sample is not finite.
    pub fn build(
        face: CubeFace,
        body: &Body,
        heights: &dyn HeightSource,
    ) -> Result<Self, LodError> {
        let resolution = body.height_grid_resolution.max(2);
        let half_extent = body.half_extent();
        let spacing = 2.0 * half_extent / (resolution - 1) as f64;

        let mut samples = Vec::with_capacity(resolution * resolution);
        for y in 0..resolution {
            for x in 0..resolution {
                let local = DVec2::new(
                    -half_extent + x as f64 * spacing,
                    -half_extent + y as f64 * spacing,
                );
                let value = heights.height(face_point_to_direction(face, local, half_extent));
                if !value.is_finite() {
                    return Err(LodError::HeightSynthesis { face, x, y, value });
                }
                samples.push(value);
            }
        }

        Ok(Self {
            face,
            resolution,
            half_extent,
            samples,
        })
    }

    /// Face this grid covers.
    pub fn face(&self) -> CubeFace {
        self.face
    }

    /// Samples per axis.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Raw sample at grid column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.samples[y * self.resolution + x]
    }

    /// Minimum and maximum raw height over a face-local rectangle.
    ///
    /// The scanned sample window is widened to the enclosing grid cells so
    /// that rectangles smaller than a cell still see their surrounding samples.
    pub fn sample(&self, u_min: f64, u_max: f64, v_min: f64, v_max: f64) -> (f64, f64) {
        let (x0, x1) = self.index_range(u_min, u_max);
        let (y0, y1) = self.index_range(v_min, v_max);

        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for y in y0..=y1 {
            let row = &self.samples[y * self.resolution..(y + 1) * self.resolution];
            for &h in &row[x0..=x1] {
                lo = lo.min(h);
                hi = hi.max(h);
            }
        }
        (lo, hi)
    }

    fn index_range(&self, a: f64, b: f64) -> (usize, usize) {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        let last = (self.resolution - 1) as f64;
        let scale = last / (2.0 * self.half_extent);
        let to_index = |v: f64| ((v + self.half_extent) * scale).clamp(0.0, last);
        (to_index(a).floor() as usize, to_index(b).ceil() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regolith_config::BodyConfig;

    fn flat(_: DVec3) -> f64 {
        0.0
    }

    fn body(grid: u32) -> Body {
        Body::from_config(&BodyConfig {
            radius: 100.0,
            height_grid_resolution: grid,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_flat_source_gives_zero_range() {
        let grid = HeightSampleGrid::build(CubeFace::PosX, &body(8), &flat).unwrap();
        assert_eq!(grid.sample(-100.0, 100.0, -100.0, 100.0), (0.0, 0.0));
    }

    #[test]
    fn test_sub_rectangle_min_max() {
        // Height grows with the world x coordinate; on PosZ, local x == world x direction.
        let grid = HeightSampleGrid::build(CubeFace::PosZ, &body(5), &|d: DVec3| d.x).unwrap();
        let (full_lo, full_hi) = grid.sample(-100.0, 100.0, -100.0, 100.0);
        let (lo, hi) = grid.sample(50.0, 100.0, -10.0, 10.0);
        assert!(lo > full_lo);
        assert!((hi - full_hi).abs() < 1e-12);
        assert!(lo <= hi);
    }

    #[test]
    fn test_corner_samples_match_source() {
        let grid = HeightSampleGrid::build(CubeFace::NegY, &body(4), &|d: DVec3| d.z).unwrap();
        let expected = face_point_to_direction(CubeFace::NegY, DVec2::new(-100.0, -100.0), 100.0);
        assert!((grid.get(0, 0) - expected.z).abs() < 1e-12);
        assert_eq!(grid.resolution(), 4);
        assert_eq!(grid.face(), CubeFace::NegY);
    }

    #[test]
    fn test_out_of_range_rectangle_is_clamped() {
        let grid = HeightSampleGrid::build(CubeFace::PosX, &body(6), &|d: DVec3| d.y).unwrap();
        let inside = grid.sample(-100.0, 100.0, -100.0, 100.0);
        let outside = grid.sample(-500.0, 500.0, -500.0, 500.0);
        assert_eq!(inside, outside);
    }

    #[test]
    fn test_non_finite_height_fails_construction() {
        let result = HeightSampleGrid::build(CubeFace::PosX, &body(4), &|_: DVec3| f64::NAN);
        assert!(matches!(
            result,
            Err(LodError::HeightSynthesis { x: 0, y: 0, .. })
        ));
    }
}
