//! Validated, runtime form of the body configuration.

use glam::{DVec2, DVec3};
use regolith_config::BodyConfig;
use regolith_cubesphere::{CubeFace, face_point_to_direction};

use crate::LodError;

/// Shape and LOD parameters shared read-only by every LOD component.
///
/// Each cube face spans `[-radius, radius]^2` in face-local space, so the
/// root node of a face quadtree has an edge size of `2 * radius`.
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    /// Base radius in meters.
    pub radius: f64,
    /// Per-axis scale applied after projection.
    pub stretch: DVec3,
    /// Multiplier applied to raw heights.
    pub displacement_weight: f64,
    /// Smallest permitted leaf edge length.
    pub min_chunk_size: f64,
    /// Split while `distance < size * split_distance`.
    pub split_distance: f64,
    /// Quads per chunk edge.
    pub sample_resolution: u32,
    /// Samples per axis of each face's coarse height grid.
    pub height_grid_resolution: usize,
}

impl Body {
    /// Validate a [`BodyConfig`] and convert it.
    pub fn from_config(config: &BodyConfig) -> Result<Self, LodError> {
        config.validate()?;
        Ok(Self {
            radius: config.radius,
            stretch: DVec3::from_array(config.stretch),
            displacement_weight: config.displacement_weight,
            min_chunk_size: config.min_chunk_size,
            split_distance: config.chunk_split_distance,
            sample_resolution: config.sample_resolution,
            height_grid_resolution: config.height_grid_resolution as usize,
        })
    }

    /// Half the edge length of a face in face-local units.
    #[inline]
    #[must_use]
    pub fn half_extent(&self) -> f64 {
        self.radius
    }

    /// Edge length of a whole face (the root node size).
    #[inline]
    #[must_use]
    pub fn face_size(&self) -> f64 {
        2.0 * self.radius
    }

    /// Vertices per chunk: `(sample_resolution + 1)^2`.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        let side = self.sample_resolution as usize + 1;
        side * side
    }

    /// Displace a unit direction by `height` and apply the body stretch.
    #[inline]
    #[must_use]
    pub fn project_direction(&self, direction: DVec3, height: f64) -> DVec3 {
        direction * (self.radius + height * self.displacement_weight) * self.stretch
    }

    /// World position (body-centered) of a face-local point raised by `height`.
    #[must_use]
    pub fn surface_point(&self, face: CubeFace, local: DVec2, height: f64) -> DVec3 {
        let direction = face_point_to_direction(face, local, self.half_extent());
        self.project_direction(direction, height)
    }

    /// Elevation of a body-centered point above the undisplaced surface, in meters.
    #[must_use]
    pub fn elevation(&self, point: DVec3) -> f64 {
        (point / self.stretch).length() - self.radius
    }

    /// Whether a node of edge `size` seen from `distance` needs finer detail.
    ///
    /// Nodes smaller than `2 * min_chunk_size` never split, so no leaf falls
    /// below `min_chunk_size`.
    #[inline]
    #[must_use]
    pub fn should_split(&self, distance: f64, size: f64) -> bool {
        distance < size * self.split_distance && size >= 2.0 * self.min_chunk_size
    }
}
