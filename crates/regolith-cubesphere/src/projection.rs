//! Face-local plane to cube surface and unit sphere.
//!
//! Face-local coordinates span `[-half_extent, half_extent]` on both axes, with
//! the origin at the face center.

use glam::{DVec2, DVec3};

use crate::CubeFace;

/// Point on the surface of the cube with half-width `half_extent`.
#[inline]
#[must_use]
pub fn face_point_to_cube(face: CubeFace, local: DVec2, half_extent: f64) -> DVec3 {
    face.normal() * half_extent + face.tangent() * local.x + face.bitangent() * local.y
}

/// Unit direction from the body center through a face-local point.
#[inline]
#[must_use]
pub fn face_point_to_direction(face: CubeFace, local: DVec2, half_extent: f64) -> DVec3 {
    face_point_to_cube(face, local, half_extent).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_face_center_maps_to_normal() {
        for face in CubeFace::ALL {
            let dir = face_point_to_direction(face, DVec2::ZERO, 500.0);
            assert!(
                (dir - face.normal()).length() < EPSILON,
                "Face center of {face:?} did not map to normal: {dir:?}"
            );
        }
    }

    #[test]
    fn test_directions_are_unit_length() {
        let h = 1000.0;
        for face in CubeFace::ALL {
            for &(x, y) in &[(-h, -h), (h, -h), (0.3 * h, -0.7 * h), (h, h)] {
                let dir = face_point_to_direction(face, DVec2::new(x, y), h);
                assert!((dir.length() - 1.0).abs() < EPSILON);
            }
        }
    }

    #[test]
    fn test_corner_is_diagonal() {
        let h = 2.0;
        let p = face_point_to_cube(CubeFace::PosZ, DVec2::new(h, h), h);
        assert!((p - DVec3::new(2.0, 2.0, 2.0)).length() < EPSILON);
    }

    #[test]
    fn test_projection_is_scale_invariant() {
        let a = face_point_to_direction(CubeFace::NegY, DVec2::new(0.25, -0.5), 1.0);
        let b = face_point_to_direction(CubeFace::NegY, DVec2::new(250.0, -500.0), 1000.0);
        assert!((a - b).length() < EPSILON);
    }
}
