//! Cube faces and the orientation transform that places each one on the body.

use glam::{DMat3, DVec3};

/// One of the six cube faces, named by the axis its outward normal points along.
///
/// The discriminant is the face index used in chunk keys and adjacency lookups.
/// Opposite faces sit at adjacent even/odd indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CubeFace {
    PosX = 0,
    NegX = 1,
    PosY = 2,
    NegY = 3,
    PosZ = 4,
    NegZ = 5,
}

/// `(outward normal, +x tangent)` per face, indexed by discriminant.
///
/// The bitangent is `normal × tangent`, which makes every basis right-handed.
const BASES: [(DVec3, DVec3); 6] = [
    (DVec3::X, DVec3::NEG_Z),
    (DVec3::NEG_X, DVec3::Z),
    (DVec3::Y, DVec3::X),
    (DVec3::NEG_Y, DVec3::X),
    (DVec3::Z, DVec3::X),
    (DVec3::NEG_Z, DVec3::NEG_X),
];

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    #[must_use]
    pub fn from_index(index: usize) -> Option<CubeFace> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The face across the body center.
    #[must_use]
    pub fn opposite(self) -> CubeFace {
        Self::ALL[self.index() ^ 1]
    }

    /// Outward unit normal; face-local `z`.
    #[must_use]
    pub fn normal(self) -> DVec3 {
        BASES[self.index()].0
    }

    /// Direction of increasing face-local `x`.
    #[must_use]
    pub fn tangent(self) -> DVec3 {
        BASES[self.index()].1
    }

    /// Direction of increasing face-local `y`.
    #[must_use]
    pub fn bitangent(self) -> DVec3 {
        let (normal, tangent) = BASES[self.index()];
        normal.cross(tangent)
    }

    /// Rotation taking face-local `(x, y, z)` to world space.
    ///
    /// Columns are tangent, bitangent and normal.
    #[must_use]
    pub fn orientation(self) -> DMat3 {
        DMat3::from_cols(self.tangent(), self.bitangent(), self.normal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        for (i, face) in CubeFace::ALL.iter().enumerate() {
            assert_eq!(face.index(), i);
            assert_eq!(CubeFace::from_index(i), Some(*face));
        }
        assert_eq!(CubeFace::from_index(6), None);
    }

    #[test]
    fn test_opposite_pairs() {
        assert_eq!(CubeFace::PosX.opposite(), CubeFace::NegX);
        assert_eq!(CubeFace::NegY.opposite(), CubeFace::PosY);
        assert_eq!(CubeFace::PosZ.opposite(), CubeFace::NegZ);
        for face in CubeFace::ALL {
            assert_eq!(face.opposite().opposite(), face);
            assert!((face.normal() + face.opposite().normal()).length() < 1e-12);
        }
    }

    #[test]
    fn test_bitangents_match_axis_layout() {
        assert_eq!(CubeFace::PosX.bitangent(), DVec3::Y);
        assert_eq!(CubeFace::NegX.bitangent(), DVec3::Y);
        assert_eq!(CubeFace::PosY.bitangent(), DVec3::NEG_Z);
        assert_eq!(CubeFace::NegY.bitangent(), DVec3::Z);
        assert_eq!(CubeFace::PosZ.bitangent(), DVec3::Y);
        assert_eq!(CubeFace::NegZ.bitangent(), DVec3::Y);
    }

    #[test]
    fn test_orientation_is_proper_rotation() {
        for face in CubeFace::ALL {
            let m = face.orientation();
            assert!((m.determinant() - 1.0).abs() < 1e-12, "{face:?} is not proper");
            assert!((m * DVec3::Z - face.normal()).length() < 1e-12);
            let cross = face.tangent().cross(face.bitangent());
            assert!((cross - face.normal()).length() < 1e-12, "{face:?}: {cross:?}");
        }
    }
}
