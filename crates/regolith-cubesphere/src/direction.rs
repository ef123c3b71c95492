//! Cardinal directions in a face's local plane.

/// Cardinal directions on a cube face in face-local space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaceDirection {
    /// Increasing `y` (up).
    North,
    /// Decreasing `y` (down).
    South,
    /// Increasing `x` (right).
    East,
    /// Decreasing `x` (left).
    West,
}

impl FaceDirection {
    /// All four cardinal directions, in slot order.
    pub const ALL: [FaceDirection; 4] = [
        FaceDirection::North,
        FaceDirection::South,
        FaceDirection::East,
        FaceDirection::West,
    ];

    /// Slot of this direction in [`FaceDirection::ALL`], for per-direction arrays.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            FaceDirection::North => 0,
            FaceDirection::South => 1,
            FaceDirection::East => 2,
            FaceDirection::West => 3,
        }
    }

    /// The direction pointing the other way on the same face.
    #[must_use]
    pub fn opposite(self) -> FaceDirection {
        match self {
            FaceDirection::North => FaceDirection::South,
            FaceDirection::South => FaceDirection::North,
            FaceDirection::East => FaceDirection::West,
            FaceDirection::West => FaceDirection::East,
        }
    }

    /// Whether the edge in this direction runs along the `x` axis.
    #[must_use]
    pub fn is_horizontal_edge(self) -> bool {
        matches!(self, FaceDirection::North | FaceDirection::South)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_all_order() {
        for (i, dir) in FaceDirection::ALL.iter().enumerate() {
            assert_eq!(dir.index(), i);
        }
    }

    #[test]
    fn test_opposite_is_involution() {
        for dir in FaceDirection::ALL {
            assert_ne!(dir.opposite(), dir);
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }
}
