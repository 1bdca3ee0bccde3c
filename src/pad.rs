//! Pad addressing and grid rotation
//!
//! Pads are addressed the way the Launchpad reports them in programmer mode:
//! `row * 10 + col`, with the 8x8 grid occupying rows and columns 1-8. The
//! top button row (row 9) and the side button column (column 9) sit outside
//! the grid.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single button/LED cell on the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pad(u8);

impl Pad {
    /// Largest addressable pad (row 9, column 9)
    pub const MAX: u8 = 99;

    /// Create a pad from its raw note number
    pub const fn new(note: u8) -> Self {
        Self(note)
    }

    /// Create a pad from row and column (0-9 each)
    pub fn from_row_col(row: u8, col: u8) -> Option<Self> {
        if row > 9 || col > 9 {
            return None;
        }
        Some(Self(row * 10 + col))
    }

    /// Raw note number
    pub const fn note(self) -> u8 {
        self.0
    }

    pub const fn row(self) -> u8 {
        self.0 / 10
    }

    pub const fn col(self) -> u8 {
        self.0 % 10
    }

    /// True if the pad is addressable at all (0-99)
    pub const fn is_valid(self) -> bool {
        self.0 <= Self::MAX
    }

    /// True if the pad lies inside the 8x8 grid
    pub const fn is_grid(self) -> bool {
        let (row, col) = (self.row(), self.col());
        row >= 1 && row <= 8 && col >= 1 && col <= 8
    }

    /// Every pad present on the physical surface: the grid plus the top row
    /// and side column (rows/columns 1-9)
    pub fn surface() -> impl Iterator<Item = Pad> {
        (1..=9u8).flat_map(|row| (1..=9u8).map(move |col| Pad(row * 10 + col)))
    }

    /// Every pad inside the 8x8 grid
    pub fn grid() -> impl Iterator<Item = Pad> {
        (1..=8u8).flat_map(|row| (1..=8u8).map(move |col| Pad(row * 10 + col)))
    }
}

impl From<u8> for Pad {
    fn from(note: u8) -> Self {
        Self(note)
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Grid rotation in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    /// The rotation that undoes this one
    pub fn inverse(self) -> Self {
        match self {
            Rotation::None => Rotation::None,
            Rotation::Cw90 => Rotation::Cw270,
            Rotation::Cw180 => Rotation::Cw180,
            Rotation::Cw270 => Rotation::Cw90,
        }
    }

    /// Rotate a pad. Pads outside the 8x8 grid are returned unchanged.
    pub fn apply(self, pad: Pad) -> Pad {
        if !pad.is_grid() {
            return pad;
        }

        let (row, col) = (pad.row(), pad.col());
        let (row, col) = match self {
            Rotation::None => (row, col),
            Rotation::Cw90 => (col, 9 - row),
            Rotation::Cw180 => (9 - row, 9 - col),
            Rotation::Cw270 => (9 - col, row),
        };
        Pad(row * 10 + col)
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Cw90),
            180 => Ok(Rotation::Cw180),
            270 => Ok(Rotation::Cw270),
            other => Err(format!("rotation must be 0, 90, 180 or 270 (got {})", other)),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Cw90,
        Rotation::Cw180,
        Rotation::Cw270,
    ];

    #[test]
    fn test_row_col() {
        let pad = Pad::new(81);
        assert_eq!(pad.row(), 8);
        assert_eq!(pad.col(), 1);
        assert!(pad.is_grid());
        assert!(!Pad::new(91).is_grid());
        assert!(!Pad::new(19).is_grid());
        assert_eq!(Pad::from_row_col(4, 7), Some(Pad::new(47)));
        assert_eq!(Pad::from_row_col(10, 1), None);
    }

    #[test]
    fn test_180_rotation() {
        // 81 (8,1) -> (1,8)
        assert_eq!(Rotation::Cw180.apply(Pad::new(81)), Pad::new(18));
        assert_eq!(Rotation::Cw180.apply(Pad::new(18)), Pad::new(81));
    }

    #[test]
    fn test_quarter_turns() {
        assert_eq!(Rotation::Cw90.apply(Pad::new(81)), Pad::new(11));
        assert_eq!(Rotation::Cw270.apply(Pad::new(11)), Pad::new(81));
    }

    #[test]
    fn test_non_grid_pads_pass_through() {
        for rotation in ALL {
            assert_eq!(rotation.apply(Pad::new(91)), Pad::new(91));
            assert_eq!(rotation.apply(Pad::new(29)), Pad::new(29));
        }
    }

    #[test]
    fn test_surface_and_grid_sizes() {
        assert_eq!(Pad::surface().count(), 81);
        assert_eq!(Pad::grid().count(), 64);
        assert!(Pad::grid().all(Pad::is_grid));
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::try_from(180), Ok(Rotation::Cw180));
        assert!(Rotation::try_from(45).is_err());
    }

    proptest! {
        #[test]
        fn prop_rotation_round_trip(note in 0u8..=99, idx in 0usize..4) {
            let rotation = ALL[idx];
            let pad = Pad::new(note);
            prop_assert_eq!(rotation.inverse().apply(rotation.apply(pad)), pad);
            prop_assert_eq!(rotation.apply(rotation.inverse().apply(pad)), pad);
        }

        #[test]
        fn prop_identity_rotation(note in 0u8..=99) {
            let pad = Pad::new(note);
            prop_assert_eq!(Rotation::None.apply(pad), pad);
        }

        #[test]
        fn prop_rotation_keeps_grid_pads_in_grid(row in 1u8..=8, col in 1u8..=8, idx in 0usize..4) {
            let pad = Pad::from_row_col(row, col).unwrap();
            prop_assert!(ALL[idx].apply(pad).is_grid());
        }
    }
}
