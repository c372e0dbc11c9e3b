//! # Palette Module
//!
//! Voxel colors are stored as a one-byte palette index. This module maps the
//! index to a linear RGBA color for the mesher.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// The fixed voxel palette.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum PaletteColor {
    /// Pure white, also the fallback for unknown indices.
    White = 0,
    /// Terrain surface green used by the noise generators.
    GrassGreen = 1,
    /// Flat green used by the plane generator.
    Green = 2,
    /// Dirt brown.
    Brown = 3,
    /// Neutral grey.
    Stone = 4,
    /// Marker color for analysis overlays.
    Red = 5,
    /// Sky and particle blue.
    Blue = 6,
    /// Near black.
    Black = 7,
}

impl PaletteColor {
    /// Looks up a palette index, falling back to [`PaletteColor::White`].
    pub fn from_index(index: u8) -> Self {
        PaletteColor::from_u8(index).unwrap_or(PaletteColor::White)
    }

    /// Linear RGBA for this entry.
    pub fn rgba(self) -> [f32; 4] {
        match self {
            PaletteColor::White => [1.0, 1.0, 1.0, 1.0],
            PaletteColor::GrassGreen => [0.25, 0.55, 0.15, 1.0],
            PaletteColor::Green => [0.0, 0.8, 0.0, 1.0],
            PaletteColor::Brown => [0.45, 0.3, 0.15, 1.0],
            PaletteColor::Stone => [0.5, 0.5, 0.5, 1.0],
            PaletteColor::Red => [0.9, 0.1, 0.1, 1.0],
            PaletteColor::Blue => [0.2, 0.35, 0.9, 1.0],
            PaletteColor::Black => [0.05, 0.05, 0.05, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_indices_fall_back_to_white() {
        assert_eq!(PaletteColor::from_index(2), PaletteColor::Green);
        assert_eq!(PaletteColor::from_index(200), PaletteColor::White);
    }
}
