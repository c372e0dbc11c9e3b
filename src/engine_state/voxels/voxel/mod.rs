//! # Voxel Module
//!
//! The smallest unit of world data: a filled flag and a palette color packed
//! into two bytes.

use palette::PaletteColor;

pub mod palette;
pub mod voxel_face;

/// Set when the voxel is solid and contributes to the mesh.
pub const VOXEL_FILLED: u8 = 1 << 0;

/// A single voxel.
///
/// # Memory Layout
/// `#[repr(C)]` with two `u8` fields, so chunk voxel arrays can be viewed as
/// raw bytes with `bytemuck` when they are handed to debug tooling.
///
/// Bits above [`VOXEL_FILLED`] in `flags` are reserved for per-face
/// visibility. `color` is only meaningful while the voxel is filled.
#[repr(C)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Voxel {
    /// Bit flags, see [`VOXEL_FILLED`].
    pub flags: u8,
    /// Index into the palette.
    pub color: u8,
}

impl Voxel {
    /// An empty voxel.
    pub const EMPTY: Voxel = Voxel { flags: 0, color: 0 };

    /// A filled voxel of the given color.
    pub fn filled(color: PaletteColor) -> Self {
        Voxel {
            flags: VOXEL_FILLED,
            color: color as u8,
        }
    }

    /// True when the filled bit is set.
    #[inline]
    pub fn is_filled(&self) -> bool {
        self.flags & VOXEL_FILLED != 0
    }

    /// The filled bit as 0 or 1, for running counts.
    #[inline]
    pub fn filled_bit(&self) -> usize {
        (self.flags & VOXEL_FILLED) as usize
    }

    /// Marks the voxel filled with `color`.
    pub fn fill(&mut self, color: PaletteColor) {
        self.flags |= VOXEL_FILLED;
        self.color = color as u8;
    }

    /// The palette entry for this voxel, falling back to white for unknown indices.
    pub fn palette_color(&self) -> PaletteColor {
        PaletteColor::from_index(self.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_bit_tracks_flag() {
        let mut voxel = Voxel::EMPTY;
        assert!(!voxel.is_filled());
        assert_eq!(voxel.filled_bit(), 0);

        voxel.fill(PaletteColor::GrassGreen);
        assert!(voxel.is_filled());
        assert_eq!(voxel.filled_bit(), 1);
        assert_eq!(voxel.palette_color(), PaletteColor::GrassGreen);
    }

    #[test]
    fn voxel_is_two_plain_bytes() {
        let voxels = [Voxel::filled(PaletteColor::Green), Voxel::EMPTY];
        let bytes: &[u8] = bytemuck::cast_slice(&voxels);
        assert_eq!(bytes, &[VOXEL_FILLED, PaletteColor::Green as u8, 0, 0]);
    }
}
