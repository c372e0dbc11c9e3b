//! # Chunk Iteration Module
//!
//! Iteration over the filled voxels of a [`VoxelVolume`].
//!
//! Most chunks are either mostly air or mostly solid, and every consumer (the
//! mesher, the boundary scan, the ray tracer) only cares about filled cells.
//! [`FilledVoxels`] walks the flat array once, in storage order, tracking the
//! 3D position incrementally so no division is needed per voxel.

use cgmath::Point3;

use super::VoxelVolume;
use crate::engine_state::voxels::voxel::Voxel;

/// An iterator over `(position, voxel)` for every filled voxel of a volume.
pub struct FilledVoxels<'a> {
    volume: &'a VoxelVolume,
    index: usize,
    x: i32,
    y: i32,
    z: i32,
}

impl<'a> FilledVoxels<'a> {
    /// Starts at the first cell of `volume`.
    pub fn new(volume: &'a VoxelVolume) -> Self {
        FilledVoxels {
            volume,
            index: 0,
            x: 0,
            y: 0,
            z: 0,
        }
    }

    fn step(&mut self) {
        self.index += 1;
        self.x += 1;
        if self.x == self.volume.dim.x {
            self.x = 0;
            self.y += 1;
            if self.y == self.volume.dim.y {
                self.y = 0;
                self.z += 1;
            }
        }
    }
}

impl Iterator for FilledVoxels<'_> {
    type Item = (Point3<i32>, Voxel);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.volume.voxels.len() {
            let voxel = self.volume.voxels[self.index];
            let p = Point3::new(self.x, self.y, self.z);
            self.step();
            if voxel.is_filled() {
                return Some((p, voxel));
            }
        }
        None
    }
}

impl VoxelVolume {
    /// Iterates over every filled voxel with its position.
    pub fn filled_voxels(&self) -> FilledVoxels<'_> {
        FilledVoxels::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::voxel::palette::PaletteColor;
    use cgmath::Vector3;

    #[test]
    fn yields_only_filled_cells_with_positions() {
        let mut volume = VoxelVolume::new(Vector3::new(3, 2, 2));
        let filled = [Point3::new(2, 0, 0), Point3::new(0, 1, 0), Point3::new(1, 1, 1)];
        for p in filled {
            volume.set(p, Voxel::filled(PaletteColor::Brown));
        }

        let found: Vec<_> = volume.filled_voxels().map(|(p, _)| p).collect();
        assert_eq!(found, filled.to_vec());
    }

    #[test]
    fn empty_volume_yields_nothing() {
        let volume = VoxelVolume::new(Vector3::new(4, 4, 4));
        assert_eq!(volume.filled_voxels().count(), 0);
    }
}
