//! # Chunk Module
//!
//! Fixed-size 3D voxel arrays and the world chunk record that owns one.
//!
//! ## Layout
//!
//! Voxels are stored densely, one [`Voxel`] per cell, indexed
//! `x + y*dim.x + z*dim.x*dim.y`. A [`VoxelVolume`] carries its own dimension so
//! the same code handles world chunks, the padded "synthetic" chunks the
//! generator works in, and the small tiles used by the standing-spot analysis.
//!
//! ## Padding
//!
//! Generation happens in a synthetic chunk one voxel larger on every side than
//! the destination. The mesher reads neighbors from the padding, so faces on
//! chunk borders are culled correctly without touching adjacent chunks.
//! [`copy_chunk_offset`] moves the interior into the destination.
//!
//! ## Sharing
//!
//! A [`WorldChunk`] is shared as `Arc<WorldChunk>` between the world (main
//! thread) and the job currently working on it. The lifecycle word is atomic and
//! always consulted before the data lock is taken.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cgmath::{Point3, Vector3};

use super::voxel::Voxel;
use crate::engine_state::rendering::geometry_buffer::GeometryBuffer;
use lifecycle::ChunkLifecycle;

pub mod chunk_iteration;
pub mod lifecycle;

/// Default world chunk dimension in voxels.
pub const DEFAULT_CHUNK_DIMENSION: Vector3<i32> = Vector3 { x: 16, y: 8, z: 16 };

/// Number of cells in a box of dimension `dim`.
#[inline]
pub fn volume(dim: Vector3<i32>) -> usize {
    (dim.x.max(0) as usize) * (dim.y.max(0) as usize) * (dim.z.max(0) as usize)
}

/// Flat index of `p` in a volume of dimension `dim`. Does not bounds check.
#[inline]
pub fn voxel_index(p: Point3<i32>, dim: Vector3<i32>) -> i32 {
    p.x + p.y * dim.x + p.z * dim.x * dim.y
}

/// True when `p` lies in `[0, dim)` on every axis.
#[inline]
pub fn in_bounds(p: Point3<i32>, dim: Vector3<i32>) -> bool {
    p.x >= 0 && p.y >= 0 && p.z >= 0 && p.x < dim.x && p.y < dim.y && p.z < dim.z
}

/// Every position in a box of dimension `dim`, in storage order.
pub fn positions(dim: Vector3<i32>) -> impl Iterator<Item = Point3<i32>> {
    (0..dim.z).flat_map(move |z| {
        (0..dim.y).flat_map(move |y| (0..dim.x).map(move |x| Point3::new(x, y, z)))
    })
}

/// A dense box of voxels with a running filled count.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelVolume {
    /// Cells along each axis.
    pub dim: Vector3<i32>,
    /// `volume(dim)` voxels in x-fastest order.
    pub voxels: Vec<Voxel>,
    /// Number of filled voxels, maintained by the writers in this module.
    pub filled_count: usize,
}

impl VoxelVolume {
    /// An empty volume of dimension `dim`.
    pub fn new(dim: Vector3<i32>) -> Self {
        Self {
            dim,
            voxels: vec![Voxel::EMPTY; volume(dim)],
            filled_count: 0,
        }
    }

    /// Wraps a zeroed buffer, usually borrowed from a scratch arena.
    ///
    /// # Panics
    /// Panics if the buffer length does not match `dim`.
    pub fn from_buffer(dim: Vector3<i32>, voxels: Vec<Voxel>) -> Self {
        assert_eq!(voxels.len(), volume(dim), "voxel buffer does not match {:?}", dim);
        debug_assert!(voxels.iter().all(|v| !v.is_filled()));
        Self {
            dim,
            voxels,
            filled_count: 0,
        }
    }

    /// Gives the voxel buffer back, e.g. to a scratch arena.
    pub fn into_buffer(self) -> Vec<Voxel> {
        self.voxels
    }

    /// Number of cells.
    pub fn volume(&self) -> usize {
        self.voxels.len()
    }

    /// True when `p` is inside the volume.
    pub fn contains(&self, p: Point3<i32>) -> bool {
        in_bounds(p, self.dim)
    }

    /// Flat index of `p`, or `None` outside the volume.
    pub fn try_index(&self, p: Point3<i32>) -> Option<usize> {
        self.contains(p).then(|| voxel_index(p, self.dim) as usize)
    }

    /// The voxel at `p`.
    ///
    /// # Panics
    /// Panics if `p` is outside the volume.
    pub fn get(&self, p: Point3<i32>) -> Voxel {
        match self.try_index(p) {
            Some(index) => self.voxels[index],
            None => panic!("voxel {:?} outside volume {:?}", p, self.dim),
        }
    }

    /// Filled test that treats everything outside the volume as empty.
    pub fn is_filled(&self, p: Point3<i32>) -> bool {
        self.try_index(p)
            .is_some_and(|index| self.voxels[index].is_filled())
    }

    /// Overwrites the voxel at `p`, keeping `filled_count` consistent.
    pub fn set(&mut self, p: Point3<i32>, voxel: Voxel) {
        let Some(index) = self.try_index(p) else {
            panic!("voxel {:?} outside volume {:?}", p, self.dim);
        };
        let previous = self.voxels[index];
        self.filled_count = self.filled_count + voxel.filled_bit() - previous.filled_bit();
        self.voxels[index] = voxel;
    }

    /// Empties every voxel.
    pub fn clear(&mut self) {
        self.voxels.iter_mut().for_each(|v| *v = Voxel::EMPTY);
        self.filled_count = 0;
    }

    /// Recounts filled voxels from scratch.
    pub fn count_filled(&self) -> usize {
        self.voxels.iter().map(Voxel::filled_bit).sum()
    }

    /// All positions in storage order.
    pub fn positions(&self) -> impl Iterator<Item = Point3<i32>> {
        positions(self.dim)
    }
}

/// Copies `dest.dim` voxels out of `src`, starting at `offset` in `src`.
///
/// `dest[p] = src[p + offset]` for every `p` in the destination. The
/// destination's filled count is accumulated from the copied flags.
///
/// # Panics
/// Panics if the destination already holds filled voxels, or if the offset
/// box does not fit inside `src`.
pub fn copy_chunk_offset(src: &VoxelVolume, dest: &mut VoxelVolume, offset: Vector3<i32>) {
    assert_eq!(dest.filled_count, 0, "copy into a non-empty chunk");
    let far_corner = Point3::new(0, 0, 0) + offset + dest.dim - Vector3::new(1, 1, 1);
    assert!(
        dest.volume() == 0 || (src.contains(Point3::new(0, 0, 0) + offset) && src.contains(far_corner)),
        "offset {:?} + {:?} exceeds source {:?}",
        offset,
        dest.dim,
        src.dim
    );

    let dim = dest.dim;
    let mut filled = 0;
    for z in 0..dim.z {
        for y in 0..dim.y {
            for x in 0..dim.x {
                let p = Point3::new(x, y, z);
                let src_index = voxel_index(p + offset, src.dim) as usize;
                let dest_index = voxel_index(p, dim) as usize;
                let voxel = src.voxels[src_index];
                dest.voxels[dest_index] = voxel;
                filled += voxel.filled_bit();
            }
        }
    }
    dest.filled_count += filled;
}

/// The mutable part of a world chunk, guarded by the chunk's lock.
#[derive(Debug)]
pub struct ChunkData {
    /// Position in chunk-grid units.
    pub world_p: Point3<i32>,
    /// The chunk's voxels.
    pub volume: VoxelVolume,
    /// Surface mesh, attached once the chunk has visible geometry.
    pub mesh: Option<Box<GeometryBuffer>>,
    /// Overlay geometry from the standing-spot analysis.
    pub lod_mesh: Option<Box<GeometryBuffer>>,
}

impl ChunkData {
    /// Vertex count of the attached mesh, zero when there is none.
    pub fn mesh_vertex_count(&self) -> usize {
        self.mesh.as_ref().map_or(0, |mesh| mesh.at())
    }

    /// Vertex count of the attached LOD mesh, zero when there is none.
    pub fn lod_vertex_count(&self) -> usize {
        self.lod_mesh.as_ref().map_or(0, |mesh| mesh.at())
    }
}

/// A streamed chunk of the world.
///
/// Chunk records are pooled by the world and recycled forever; they are only
/// dropped with the world itself.
#[derive(Debug)]
pub struct WorldChunk {
    lifecycle: ChunkLifecycle,
    data: RwLock<ChunkData>,
}

impl WorldChunk {
    /// A fresh, uninitialized chunk of dimension `dim`.
    pub fn new(dim: Vector3<i32>) -> Self {
        Self {
            lifecycle: ChunkLifecycle::new(),
            data: RwLock::new(ChunkData {
                world_p: Point3::new(0, 0, 0),
                volume: VoxelVolume::new(dim),
                mesh: None,
                lod_mesh: None,
            }),
        }
    }

    /// The chunk's lifecycle word.
    pub fn lifecycle(&self) -> &ChunkLifecycle {
        &self.lifecycle
    }

    /// Shared access to the voxel and mesh data.
    pub fn read(&self) -> RwLockReadGuard<'_, ChunkData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to the voxel and mesh data.
    pub fn write(&self) -> RwLockWriteGuard<'_, ChunkData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Position in chunk-grid units.
    pub fn world_p(&self) -> Point3<i32> {
        self.read().world_p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::voxel::palette::PaletteColor;

    fn plane(dim: Vector3<i32>, z: i32) -> VoxelVolume {
        let mut volume = VoxelVolume::new(dim);
        for y in 0..dim.y {
            for x in 0..dim.x {
                volume.set(Point3::new(x, y, z), Voxel::filled(PaletteColor::Green));
            }
        }
        volume
    }

    #[test]
    fn indexing_is_x_fastest() {
        let dim = Vector3::new(4, 3, 2);
        assert_eq!(voxel_index(Point3::new(1, 0, 0), dim), 1);
        assert_eq!(voxel_index(Point3::new(0, 1, 0), dim), 4);
        assert_eq!(voxel_index(Point3::new(0, 0, 1), dim), 12);
        assert_eq!(volume(dim), 24);
        let volume = VoxelVolume::new(dim);
        let order: Vec<_> = volume.positions().take(5).collect();
        assert_eq!(order[4], Point3::new(0, 1, 0));
    }

    #[test]
    fn set_keeps_filled_count() {
        let mut volume = VoxelVolume::new(Vector3::new(2, 2, 2));
        let p = Point3::new(1, 1, 1);
        volume.set(p, Voxel::filled(PaletteColor::Stone));
        volume.set(p, Voxel::filled(PaletteColor::Red));
        assert_eq!(volume.filled_count, 1);
        volume.set(p, Voxel::EMPTY);
        assert_eq!(volume.filled_count, 0);
        assert!(!volume.is_filled(Point3::new(5, 0, 0)));
    }

    #[test]
    fn copy_skips_the_padding_layer() {
        let dest_dim = Vector3::new(8, 8, 8);
        let syn_dim = dest_dim + Vector3::new(2, 2, 2);

        let src = plane(syn_dim, 1);
        let mut dest = VoxelVolume::new(dest_dim);
        copy_chunk_offset(&src, &mut dest, Vector3::new(1, 1, 1));

        assert_eq!(dest.filled_count, 64);
        for p in dest.positions() {
            assert_eq!(dest.get(p).is_filled(), p.z == 0, "at {:?}", p);
        }
    }

    #[test]
    #[should_panic(expected = "non-empty")]
    fn copy_requires_an_empty_destination() {
        let dim = Vector3::new(2, 2, 2);
        let src = plane(dim, 0);
        let mut dest = plane(dim, 1);
        copy_chunk_offset(&src, &mut dest, Vector3::new(0, 0, 0));
    }

    #[test]
    fn fresh_world_chunk_is_empty() {
        let chunk = WorldChunk::new(DEFAULT_CHUNK_DIMENSION);
        let data = chunk.read();
        assert_eq!(data.volume.volume(), 16 * 8 * 16);
        assert_eq!(data.mesh_vertex_count(), 0);
        assert!(data.lod_mesh.is_none());
    }
}
