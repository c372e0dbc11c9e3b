//! # World Module
//!
//! The spatial index of streamed chunks.
//!
//! ## Architecture
//!
//! Chunks live in a pool (`Vec<Arc<WorldChunk>>`) and are addressed by
//! [`ChunkIndex`]. Two open-addressing hash tables map chunk positions to pool
//! indices; the parity of the frame index picks the current one. When the
//! visible region moves, [`World::collect_unused_chunks`] walks the current
//! table, re-inserts survivors into the other one, frees the rest and flips
//! the parity. Rebuilding into a fresh table keeps collision chains short without
//! tombstones.
//!
//! Only the main thread touches the tables, the pool and the free stack. Chunk
//! positions are mirrored in a main-thread array so probing never has to take
//! a chunk's data lock while a worker is writing to it.
//!
//! ## Performance Considerations
//!
//! - Lookup and insert are O(1) expected, linear probing with wrap-around
//! - Table capacity is a multiple of the visible-region volume, so the load
//!   factor stays low even with garbage chunks waiting on their jobs
//! - Chunk records and their voxel arrays are recycled, never freed

use std::sync::Arc;

use cgmath::{Point3, Vector3};

use super::chunk::{lifecycle::ChunkState, volume, WorldChunk};
use crate::{config::WorldConfig, engine_state::rendering::meshing::mesh_freelist::MeshFreelist};

/// Collision chains longer than this are reported.
const LONG_CHAIN_WARNING: usize = 10;

/// Index of a chunk record in the world's pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkIndex(u32);

impl ChunkIndex {
    /// Marks an empty hash bucket.
    pub const NONE: ChunkIndex = ChunkIndex(u32::MAX);

    /// True for the empty-bucket sentinel.
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Pool slot as a `usize`.
    pub fn slot(self) -> usize {
        self.0 as usize
    }
}

/// What a table rebuild did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Chunks carried into the next table because they are still visible.
    pub kept: usize,
    /// Queued chunks outside the region, carried over and flagged garbage.
    pub garbage: usize,
    /// Chunks returned to the pool.
    pub freed: usize,
}

/// The streamed voxel world.
pub struct World {
    chunks: Vec<Arc<WorldChunk>>,
    positions: Vec<Point3<i32>>,
    tables: [Box<[ChunkIndex]>; 2],
    free_chunks: Vec<ChunkIndex>,
    free_chunk_capacity: usize,
    frame_index: u64,
    hash_factor: i32,
    /// Chunk the visible region is centered on.
    pub center: Point3<i32>,
    /// Chunks kept resident along each axis.
    pub visible_region: Vector3<i32>,
    /// Voxels per chunk along each axis.
    pub chunk_dim: Vector3<i32>,
}

impl World {
    /// Creates an empty world centered on the origin chunk.
    pub fn new(config: &WorldConfig) -> Self {
        let hash_size = config.hash_size();
        let visible_region = config.visible_region();
        let region_volume = volume(visible_region).max(1) as i32;
        World {
            chunks: Vec::new(),
            positions: Vec::new(),
            tables: [
                vec![ChunkIndex::NONE; hash_size].into_boxed_slice(),
                vec![ChunkIndex::NONE; hash_size].into_boxed_slice(),
            ],
            free_chunks: Vec::with_capacity(config.free_chunk_capacity()),
            free_chunk_capacity: config.free_chunk_capacity(),
            frame_index: 0,
            hash_factor: hash_size as i32 / region_volume + 1,
            center: Point3::new(0, 0, 0),
            visible_region,
            chunk_dim: config.chunk_dim(),
        }
    }

    /// Buckets per table.
    pub fn hash_size(&self) -> usize {
        self.tables[0].len()
    }

    /// Number of table rebuilds so far; its parity selects the current table.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn current(&self) -> usize {
        (self.frame_index % 2) as usize
    }

    /// Bucket for chunk position `p`.
    pub fn hash(&self, p: Point3<i32>) -> usize {
        let vr = self.visible_region;
        let ix = p.x.wrapping_mul(self.hash_factor);
        let iy = p.y.wrapping_mul(self.hash_factor).wrapping_mul(vr.x);
        let iz = p
            .z
            .wrapping_mul(self.hash_factor)
            .wrapping_mul(vr.x)
            .wrapping_mul(vr.y);
        ((ix ^ iy ^ iz) as u32 % self.hash_size() as u32) as usize
    }

    /// Inclusive lower and exclusive upper corner of the visible region.
    pub fn visible_bounds(&self) -> (Point3<i32>, Point3<i32>) {
        let half = self.visible_region / 2;
        (self.center - half, self.center + half)
    }

    /// True when chunk position `p` lies in the visible region.
    pub fn is_in_visible_region(&self, p: Point3<i32>) -> bool {
        let (min, max) = self.visible_bounds();
        p.x >= min.x && p.y >= min.y && p.z >= min.z && p.x < max.x && p.y < max.y && p.z < max.z
    }

    fn insert_into(&mut self, table: usize, index: ChunkIndex) -> bool {
        let hash_size = self.hash_size();
        let home = self.hash(self.positions[index.slot()]);
        let buckets = &mut self.tables[table];

        for step in 0..hash_size {
            let bucket = (home + step) % hash_size;
            if buckets[bucket].is_none() {
                buckets[bucket] = index;
                if step > LONG_CHAIN_WARNING {
                    log::warn!(
                        "Hash collision: chunk {:?} scanned {} buckets",
                        self.positions[index.slot()],
                        step
                    );
                }
                return true;
            }
        }

        log::error!(
            "World hash table full, could not insert chunk {:?}",
            self.positions[index.slot()]
        );
        false
    }

    /// Inserts a pooled chunk into the current table.
    ///
    /// # Returns
    /// `false` when every bucket is taken; nothing is written in that case.
    pub fn insert_chunk(&mut self, index: ChunkIndex) -> bool {
        self.insert_into(self.current(), index)
    }

    /// Pool index of the chunk at `p` in the current table.
    pub fn lookup_index(&self, p: Point3<i32>) -> Option<ChunkIndex> {
        let hash_size = self.hash_size();
        let home = self.hash(p);
        let buckets = &self.tables[self.current()];

        for step in 0..hash_size {
            let index = buckets[(home + step) % hash_size];
            if index.is_none() {
                return None;
            }
            if self.positions[index.slot()] == p {
                return Some(index);
            }
        }
        None
    }

    /// The chunk at `p`, if it is in the current table.
    pub fn get_world_chunk(&self, p: Point3<i32>) -> Option<Arc<WorldChunk>> {
        self.lookup_index(p).map(|index| self.chunks[index.slot()].clone())
    }

    /// Hands out a pooled chunk for `p` and indexes it.
    ///
    /// # Returns
    /// `None` when the table is full; the chunk goes back to the pool.
    ///
    /// # Panics
    /// Panics if a pooled chunk is not `Uninitialized`.
    pub fn get_world_chunk_for(&mut self, p: Point3<i32>) -> Option<Arc<WorldChunk>> {
        let index = match self.free_chunks.pop() {
            Some(index) => index,
            None => {
                let index = ChunkIndex(self.chunks.len() as u32);
                self.chunks.push(Arc::new(WorldChunk::new(self.chunk_dim)));
                self.positions.push(p);
                log::trace!("Allocated chunk record #{}", index.slot());
                index
            }
        };

        let chunk = self.chunks[index.slot()].clone();
        assert_eq!(
            chunk.lifecycle().state(),
            ChunkState::Uninitialized,
            "pooled chunk was not reset"
        );
        chunk.write().world_p = p;
        self.positions[index.slot()] = p;

        if self.insert_chunk(index) {
            Some(chunk)
        } else {
            self.free_chunks.push(index);
            None
        }
    }

    /// Returns a chunk to the pool and its meshes to the freelist.
    ///
    /// The caller must already have removed the chunk from every table.
    ///
    /// # Panics
    /// Panics if the chunk still has a job queued, or the free stack is full.
    pub fn free_world_chunk(&mut self, index: ChunkIndex, freelist: &MeshFreelist) {
        let chunk = &self.chunks[index.slot()];
        assert!(!chunk.lifecycle().is_queued(), "freed a queued chunk");

        {
            let mut data = chunk.write();
            if let Some(mesh) = data.mesh.take() {
                freelist.deallocate_mesh(mesh);
            }
            if let Some(mesh) = data.lod_mesh.take() {
                freelist.deallocate_mesh(mesh);
            }
            data.volume.clear();
        }
        chunk.lifecycle().reset();

        assert!(
            self.free_chunks.len() < self.free_chunk_capacity,
            "free chunk stack overflow"
        );
        self.free_chunks.push(index);
    }

    /// Rebuilds the index around the current center.
    ///
    /// For every chunk in the current table:
    /// - `Uninitialized` chunks are freed
    /// - chunks inside the visible region move to the next table
    /// - queued chunks outside it are flagged garbage and move along too, so
    ///   their pending job still finds a live record
    /// - everything else is freed, including a chunk whose job published it
    ///   while it was being flagged
    ///
    /// The current table is emptied and the next one becomes current.
    pub fn collect_unused_chunks(&mut self, freelist: &MeshFreelist) -> CollectStats {
        let current = self.current();
        let next = 1 - current;
        let mut stats = CollectStats::default();

        for bucket in 0..self.hash_size() {
            let index = self.tables[current][bucket];
            if index.is_none() {
                continue;
            }
            self.tables[current][bucket] = ChunkIndex::NONE;

            let chunk = self.chunks[index.slot()].clone();
            let lifecycle = chunk.lifecycle();
            let state = lifecycle.state();
            let p = self.positions[index.slot()];

            if state == ChunkState::Uninitialized {
                if lifecycle.is_collected() {
                    log::trace!("Reclaiming abandoned chunk {:?}", p);
                }
                self.free_world_chunk(index, freelist);
                stats.freed += 1;
            } else if self.is_in_visible_region(p) {
                if self.insert_into(next, index) {
                    stats.kept += 1;
                } else {
                    self.free_unless_queued(index, freelist, &mut stats);
                }
            } else if state == ChunkState::Queued && lifecycle.mark_garbage() {
                if !self.insert_into(next, index) {
                    log::error!("Dropped garbage chunk {:?} from the index", p);
                }
                stats.garbage += 1;
            } else {
                self.free_world_chunk(index, freelist);
                stats.freed += 1;
            }
        }

        self.frame_index += 1;
        log::debug!(
            "Collected chunks around {:?}: {} kept, {} garbage, {} freed",
            self.center,
            stats.kept,
            stats.garbage,
            stats.freed
        );
        stats
    }

    fn free_unless_queued(&mut self, index: ChunkIndex, freelist: &MeshFreelist, stats: &mut CollectStats) {
        if self.chunks[index.slot()].lifecycle().is_queued() {
            log::error!("Dropped queued chunk {:?} from the index", self.positions[index.slot()]);
        } else {
            self.free_world_chunk(index, freelist);
            stats.freed += 1;
        }
    }

    /// Chunks in the current table, in bucket order.
    pub fn live_chunks(&self) -> impl Iterator<Item = (ChunkIndex, &Arc<WorldChunk>)> + '_ {
        self.tables[self.current()]
            .iter()
            .filter(|index| !index.is_none())
            .map(|&index| (index, &self.chunks[index.slot()]))
    }

    /// Number of chunks in the current table.
    pub fn live_chunk_count(&self) -> usize {
        self.tables[self.current()]
            .iter()
            .filter(|index| !index.is_none())
            .count()
    }

    /// Chunk records ever allocated.
    pub fn pooled_chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunk records waiting on the free stack.
    pub fn free_chunk_count(&self) -> usize {
        self.free_chunks.len()
    }

    /// Pool record behind `index`.
    pub fn chunk(&self, index: ChunkIndex) -> &Arc<WorldChunk> {
        &self.chunks[index.slot()]
    }

    /// Splits an absolute voxel position into chunk position and local offset.
    pub fn canonicalize(&self, voxel_p: Point3<i32>) -> (Point3<i32>, Point3<i32>) {
        let dim = self.chunk_dim;
        let chunk = Point3::new(
            voxel_p.x.div_euclid(dim.x),
            voxel_p.y.div_euclid(dim.y),
            voxel_p.z.div_euclid(dim.z),
        );
        let offset = Point3::new(
            voxel_p.x.rem_euclid(dim.x),
            voxel_p.y.rem_euclid(dim.y),
            voxel_p.z.rem_euclid(dim.z),
        );
        (chunk, offset)
    }

    /// Filled test on an absolute voxel position.
    ///
    /// Chunks that are missing or still generating count as empty.
    pub fn is_filled_in_world(&self, voxel_p: Point3<i32>) -> bool {
        let (chunk_p, offset) = self.canonicalize(voxel_p);
        match self.get_world_chunk(chunk_p) {
            Some(chunk) if chunk.lifecycle().is_voxels_initialized() => {
                chunk.read().volume.is_filled(offset)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::rendering::geometry_buffer::GeometryBuffer;
    use std::collections::HashSet;

    fn small_config() -> WorldConfig {
        WorldConfig {
            chunk_dim: [8, 8, 8],
            visible_region: [4, 4, 4],
            ..WorldConfig::default()
        }
    }

    #[test]
    fn inserted_positions_are_found_and_others_are_not() {
        let mut world = World::new(&small_config());
        let mut rng = fastrand::Rng::with_seed(7);
        let mut inserted = HashSet::new();
        while inserted.len() < 150 {
            let p = Point3::new(rng.i32(-20..20), rng.i32(-20..20), rng.i32(-20..20));
            if inserted.insert(p) {
                assert!(world.get_world_chunk_for(p).is_some());
            }
        }

        for p in &inserted {
            let chunk = world.get_world_chunk(*p).expect("inserted chunk missing");
            assert_eq!(chunk.world_p(), *p);
        }
        for _ in 0..500 {
            let p = Point3::new(rng.i32(-40..40), rng.i32(-40..40), rng.i32(-40..40));
            assert_eq!(world.get_world_chunk(p).is_some(), inserted.contains(&p));
        }
    }

    #[test]
    fn full_table_rejects_without_overwriting() {
        let config = WorldConfig {
            visible_region: [1, 1, 1],
            hash_size_multiplier: 2,
            ..small_config()
        };
        let mut world = World::new(&config);
        assert_eq!(world.hash_size(), 2);
        let a = Point3::new(0, 0, 0);
        let b = Point3::new(1, 0, 0);
        assert!(world.get_world_chunk_for(a).is_some());
        assert!(world.get_world_chunk_for(b).is_some());
        assert!(world.get_world_chunk_for(Point3::new(2, 0, 0)).is_none());

        assert!(world.get_world_chunk(a).is_some());
        assert!(world.get_world_chunk(b).is_some());
        assert_eq!(world.free_chunk_count(), 1);
    }

    #[test]
    fn hash_matches_the_documented_formula() {
        let world = World::new(&small_config());
        // hash_size 256, region volume 64, factor 5
        let p = Point3::new(3, -2, 7);
        let expected = ((3 * 5) ^ (-2 * 5 * 4) ^ (7 * 5 * 4 * 4)) as u32 % 256;
        assert_eq!(world.hash(p), expected as usize);
    }

    #[test]
    fn collect_keeps_visible_frees_outside_and_flags_queued_garbage() {
        let freelist = MeshFreelist::new(36);
        let mut world = World::new(&small_config());

        let inside = world.get_world_chunk_for(Point3::new(1, 1, 1)).unwrap();
        inside.lifecycle().queue_for_init();
        inside.lifecycle().finalize_initialization(true);
        inside.write().mesh = Some(Box::new(GeometryBuffer::new(36)));

        let outside_done = world.get_world_chunk_for(Point3::new(9, 0, 0)).unwrap();
        outside_done.lifecycle().queue_for_init();
        outside_done.lifecycle().finalize_initialization(true);
        outside_done.write().mesh = Some(freelist.get_mesh_for_chunk());

        let outside_queued = world.get_world_chunk_for(Point3::new(0, 9, 0)).unwrap();
        outside_queued.lifecycle().queue_for_init();

        let never_queued = world.get_world_chunk_for(Point3::new(0, 0, 1)).unwrap();
        assert_eq!(never_queued.lifecycle().state(), ChunkState::Uninitialized);

        let stats = world.collect_unused_chunks(&freelist);
        assert_eq!(
            stats,
            CollectStats {
                kept: 1,
                garbage: 1,
                freed: 2
            }
        );
        assert_eq!(world.frame_index(), 1);

        assert!(world.get_world_chunk(Point3::new(1, 1, 1)).is_some());
        assert!(world.get_world_chunk(Point3::new(9, 0, 0)).is_none());
        assert!(world.get_world_chunk(Point3::new(0, 0, 1)).is_none());
        let garbage = world.get_world_chunk(Point3::new(0, 9, 0)).unwrap();
        assert!(garbage.lifecycle().is_garbage());

        // The freed chunk's mesh went back to the pool.
        assert_eq!(freelist.free_meshes(), 1);
        assert_eq!(world.free_chunk_count(), 2);
        assert!(outside_done.read().mesh.is_none());
        assert_eq!(outside_done.lifecycle().state(), ChunkState::Uninitialized);

        // Once the worker hands the garbage chunk back, the next rebuild frees it.
        garbage.lifecycle().abandon_garbage();
        let stats = world.collect_unused_chunks(&freelist);
        assert_eq!(stats.freed, 1);
        assert!(world.get_world_chunk(Point3::new(0, 9, 0)).is_none());
        assert_eq!(world.live_chunk_count(), 1);
    }

    #[test]
    #[should_panic(expected = "freed a queued chunk")]
    fn freeing_a_queued_chunk_panics() {
        let freelist = MeshFreelist::new(6);
        let mut world = World::new(&small_config());
        let chunk = world.get_world_chunk_for(Point3::new(0, 0, 0)).unwrap();
        chunk.lifecycle().queue_for_init();
        let index = world.lookup_index(Point3::new(0, 0, 0)).unwrap();
        world.free_world_chunk(index, &freelist);
    }

    #[test]
    fn pooled_records_are_reused() {
        let freelist = MeshFreelist::new(6);
        let mut world = World::new(&small_config());
        world.get_world_chunk_for(Point3::new(10, 10, 10)).unwrap();
        world.collect_unused_chunks(&freelist);
        assert_eq!(world.free_chunk_count(), 1);

        let chunk = world.get_world_chunk_for(Point3::new(0, 0, 0)).unwrap();
        assert_eq!(world.pooled_chunk_count(), 1);
        assert_eq!(chunk.world_p(), Point3::new(0, 0, 0));
    }

    #[test]
    fn canonicalize_handles_negative_voxels() {
        let world = World::new(&small_config());
        assert_eq!(
            world.canonicalize(Point3::new(-1, 8, 17)),
            (Point3::new(-1, 1, 2), Point3::new(7, 0, 1))
        );
    }
}
