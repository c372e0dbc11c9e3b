//! Per-frame walk over the visible region.
//!
//! [`buffer_world`] visits every chunk position of the region once per frame
//! and does one of three things with it:
//!
//! - the chunk has a mesh: reserve staging space and queue a copy job
//! - the chunk is missing: take a record from the pool and queue its init job
//! - the chunk was abandoned as garbage and is visible again: queue it again
//!
//! Small meshes are batched into `CopyBufferSet` jobs so one job covers many
//! chunks; large ones get a job of their own.

use std::sync::Arc;

use cgmath::{Point3, Vector3};

use crate::engine_state::{
    staging_buffer::StagingBuffer,
    task_management::{
        task::{CopyBufferJob, CopyBufferSet, WorkQueueEntry},
        WorkerPool,
    },
    voxels::{
        chunk::{lifecycle::ChunkState, WorldChunk},
        world::World,
    },
};

/// Meshes with fewer vertices than this are copied in batches.
pub const SMALL_MESH_VERTICES: usize = 2048;

/// What one [`buffer_world`] pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Copy jobs created, batched or not.
    pub copies: usize,
    /// `CopyBufferSet` jobs pushed.
    pub copy_sets: usize,
    /// Vertices reserved in the staging buffer.
    pub staged_vertices: usize,
    /// Init jobs queued for new chunks.
    pub queued: usize,
    /// Init jobs queued again for abandoned chunks.
    pub requeued: usize,
    /// Positions skipped because the queue or the table was full.
    pub deferred: usize,
}

/// Render-space offset of chunk `world_p`.
pub fn copy_basis(world_p: Point3<i32>, chunk_dim: Vector3<i32>, camera: Point3<f32>) -> Vector3<f32> {
    Vector3::new(
        (world_p.x * chunk_dim.x) as f32 - camera.x,
        (world_p.y * chunk_dim.y) as f32 - camera.y,
        (world_p.z * chunk_dim.z) as f32 - camera.z,
    )
}

struct CopyBatcher<'a> {
    pool: &'a mut WorkerPool,
    staging: &'a StagingBuffer,
    set: CopyBufferSet,
    stats: BufferStats,
}

impl CopyBatcher<'_> {
    fn stage(&mut self, chunk: &Arc<WorldChunk>, lod: bool, count: usize, basis: Vector3<f32>) {
        if count == 0 {
            return;
        }
        let Some(dest) = self.staging.reserve(count) else {
            return;
        };
        let job = CopyBufferJob {
            chunk: chunk.clone(),
            lod,
            dest,
            basis,
        };
        self.stats.copies += 1;
        self.stats.staged_vertices += count;

        if count < SMALL_MESH_VERTICES {
            self.set.push(job);
            if self.set.is_full() {
                self.flush();
            }
        } else {
            self.pool.push_high(WorkQueueEntry::CopyBuffer(job));
        }
    }

    fn flush(&mut self) {
        if self.set.is_empty() {
            return;
        }
        let set = std::mem::take(&mut self.set);
        self.pool.push_high(WorkQueueEntry::CopyBufferSet(set));
        self.stats.copy_sets += 1;
    }
}

/// Queues copy jobs for every meshed chunk and init jobs for every missing
/// chunk of the visible region.
///
/// Main thread only.
pub fn buffer_world(
    world: &mut World,
    pool: &mut WorkerPool,
    staging: &StagingBuffer,
    camera: Point3<f32>,
) -> BufferStats {
    let (min, max) = world.visible_bounds();
    let chunk_dim = world.chunk_dim;
    let mut batcher = CopyBatcher {
        pool,
        staging,
        set: CopyBufferSet::new(),
        stats: BufferStats::default(),
    };

    for z in min.z..max.z {
        for y in min.y..max.y {
            for x in min.x..max.x {
                let p = Point3::new(x, y, z);
                match world.get_world_chunk(p) {
                    Some(chunk) => match chunk.lifecycle().state() {
                        ChunkState::MeshComplete => {
                            let (mesh, lod) = {
                                let data = chunk.read();
                                (data.mesh_vertex_count(), data.lod_vertex_count())
                            };
                            let basis = copy_basis(p, chunk_dim, camera);
                            batcher.stage(&chunk, false, mesh, basis);
                            batcher.stage(&chunk, true, lod, basis);
                        }
                        ChunkState::Uninitialized => {
                            if !batcher.pool.low_priority_has_room() {
                                batcher.stats.deferred += 1;
                                continue;
                            }
                            chunk.lifecycle().queue_for_init();
                            batcher.pool.push_low(WorkQueueEntry::InitWorldChunk(chunk));
                            batcher.stats.requeued += 1;
                        }
                        ChunkState::Queued | ChunkState::VoxelsInitialized => {}
                    },
                    None => {
                        if !batcher.pool.low_priority_has_room() {
                            batcher.stats.deferred += 1;
                            continue;
                        }
                        let Some(chunk) = world.get_world_chunk_for(p) else {
                            batcher.stats.deferred += 1;
                            continue;
                        };
                        chunk.lifecycle().queue_for_init();
                        batcher.pool.push_low(WorkQueueEntry::InitWorldChunk(chunk));
                        batcher.stats.queued += 1;
                    }
                }
            }
        }
    }

    batcher.flush();
    batcher.stats
}
