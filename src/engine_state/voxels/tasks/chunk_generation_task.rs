//! # Chunk Initialization Task
//!
//! The body of an `InitWorldChunk` job. It runs on a worker thread for a chunk
//! the main thread has queued, and leaves the chunk either initialized (with
//! a mesh when it has visible faces) or, if the chunk was collected as
//! garbage in the meantime, back in the pool's hands untouched.
//!
//! ## Steps
//! 1. Generate a synthetic chunk one voxel larger on every side, at chunk
//!    position `world_p - 1`, in scratch memory
//! 2. Copy its interior into the chunk
//! 3. Mesh the chunk against the synthetic padding, so faces against
//!    neighbors are culled without reading the neighbors
//! 4. Optionally run the standing-spot analysis into a LOD mesh, then move
//!    its markers from synthetic into chunk-local coordinates
//! 5. Publish with a full fence and the lifecycle advance

use std::sync::atomic::{fence, Ordering};

use cgmath::Vector3;

use crate::engine_state::{
    rendering::meshing::{build_world_chunk_mesh, mesh_freelist::MeshFreelist},
    task_management::task::ThreadLocalState,
    voxels::{
        analysis::standing_spots::compute_standing_spots,
        chunk::{copy_chunk_offset, volume, VoxelVolume, WorldChunk},
    },
};

/// Initializes a queued chunk.
///
/// # Panics
/// Panics if the chunk is not queued.
pub fn initialize_world_chunk(chunk: &WorldChunk, local: &mut ThreadLocalState) {
    let lifecycle = chunk.lifecycle();
    assert!(lifecycle.is_queued(), "init job for a chunk that is not queued");

    if lifecycle.is_garbage() {
        log::trace!("Skipping garbage chunk {:?}", chunk.world_p());
        lifecycle.abandon_garbage();
        return;
    }

    let context = &local.context;
    let padding = Vector3::new(1, 1, 1);
    let synthetic_dim = context.chunk_dim + padding * 2;
    let mut synthetic = VoxelVolume::from_buffer(synthetic_dim, local.scratch.take(volume(synthetic_dim)));

    let mut data = chunk.write();
    let synthetic_p = data.world_p - padding;
    let synthetic_sum = context
        .generator
        .generate(&mut synthetic, synthetic_p, context.chunk_dim);

    data.volume.clear();
    copy_chunk_offset(&synthetic, &mut data.volume, padding);
    fence(Ordering::SeqCst);

    let mut mesh_has_vertices = false;
    if synthetic_sum > 0 && synthetic_sum < synthetic.volume() {
        let mut mesh = context.freelist.get_mesh_for_chunk();
        build_world_chunk_mesh(&synthetic, &data.volume, &mut mesh);

        if let Some(rule) = context.standing_spots {
            let mut lod = context.freelist.get_mesh_for_chunk();
            compute_standing_spots(&synthetic, rule, &mut lod, &mut local.scratch);
            let min = [padding.x as f32, padding.y as f32, padding.z as f32];
            let dim = context.chunk_dim;
            lod.clip_and_displace_to_min_dim(
                min,
                [min[0] + dim.x as f32, min[1] + dim.y as f32, min[2] + dim.z as f32],
            );
            if lod.is_empty() {
                context.freelist.deallocate_mesh(lod);
            } else {
                data.lod_mesh = Some(lod);
            }
        }

        if mesh.is_empty() {
            context.freelist.deallocate_mesh(mesh);
        } else {
            mesh_has_vertices = true;
            data.mesh = Some(mesh);
        }
    }

    log::trace!(
        "Initialized chunk {:?}: {} filled, {} vertices",
        data.world_p,
        data.volume.filled_count,
        data.mesh_vertex_count()
    );
    drop(data);

    local.scratch.recycle(synthetic.into_buffer());
    lifecycle.finalize_initialization(mesh_has_vertices);
}

/// Cleans up a chunk whose init job panicked part way.
///
/// Meshes already attached go back to `freelist` and the voxels are cleared,
/// then the chunk is published empty, or handed back if it became garbage.
/// Chunks that are no longer queued are left alone.
pub fn recover_failed_initialization(chunk: &WorldChunk, freelist: &MeshFreelist) {
    let lifecycle = chunk.lifecycle();
    if !lifecycle.is_queued() {
        log::warn!("Failed init job for chunk {:?} that is not queued", chunk.world_p());
        return;
    }

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

    match lifecycle.fail_initialization() {
        Some(state) => log::warn!("Published failed chunk {:?} as {:?}", chunk.world_p(), state),
        None => log::error!("Chunk {:?} left the queue during recovery", chunk.world_p()),
    }
}
