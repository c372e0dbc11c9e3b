//! Padding handling: only the interior of a synthetic chunk reaches the world.

use cgmath::{Point3, Vector3};
use voxel_world::{
    config::{GeneratorKind, WorldConfig},
    engine_state::{
        voxels::{
            chunk::{copy_chunk_offset, lifecycle::ChunkState, VoxelVolume},
            generation::init_chunk_plane,
            voxel::palette::PaletteColor,
        },
        EngineState,
    },
};

const PADDING: Vector3<i32> = Vector3 { x: 1, y: 1, z: 1 };

fn copy_plane(z: i32) -> VoxelVolume {
    let chunk_dim = Vector3::new(8, 8, 8);
    let mut synthetic = VoxelVolume::new(chunk_dim + PADDING * 2);
    synthetic.filled_count = init_chunk_plane(&mut synthetic, z, PaletteColor::Green);

    let mut dest = VoxelVolume::new(chunk_dim);
    copy_chunk_offset(&synthetic, &mut dest, PADDING);
    dest
}

fn engine(z: i32) -> EngineState {
    EngineState::new(WorldConfig {
        chunk_dim: [8, 8, 8],
        visible_region: [8, 8, 8],
        generator: GeneratorKind::Plane { z },
        worker_threads: 4,
        ..WorldConfig::default()
    })
    .unwrap()
}

#[test]
fn plane_in_the_padding_is_dropped() {
    let dest = copy_plane(0);
    assert_eq!(dest.filled_count, 0);
    assert_eq!(dest.count_filled(), 0);
}

#[test]
fn first_interior_plane_lands_at_z_zero() {
    let dest = copy_plane(1);
    assert_eq!(dest.filled_count, 64);
    for p in dest.positions() {
        assert_eq!(dest.is_filled(p), p.z == 0, "{p:?}");
    }
}

#[test]
fn far_padding_plane_is_dropped() {
    assert_eq!(copy_plane(9).filled_count, 0);
    assert_eq!(copy_plane(8).filled_count, 64);
}

#[test]
fn streamed_chunks_never_contain_padding() {
    let mut engine = engine(0);
    engine.frame(Point3::new(0, 0, 0), Point3::new(0.0, 0.0, 0.0), 1.0 / 60.0);
    engine.wait_until_idle();

    assert_eq!(engine.world().live_chunk_count(), 512);
    for (_, chunk) in engine.world().live_chunks() {
        assert_eq!(chunk.lifecycle().state(), ChunkState::VoxelsInitialized);
        assert_eq!(chunk.read().volume.filled_count, 0);
        assert!(chunk.read().mesh.is_none());
    }
    // Meshes were taken for the padded plane and all handed back empty.
    assert_eq!(engine.freelist().free_meshes(), engine.freelist().meshes_allocated());
}

#[test]
fn streamed_chunks_hold_the_interior_plane() {
    let mut engine = engine(1);
    engine.frame(Point3::new(0, 0, 0), Point3::new(0.0, 0.0, 0.0), 1.0 / 60.0);
    engine.wait_until_idle();

    let world = engine.world();
    for (_, chunk) in world.live_chunks() {
        assert_eq!(chunk.lifecycle().state(), ChunkState::MeshComplete);
        let data = chunk.read();
        assert_eq!(data.volume.filled_count, 64);
        assert!(data.volume.is_filled(Point3::new(7, 7, 0)));
        assert!(!data.volume.is_filled(Point3::new(7, 7, 1)));
    }
    assert!(world.is_filled_in_world(Point3::new(3, 3, 0)));
    assert!(world.is_filled_in_world(Point3::new(-5, 2, -8)));
    assert!(!world.is_filled_in_world(Point3::new(3, 3, 1)));
    assert!(!world.is_filled_in_world(Point3::new(3, 3, -1)));
}
