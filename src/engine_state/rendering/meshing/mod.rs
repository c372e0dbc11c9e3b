//! # Surface Meshing
//!
//! Converts a chunk's filled voxels into renderable faces.
//!
//! ## Algorithm
//!
//! For every filled voxel of the destination chunk, each of the six neighbors
//! is looked up in the padded synthetic chunk the voxels were generated in.
//! Destination position `p` sits at `p + 1` in the synthetic chunk, so the
//! neighbor across face `f` is at `p + 1 + f.offset()`, which always exists.
//! A face is emitted (two triangles, six vertices) only when that neighbor is
//! empty, so interior faces and faces against solid neighbors in adjacent
//! chunks are culled without touching those chunks.
//!
//! Positions are chunk-local (voxel min corner, unit diameter). Copy jobs add
//! the chunk's render-space basis when they stage the mesh.
//!
//! ## Key Components
//!
//! * `build_world_chunk_mesh` - the face-culling mesher
//! * `mesh_freelist` - lock-free pool the mesh buffers live in

use cgmath::{Point3, Vector3};

use crate::engine_state::{
    rendering::geometry_buffer::GeometryBuffer,
    voxels::{chunk::VoxelVolume, voxel::voxel_face::VoxelFace},
};

pub mod mesh_freelist;

/// Emits every visible face of `dest` into `geometry`.
///
/// `synthetic` must be `dest` plus one voxel of padding on every side, with the
/// same voxels in its interior.
///
/// # Returns
/// The number of vertices written.
///
/// # Panics
/// Panics if the synthetic chunk is not exactly two voxels larger than the
/// destination, or if `geometry` runs out of space.
pub fn build_world_chunk_mesh(
    synthetic: &VoxelVolume,
    dest: &VoxelVolume,
    geometry: &mut GeometryBuffer,
) -> usize {
    assert_eq!(
        synthetic.dim,
        dest.dim + Vector3::new(2, 2, 2),
        "synthetic chunk must pad the destination by one voxel"
    );

    let start = geometry.at();
    let padding = Vector3::new(1, 1, 1);

    for (p, voxel) in dest.filled_voxels() {
        let color = voxel.palette_color().rgba();
        let min = [p.x as f32, p.y as f32, p.z as f32];
        let synthetic_p: Point3<i32> = p + padding;

        for face in VoxelFace::all() {
            if !synthetic.is_filled(synthetic_p + face.offset()) {
                geometry.push_face(face, min, [1.0; 3], color);
            }
        }
    }

    geometry.at() - start
}
