//! Untextured vertex storage for chunk meshes.
//!
//! A [`GeometryBuffer`] is a pre-sized set of parallel vertex arrays with a
//! write cursor. Buffers are allocated once at full capacity and recycled
//! through the mesh freelist, so meshing never allocates.
//!
//! # Memory Layout
//! - Positions: `[f32; 3]` per vertex
//! - Normals: `[f32; 3]` per vertex
//! - Colors: `[f32; 4]` per vertex (linear RGBA)
//!
//! The arrays are plain `Pod` data and can be handed to a GPU upload path as
//! bytes through the `*_bytes` accessors.

use cgmath::Vector3;

use crate::engine_state::voxels::voxel::voxel_face::{VoxelFace, VERTS_PER_FACE};

/// Default vertex capacity of a chunk mesh buffer.
pub const DEFAULT_MESH_VERTICES: usize = 64 * 1024;

/// Parallel vertex arrays with a cursor.
///
/// Invariant: `at() <= end()`. Writing past the end is a contract violation
/// and panics.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryBuffer {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    colors: Vec<[f32; 4]>,
    at: usize,
}

impl GeometryBuffer {
    /// Allocates a buffer able to hold `capacity` vertices.
    pub fn new(capacity: usize) -> Self {
        Self {
            positions: vec![[0.0; 3]; capacity],
            normals: vec![[0.0; 3]; capacity],
            colors: vec![[0.0; 4]; capacity],
            at: 0,
        }
    }

    /// Number of vertices written.
    pub fn at(&self) -> usize {
        self.at
    }

    /// Vertex capacity.
    pub fn end(&self) -> usize {
        self.positions.len()
    }

    /// Free vertex slots.
    pub fn remaining(&self) -> usize {
        self.end() - self.at
    }

    /// True when no vertex has been written.
    pub fn is_empty(&self) -> bool {
        self.at == 0
    }

    /// Rewinds the cursor. Stale vertex data is left in place.
    pub fn reset(&mut self) {
        self.at = 0;
    }

    /// Appends vertices whose normals and colors were prepared by the caller.
    ///
    /// # Panics
    /// Panics if the slices differ in length or the buffer would overflow.
    pub fn buffer_verts_direct(
        &mut self,
        positions: &[[f32; 3]],
        normals: &[[f32; 3]],
        colors: &[[f32; 4]],
    ) {
        let count = positions.len();
        assert!(
            normals.len() == count && colors.len() == count,
            "mismatched vertex attribute slices"
        );
        assert!(
            self.at + count <= self.end(),
            "geometry buffer overflow: {} + {} > {}",
            self.at,
            count,
            self.end()
        );
        let range = self.at..self.at + count;
        self.positions[range.clone()].copy_from_slice(positions);
        self.normals[range.clone()].copy_from_slice(normals);
        self.colors[range].copy_from_slice(colors);
        self.at += count;
    }

    /// Appends one voxel face as two triangles.
    pub fn push_face(&mut self, face: VoxelFace, min: [f32; 3], diameter: [f32; 3], color: [f32; 4]) {
        let positions = face.vertices(min, diameter);
        self.buffer_verts_direct(
            &positions,
            &[face.normal(); VERTS_PER_FACE],
            &[color; VERTS_PER_FACE],
        );
    }

    /// Appends all six faces of an axis-aligned box.
    pub fn draw_box(&mut self, min: [f32; 3], diameter: [f32; 3], color: [f32; 4]) {
        for face in VoxelFace::all() {
            self.push_face(face, min, diameter, color);
        }
    }

    /// Written positions.
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions[..self.at]
    }

    /// Written normals.
    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals[..self.at]
    }

    /// Written colors.
    pub fn colors(&self) -> &[[f32; 4]] {
        &self.colors[..self.at]
    }

    /// Written positions as raw bytes.
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.positions())
    }

    /// Written normals as raw bytes.
    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.normals())
    }

    /// Written colors as raw bytes.
    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.colors())
    }

    /// Copies every written vertex into `dest` at `dest_offset`, translating
    /// positions by `basis`.
    ///
    /// # Panics
    /// Panics if `dest` cannot hold the copy.
    pub fn copy_translated_into(&self, dest: &mut GeometryBuffer, dest_offset: usize, basis: Vector3<f32>) {
        self.copy_prefix_translated_into(dest, dest_offset, self.at, basis);
    }

    /// Like [`GeometryBuffer::copy_translated_into`], limited to the first
    /// `count` written vertices.
    ///
    /// # Panics
    /// Panics if `count` exceeds the written vertices or `dest` cannot hold the copy.
    pub fn copy_prefix_translated_into(
        &self,
        dest: &mut GeometryBuffer,
        dest_offset: usize,
        count: usize,
        basis: Vector3<f32>,
    ) {
        assert!(count <= self.at, "copy of {} vertices from a buffer holding {}", count, self.at);
        assert!(
            dest_offset + count <= dest.end(),
            "copy of {} vertices at {} overflows {}",
            count,
            dest_offset,
            dest.end()
        );
        let range = dest_offset..dest_offset + count;
        for (dst, src) in dest.positions[range.clone()].iter_mut().zip(&self.positions[..count]) {
            *dst = [src[0] + basis.x, src[1] + basis.y, src[2] + basis.z];
        }
        dest.normals[range.clone()].copy_from_slice(&self.normals[..count]);
        dest.colors[range].copy_from_slice(&self.colors[..count]);
        dest.at = dest.at.max(dest_offset + count);
    }

    /// Zeroes `count` vertices at `offset`, marking them written.
    ///
    /// # Panics
    /// Panics if the range overflows the buffer.
    pub fn zero_range(&mut self, offset: usize, count: usize) {
        assert!(
            offset + count <= self.end(),
            "zeroing {} vertices at {} overflows {}",
            count,
            offset,
            self.end()
        );
        let range = offset..offset + count;
        self.positions[range.clone()].fill([0.0; 3]);
        self.normals[range.clone()].fill([0.0; 3]);
        self.colors[range].fill([0.0; 4]);
        self.at = self.at.max(offset + count);
    }

    /// Clamps positions into `[min, max]` and shifts them so `min` becomes the
    /// origin. Coordinates above `max` snap to the box dimension and coordinates
    /// below `min` snap to zero.
    pub fn clip_and_displace_to_min_dim(&mut self, min: [f32; 3], max: [f32; 3]) {
        let dim = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
        for position in &mut self.positions[..self.at] {
            for axis in 0..3 {
                let value = position[axis];
                position[axis] = if value > max[axis] {
                    dim[axis]
                } else if value < min[axis] {
                    0.0
                } else {
                    value - min[axis]
                };
            }
        }
    }
}

impl Default for GeometryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MESH_VERTICES)
    }
}
