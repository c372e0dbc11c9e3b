//! # Staging Buffer Module
//!
//! The per-frame vertex buffer the renderer consumes.
//!
//! ## Architecture
//!
//! The main thread reserves a vertex range for every copy job it creates, so
//! jobs running in parallel never write the same slots. Reservation is a
//! single atomic add on a cursor; the data itself sits behind an
//! [`MtResource`] that copy jobs lock only for the duration of their copy.
//!
//! At the start of each frame the buffer is cleared and the ranges are handed
//! out again from zero.
//!
//! ## Analytics
//!
//! Like the rest of the engine's buffers, the staging buffer tracks how much
//! of its capacity was used and how often it was written, for tuning.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use cgmath::Vector3;

use crate::{core::MtResource, engine_state::rendering::geometry_buffer::GeometryBuffer};

/// A vertex range reserved in the staging buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReservedRange {
    /// First vertex of the range.
    pub start: usize,
    /// Vertices in the range.
    pub count: usize,
}

/// Usage counters, reset by nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StagingAnalytics {
    /// Vertex capacity.
    pub allocated_vertices: usize,
    /// Vertices reserved in the current frame.
    pub used_vertices: usize,
    /// Copies written since creation.
    pub times_written: u64,
    /// Reservations refused because the buffer was full.
    pub times_overflowed: u64,
}

/// Shared frame vertex buffer with atomic range reservation.
#[derive(Debug)]
pub struct StagingBuffer {
    reserved: AtomicUsize,
    capacity: usize,
    data: MtResource<GeometryBuffer>,
    times_written: AtomicU64,
    times_overflowed: AtomicU64,
}

impl StagingBuffer {
    /// Allocates a buffer of `capacity` vertices.
    pub fn new(capacity: usize) -> Self {
        Self {
            reserved: AtomicUsize::new(0),
            capacity,
            data: MtResource::new(GeometryBuffer::new(capacity)),
            times_written: AtomicU64::new(0),
            times_overflowed: AtomicU64::new(0),
        }
    }

    /// Reserves `count` vertices.
    ///
    /// # Returns
    /// `None` when the frame's buffer is exhausted; the caller drops the copy.
    pub fn reserve(&self, count: usize) -> Option<ReservedRange> {
        let mut current = self.reserved.load(Ordering::Relaxed);
        loop {
            let end = current + count;
            if end > self.capacity {
                self.times_overflowed.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Staging buffer full, dropped {} vertices ({} of {} reserved)",
                    count,
                    current,
                    self.capacity
                );
                return None;
            }
            match self
                .reserved
                .compare_exchange_weak(current, end, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Some(ReservedRange { start: current, count }),
                Err(actual) => current = actual,
            }
        }
    }

    /// Copies the first `range.count` vertices of `src` into `range`,
    /// translated by `basis`.
    ///
    /// # Panics
    /// Panics if `src` holds fewer vertices than the range.
    pub fn write(&self, range: ReservedRange, src: &GeometryBuffer, basis: Vector3<f32>) {
        src.copy_prefix_translated_into(&mut self.data.get_mut(), range.start, range.count, basis);
        self.times_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Blanks `range` so a copy that could not run leaves no vertices from an
    /// earlier frame behind.
    pub fn zero(&self, range: ReservedRange) {
        self.data.get_mut().zero_range(range.start, range.count);
    }

    /// Forgets every reservation. Main thread only, between frames.
    pub fn clear(&self) {
        self.reserved.store(0, Ordering::Release);
        self.data.get_mut().reset();
    }

    /// Vertices reserved this frame.
    pub fn vertex_count(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Vertex capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Runs `f` on the staged vertices.
    pub fn with_geometry<R>(&self, f: impl FnOnce(&GeometryBuffer) -> R) -> R {
        f(&self.data.get())
    }

    /// A copy of the staged vertices.
    pub fn snapshot(&self) -> GeometryBuffer {
        self.data.get().clone()
    }

    /// Current usage counters.
    pub fn analytics(&self) -> StagingAnalytics {
        StagingAnalytics {
            allocated_vertices: self.capacity,
            used_vertices: self.vertex_count(),
            times_written: self.times_written.load(Ordering::Relaxed),
            times_overflowed: self.times_overflowed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::voxel::voxel_face::VoxelFace;
    use approx::assert_abs_diff_eq;

    fn one_box() -> GeometryBuffer {
        let mut mesh = GeometryBuffer::new(36);
        mesh.draw_box([0.0; 3], [1.0; 3], [1.0; 4]);
        mesh
    }

    #[test]
    fn ranges_do_not_overlap() {
        let staging = StagingBuffer::new(100);
        let a = staging.reserve(36).unwrap();
        let b = staging.reserve(36).unwrap();
        assert_eq!(a, ReservedRange { start: 0, count: 36 });
        assert_eq!(b.start, 36);
        assert!(staging.reserve(36).is_none());
        assert_eq!(staging.analytics().times_overflowed, 1);
        assert_eq!(staging.vertex_count(), 72);
    }

    #[test]
    fn writes_translate_into_place() {
        let staging = StagingBuffer::new(72);
        let mesh = one_box();
        let _first = staging.reserve(36).unwrap();
        let second = staging.reserve(36).unwrap();
        staging.write(second, &mesh, Vector3::new(16.0, 0.0, 0.0));

        staging.with_geometry(|geometry| {
            assert_eq!(geometry.at(), 72);
            assert_abs_diff_eq!(geometry.positions()[36][0], mesh.positions()[0][0] + 16.0);
        });
        assert_eq!(staging.analytics().times_written, 1);
    }

    #[test]
    fn clear_starts_a_new_frame() {
        let staging = StagingBuffer::new(36);
        let range = staging.reserve(6).unwrap();
        let mut face = GeometryBuffer::new(6);
        face.push_face(VoxelFace::Top, [0.0; 3], [1.0; 3], [1.0; 4]);
        staging.write(range, &face, Vector3::new(0.0, 0.0, 0.0));

        staging.clear();
        assert_eq!(staging.vertex_count(), 0);
        assert!(staging.snapshot().is_empty());
        assert_eq!(staging.reserve(36).map(|r| r.start), Some(0));
    }
}
