//! Boundary voxels: filled voxels that touch empty space.

use cgmath::{Point3, Vector3};

use super::Aabb;
use crate::engine_state::voxels::{chunk::VoxelVolume, voxel::voxel_face::VoxelFace};

/// A set of voxel positions with their running bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryVoxels {
    /// Collected positions, in discovery order.
    pub points: Vec<Point3<i32>>,
    /// Component-wise minimum of `points`.
    pub min: Point3<i32>,
    /// Component-wise maximum of `points`.
    pub max: Point3<i32>,
}

impl Default for BoundaryVoxels {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundaryVoxels {
    /// An empty set with inverted bounds.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// An empty set with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        BoundaryVoxels {
            points: Vec::with_capacity(capacity),
            min: Point3::new(i32::MAX, i32::MAX, i32::MAX),
            max: Point3::new(i32::MIN, i32::MIN, i32::MIN),
        }
    }

    /// Adds a point and widens the bounds.
    pub fn push(&mut self, p: Point3<i32>) {
        self.points.push(p);
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when no point was collected.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Forgets every point, keeping the allocation.
    pub fn clear(&mut self) {
        self.points.clear();
        self.min = Point3::new(i32::MAX, i32::MAX, i32::MAX);
        self.max = Point3::new(i32::MIN, i32::MIN, i32::MIN);
    }

    /// Center of the bounds, `None` for an empty set.
    pub fn midpoint(&self) -> Option<Point3<i32>> {
        (!self.is_empty()).then(|| self.min + (self.max - self.min) / 2)
    }
}

/// True when any in-volume face neighbor of `p` is empty.
///
/// Neighbors outside the volume are ignored.
pub fn has_unfilled_neighbors(volume: &VoxelVolume, p: Point3<i32>) -> bool {
    VoxelFace::all().iter().any(|face| {
        let neighbor = p + face.offset();
        volume.contains(neighbor) && !volume.is_filled(neighbor)
    })
}

/// Collects every filled voxel inside `clip` (inclusive) that has an empty
/// neighbor.
pub fn get_bounding_voxels_clipped_to(volume: &VoxelVolume, clip: Aabb, dest: &mut BoundaryVoxels) {
    for (p, _) in volume.filled_voxels() {
        let point = Point3::new(p.x as f32, p.y as f32, p.z as f32);
        if clip.contains(point) && has_unfilled_neighbors(volume, p) {
            dest.push(p);
        }
    }
}

/// Walks from `start` in steps of `step` until leaving the volume, recording
/// every voxel whose filled state differs from the one before it.
pub fn find_boundary_voxels_along_edge(
    volume: &VoxelVolume,
    start: Point3<i32>,
    step: Vector3<i32>,
    dest: &mut BoundaryVoxels,
) {
    let mut p = start;
    let mut previous = None;
    while volume.contains(p) {
        let filled = volume.is_filled(p);
        if previous.is_some_and(|was_filled| was_filled != filled) {
            dest.push(p);
        }
        previous = Some(filled);
        p += step;
    }
}

/// Records filled-state crossings along the twelve edges of the volume.
pub fn find_edge_intersections(volume: &VoxelVolume, dest: &mut BoundaryVoxels) {
    let d = volume.dim;
    let walks = [
        (Point3::new(0, 0, 0), [Vector3::new(1, 0, 0), Vector3::new(0, 1, 0), Vector3::new(0, 0, 1)]),
        (
            Point3::new(0, d.y - 1, d.z - 1),
            [Vector3::new(1, 0, 0), Vector3::new(0, -1, 0), Vector3::new(0, 0, -1)],
        ),
        (
            Point3::new(d.x - 1, d.y - 1, 0),
            [Vector3::new(-1, 0, 0), Vector3::new(0, -1, 0), Vector3::new(0, 0, 1)],
        ),
        (
            Point3::new(d.x - 1, 0, d.z - 1),
            [Vector3::new(-1, 0, 0), Vector3::new(0, 1, 0), Vector3::new(0, 0, -1)],
        ),
    ];

    for (start, steps) in walks {
        for step in steps {
            find_boundary_voxels_along_edge(volume, start, step, dest);
        }
    }
}

/// Midpoint of the edge crossings, a cheap estimate of where the surface
/// passes through the volume.
pub fn bounding_voxels_midpoint(volume: &VoxelVolume) -> Option<Point3<i32>> {
    let mut crossings = BoundaryVoxels::new();
    find_edge_intersections(volume, &mut crossings);
    crossings.midpoint()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::voxel::{palette::PaletteColor, Voxel};

    fn slab(dim: Vector3<i32>, height: i32) -> VoxelVolume {
        let mut volume = VoxelVolume::new(dim);
        for p in volume.positions().collect::<Vec<_>>() {
            if p.z < height {
                volume.set(p, Voxel::filled(PaletteColor::Stone));
            }
        }
        volume
    }

    #[test]
    fn top_layer_of_a_slab_is_the_boundary() {
        let volume = slab(Vector3::new(4, 4, 4), 2);
        let mut boundary = BoundaryVoxels::new();
        let clip = Aabb::min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 4.0, 4.0));
        get_bounding_voxels_clipped_to(&volume, clip, &mut boundary);

        assert_eq!(boundary.len(), 16);
        assert!(boundary.points.iter().all(|p| p.z == 1));
        assert_eq!(boundary.min, Point3::new(0, 0, 1));
        assert_eq!(boundary.max, Point3::new(3, 3, 1));
    }

    #[test]
    fn clip_box_limits_the_scan() {
        let volume = slab(Vector3::new(4, 4, 4), 2);
        let mut boundary = BoundaryVoxels::new();
        let clip = Aabb::min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 4.0));
        get_bounding_voxels_clipped_to(&volume, clip, &mut boundary);
        assert_eq!(boundary.len(), 4);
    }

    #[test]
    fn out_of_volume_neighbors_do_not_count() {
        let volume = slab(Vector3::new(2, 2, 2), 2);
        assert!(!has_unfilled_neighbors(&volume, Point3::new(0, 0, 0)));
    }

    #[test]
    fn vertical_edges_cross_at_the_surface() {
        let volume = slab(Vector3::new(4, 4, 6), 3);
        let mut crossings = BoundaryVoxels::new();
        find_edge_intersections(&volume, &mut crossings);

        // Four vertical edges, one crossing each; horizontal edges are uniform.
        assert_eq!(crossings.len(), 4);
        assert!(crossings.points.iter().all(|p| p.z == 3 || p.z == 2));
        assert!(bounding_voxels_midpoint(&volume).is_some());
        assert_eq!(bounding_voxels_midpoint(&VoxelVolume::new(Vector3::new(3, 3, 3))), None);
    }
}
