//! # Chunk Analysis
//!
//! Optional geometric queries over voxel volumes. None of these are needed to
//! stream and render the world; they feed the LOD overlay and picking.
//!
//! ## Key Components
//!
//! * `boundary` - filled voxels with an empty neighbor, and edge crossings
//! * `plane_fit` - least-squares plane through a point set
//! * `standing_spots` - tiles a chunk and marks walkable areas in its LOD mesh
//! * `picking` - ray queries against chunks and voxels

use cgmath::{Point3, Vector3};

pub mod boundary;
pub mod picking;
pub mod plane_fit;
pub mod standing_spots;

/// An axis-aligned box in voxel or world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Lower corner.
    pub min: Point3<f32>,
    /// Upper corner.
    pub max: Point3<f32>,
}

impl Aabb {
    /// A box from its lower corner and extent.
    pub fn min_dim(min: Point3<f32>, dim: Vector3<f32>) -> Self {
        Aabb { min, max: min + dim }
    }

    /// A box from both corners.
    pub fn min_max(min: Point3<f32>, max: Point3<f32>) -> Self {
        Aabb { min, max }
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: Point3<f32>) -> bool {
        p.x >= self.min.x
            && p.y >= self.min.y
            && p.z >= self.min.z
            && p.x <= self.max.x
            && p.y <= self.max.y
            && p.z <= self.max.z
    }

    /// Slab test. Returns the ray parameter where the ray enters the box, or
    /// zero when it starts inside. `None` when the box is missed or behind.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.dir[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if dir == 0.0 {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let t0 = (lo - origin) / dir;
            let t1 = (hi - origin) / dir;
            t_enter = t_enter.max(t0.min(t1));
            t_exit = t_exit.min(t0.max(t1));
        }

        (t_exit >= t_enter.max(0.0)).then_some(t_enter.max(0.0))
    }
}

/// A ray with a (not necessarily normalized) direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Start point.
    pub origin: Point3<f32>,
    /// Direction of travel.
    pub dir: Vector3<f32>,
}

impl Ray {
    /// A ray from `origin` along `dir`.
    pub fn new(origin: Point3<f32>, dir: Vector3<f32>) -> Self {
        Ray { origin, dir }
    }

    /// The point at parameter `t`.
    pub fn at(&self, t: f32) -> Point3<f32> {
        self.origin + self.dir * t
    }
}
