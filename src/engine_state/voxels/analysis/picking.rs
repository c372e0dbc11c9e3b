//! Ray picking against the streamed world.
//!
//! Picking is two-phase: a slab test finds the resident chunks the ray passes
//! through, then a voxel march inside each chunk, nearest first, finds the
//! first filled voxel.

use std::sync::Arc;

use cgmath::{InnerSpace, Point3, Vector3};

use super::{Aabb, Ray};
use crate::engine_state::voxels::{chunk::VoxelVolume, chunk::WorldChunk, world::World};

/// Nudge past a chunk's entry face so the march starts inside it.
const CHUNK_ENTRY_EPSILON: f32 = 0.1;

/// Directions shorter than this count as no direction at all.
const MIN_DIRECTION_LENGTH: f32 = 1e-12;

/// A chunk the ray passes through.
#[derive(Clone, Debug)]
pub struct ChunkHit {
    /// The chunk.
    pub chunk: Arc<WorldChunk>,
    /// Ray parameter where the ray enters the chunk's box.
    pub t: f32,
}

/// The first filled voxel along a ray.
#[derive(Clone, Debug)]
pub struct VoxelHit {
    /// Chunk holding the voxel.
    pub chunk: Arc<WorldChunk>,
    /// Ray parameter where the ray enters that chunk.
    pub t_chunk: f32,
    /// Distance from the ray origin to the point the march stopped at.
    pub t_voxel: f32,
    /// Chunk-local voxel position.
    pub voxel: Point3<i32>,
}

impl World {
    /// Slab-tests every resident chunk of the visible region against `ray`.
    ///
    /// Every hit is appended to `hits` (unsorted).
    ///
    /// # Returns
    /// The nearest hit, if any.
    pub fn get_chunks_intersecting_ray(&self, ray: &Ray, hits: &mut Vec<ChunkHit>) -> Option<ChunkHit> {
        let (min, max) = self.visible_bounds();
        let dim = self.chunk_dim;
        let extent = Vector3::new(dim.x as f32, dim.y as f32, dim.z as f32);
        let mut closest: Option<ChunkHit> = None;

        for z in min.z..max.z {
            for y in min.y..max.y {
                for x in min.x..max.x {
                    let p = Point3::new(x, y, z);
                    let Some(chunk) = self.get_world_chunk(p) else {
                        continue;
                    };
                    let chunk_min = Point3::new(
                        (dim.x * p.x) as f32,
                        (dim.y * p.y) as f32,
                        (dim.z * p.z) as f32,
                    );
                    let Some(t) = Aabb::min_dim(chunk_min, extent).intersect(ray) else {
                        continue;
                    };

                    let hit = ChunkHit { chunk, t };
                    if closest.as_ref().map_or(true, |best| t < best.t) {
                        closest = Some(hit.clone());
                    }
                    hits.push(hit);
                }
            }
        }

        closest
    }

    /// Finds the first filled voxel along `ray`.
    ///
    /// Chunks are visited nearest first; chunks that are empty or still
    /// generating are skipped. Inside a chunk the march advances one axis per
    /// step, cycling x, y, z, using the normalized direction so every step
    /// moves at least a fraction of a voxel.
    ///
    /// Returns `None` for a ray whose direction is zero, not finite or too
    /// short to normalize. `t_chunk` is in units of the caller's `ray.dir`.
    pub fn ray_trace_collision(&self, ray: &Ray) -> Option<VoxelHit> {
        let (dir, length) = unit_direction(ray.dir)?;
        let unit_ray = Ray::new(ray.origin, dir);

        let mut hits = Vec::new();
        self.get_chunks_intersecting_ray(&unit_ray, &mut hits);
        hits.sort_by(|a, b| a.t.total_cmp(&b.t));

        let dim = self.chunk_dim;
        for hit in hits {
            if !hit.chunk.lifecycle().is_voxels_initialized() {
                continue;
            }
            let data = hit.chunk.read();
            if data.volume.filled_count == 0 {
                continue;
            }

            let chunk_min = Point3::new(
                (dim.x * data.world_p.x) as f32,
                (dim.y * data.world_p.y) as f32,
                (dim.z * data.world_p.z) as f32,
            );
            let start = unit_ray.at(hit.t) + dir * CHUNK_ENTRY_EPSILON;
            let mut at = Point3::new(0.0, 0.0, 0.0) + (start - chunk_min);
            let mut axis = 0;

            while is_inside_dim(dim, at) {
                let voxel = voxel_position(at);
                if data.volume.is_filled(voxel) {
                    let world = chunk_min + (at - Point3::new(0.0, 0.0, 0.0));
                    let t_voxel = distance(world, ray.origin);
                    drop(data);
                    return Some(VoxelHit {
                        chunk: hit.chunk,
                        t_chunk: hit.t / length,
                        t_voxel,
                        voxel,
                    });
                }
                at[axis] += dir[axis];
                axis = (axis + 1) % 3;
            }
        }

        None
    }
}

/// Marches `ray` through `volume` from `start` (chunk-local), one unit step
/// along its normalized direction at a time.
///
/// When a march leaves the volume without a hit, the start point moves one
/// step along the sign of `centering` and the march repeats, until the start
/// itself leaves the volume. A zero `centering` means a single march.
///
/// A zero, non-finite or vanishing `ray` finds nothing.
pub fn ray_trace_chunk_collision(
    volume: &VoxelVolume,
    start: Point3<f32>,
    ray: Vector3<f32>,
    centering: Vector3<f32>,
) -> Option<Point3<i32>> {
    let (ray, _) = unit_direction(ray)?;
    let centering = Vector3::new(sign(centering.x), sign(centering.y), sign(centering.z));

    let mut cached = start;
    while is_inside_dim(volume.dim, cached) {
        let mut current = cached;
        while is_inside_dim(volume.dim, current) {
            let voxel = voxel_position(current);
            if volume.is_filled(voxel) {
                return Some(voxel);
            }
            current += ray;
        }

        if centering == Vector3::new(0.0, 0.0, 0.0) {
            break;
        }
        cached += centering;
    }

    None
}

/// `dir` scaled to unit length, and its original length.
fn unit_direction(dir: Vector3<f32>) -> Option<(Vector3<f32>, f32)> {
    let length = dir.magnitude();
    if !length.is_finite() || length < MIN_DIRECTION_LENGTH {
        return None;
    }
    Some((dir / length, length))
}

fn is_inside_dim(dim: Vector3<i32>, p: Point3<f32>) -> bool {
    p.x >= 0.0
        && p.y >= 0.0
        && p.z >= 0.0
        && p.x < dim.x as f32
        && p.y < dim.y as f32
        && p.z < dim.z as f32
}

fn voxel_position(p: Point3<f32>) -> Point3<i32> {
    Point3::new(p.x.floor() as i32, p.y.floor() as i32, p.z.floor() as i32)
}

fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn distance(a: Point3<f32>, b: Point3<f32>) -> f32 {
    let d = a - b;
    (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::WorldConfig,
        engine_state::voxels::{
            generation::init_chunk_plane,
            voxel::{palette::PaletteColor, Voxel},
        },
    };
    use approx::assert_relative_eq;

    fn small_world() -> World {
        let config = WorldConfig {
            chunk_dim: [8, 8, 8],
            visible_region: [4, 4, 4],
            ..WorldConfig::default()
        };
        World::new(&config)
    }

    fn add_floor_chunk(world: &mut World, p: Point3<i32>, top: i32) -> Arc<WorldChunk> {
        let chunk = world.get_world_chunk_for(p).unwrap();
        chunk.lifecycle().queue_for_init();
        {
            let mut data = chunk.write();
            for z in 0..=top {
                data.volume.filled_count += init_chunk_plane(&mut data.volume, z, PaletteColor::Stone);
            }
        }
        chunk.lifecycle().finalize_initialization(false);
        chunk
    }

    #[test]
    fn nearest_chunk_is_reported() {
        let mut world = small_world();
        add_floor_chunk(&mut world, Point3::new(0, 0, 0), 2);
        add_floor_chunk(&mut world, Point3::new(1, 0, 0), 2);

        let ray = Ray::new(Point3::new(-5.0, 4.0, 4.0), Vector3::new(1.0, 0.0, 0.0));
        let mut hits = Vec::new();
        let closest = world.get_chunks_intersecting_ray(&ray, &mut hits).unwrap();

        assert_eq!(hits.len(), 2);
        assert_relative_eq!(closest.t, 5.0);
        assert_eq!(closest.chunk.world_p(), Point3::new(0, 0, 0));
    }

    #[test]
    fn downward_ray_hits_the_floor() {
        let mut world = small_world();
        add_floor_chunk(&mut world, Point3::new(0, 0, 0), 2);

        let ray = Ray::new(Point3::new(4.5, 4.5, 20.0), Vector3::new(0.0, 0.0, -1.0));
        let hit = world.ray_trace_collision(&ray).unwrap();

        assert_eq!(hit.voxel, Point3::new(4, 4, 2));
        assert_relative_eq!(hit.t_chunk, 12.0);
        assert_relative_eq!(hit.t_voxel, 17.1, epsilon = 1e-4);
    }

    #[test]
    fn upward_ray_misses() {
        let mut world = small_world();
        add_floor_chunk(&mut world, Point3::new(0, 0, 0), 2);
        let ray = Ray::new(Point3::new(4.5, 4.5, 20.0), Vector3::new(0.0, 0.0, 1.0));
        assert!(world.ray_trace_collision(&ray).is_none());
    }

    #[test]
    fn chunks_still_generating_are_skipped() {
        let mut world = small_world();
        let chunk = world.get_world_chunk_for(Point3::new(0, 0, 0)).unwrap();
        chunk.lifecycle().queue_for_init();
        chunk.write().volume.set(Point3::new(4, 4, 0), Voxel::filled(PaletteColor::Stone));

        let ray = Ray::new(Point3::new(4.5, 4.5, 20.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(world.ray_trace_collision(&ray).is_none());
    }

    #[test]
    fn chunk_march_finds_a_voxel_on_its_row() {
        let mut volume = VoxelVolume::new(Vector3::new(8, 8, 8));
        volume.set(Point3::new(5, 3, 3), Voxel::filled(PaletteColor::Red));
        let hit = ray_trace_chunk_collision(
            &volume,
            Point3::new(0.5, 3.5, 3.5),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
        );
        assert_eq!(hit, Some(Point3::new(5, 3, 3)));
    }

    #[test]
    fn chunk_march_shifts_by_centering_after_a_miss() {
        let mut volume = VoxelVolume::new(Vector3::new(8, 8, 8));
        volume.set(Point3::new(5, 3, 3), Voxel::filled(PaletteColor::Red));
        let start = Point3::new(0.5, 0.5, 3.5);
        let ray = Vector3::new(1.0, 0.0, 0.0);

        let shifted = ray_trace_chunk_collision(&volume, start, ray, Vector3::new(0.0, 0.25, 0.0));
        assert_eq!(shifted, Some(Point3::new(5, 3, 3)));

        let away = ray_trace_chunk_collision(&volume, start, ray, Vector3::new(0.0, 0.0, -3.0));
        assert_eq!(away, None);
    }

    #[test]
    fn tiny_directions_march_like_unit_ones() {
        let mut world = small_world();
        add_floor_chunk(&mut world, Point3::new(0, 0, 0), 2);

        let ray = Ray::new(Point3::new(-5.0, 4.5, 1.5), Vector3::new(1e-9, 0.0, 0.0));
        let hit = world.ray_trace_collision(&ray).unwrap();
        assert_eq!(hit.voxel, Point3::new(0, 4, 1));
        assert_relative_eq!(hit.t_chunk, 5.0e9, max_relative = 1e-4);
        assert_relative_eq!(hit.t_voxel, 5.1, epsilon = 1e-4);

        let mut volume = VoxelVolume::new(Vector3::new(8, 8, 8));
        volume.set(Point3::new(5, 3, 3), Voxel::filled(PaletteColor::Red));
        let chunk_hit = ray_trace_chunk_collision(
            &volume,
            Point3::new(0.5, 3.5, 3.5),
            Vector3::new(1e-9, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
        );
        assert_eq!(chunk_hit, Some(Point3::new(5, 3, 3)));
    }

    #[test]
    fn directionless_rays_find_nothing() {
        let mut world = small_world();
        add_floor_chunk(&mut world, Point3::new(0, 0, 0), 2);
        let origin = Point3::new(4.5, 4.5, 1.5);
        let volume = world.chunk(world.lookup_index(Point3::new(0, 0, 0)).unwrap()).read().volume.clone();

        for dir in [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(f32::NAN, 0.0, -1.0),
            Vector3::new(0.0, f32::INFINITY, 0.0),
            Vector3::new(0.0, 0.0, -1e-30),
        ] {
            assert!(world.ray_trace_collision(&Ray::new(origin, dir)).is_none());
            assert_eq!(
                ray_trace_chunk_collision(&volume, origin, dir, Vector3::new(0.0, 0.0, 0.0)),
                None
            );
        }
    }
}
