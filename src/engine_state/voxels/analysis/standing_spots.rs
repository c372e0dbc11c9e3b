//! Standing-spot detection.
//!
//! A chunk is cut into overlapping tiles (neighboring tiles share one layer of
//! voxels). Each tile's boundary voxels decide whether something could stand
//! there, and every tile that passes gets a marker box in the chunk's LOD mesh.

use std::f32::consts::FRAC_PI_4;

use cgmath::{InnerSpace, Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::{
    boundary::{get_bounding_voxels_clipped_to, BoundaryVoxels},
    plane_fit::{best_fitting_plane, Plane},
    Aabb,
};
use crate::{
    core::ScratchArena,
    engine_state::{
        rendering::geometry_buffer::GeometryBuffer,
        voxels::{
            chunk::{copy_chunk_offset, volume, VoxelVolume},
            voxel::{palette::PaletteColor, Voxel},
        },
    },
};

/// Boundary voxels an 8x8x2 tile needs before it counts as standable.
pub const SLAB_MIN_BOUNDARY_VOXELS: usize = 64;

/// Boundary voxels an 8x8x8 tile needs before a plane fit is trusted.
pub const CUBE_MIN_BOUNDARY_VOXELS: usize = 32;

/// Fraction of the tile extent the marker box covers.
const MARKER_SCALE: f32 = 0.8;

/// How a tile is judged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandingSpotRule {
    /// Thin 9x9x3 tiles; standable when the surface covers the whole tile.
    #[default]
    Slab,
    /// 9x9x9 tiles; standable when the fitted surface is nearly level.
    Cube,
}

impl StandingSpotRule {
    /// Tile dimension, including the layer shared with the next tile.
    pub fn tile_dim(self) -> Vector3<i32> {
        match self {
            StandingSpotRule::Slab => Vector3::new(9, 9, 3),
            StandingSpotRule::Cube => Vector3::new(9, 9, 9),
        }
    }
}

/// Outcome for one tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StandingSpot {
    /// Whether the tile is standable.
    pub can_stand: bool,
    /// The fitted surface, when the rule fits one.
    pub plane: Option<Plane>,
}

/// 8x8x2 rule: enough surface voxels to cover the tile's footprint.
pub fn compute_standing_spot_8x8x2(tile: &VoxelVolume, boundary: &mut BoundaryVoxels) -> StandingSpot {
    get_bounding_voxels_clipped_to(tile, tile_clip(tile.dim), boundary);
    StandingSpot {
        can_stand: boundary.len() >= SLAB_MIN_BOUNDARY_VOXELS,
        plane: None,
    }
}

/// 8x8x8 rule: a well-supported plane fit whose normal is within a small
/// angle of straight up.
pub fn compute_standing_spot_8x8x8(tile: &VoxelVolume, boundary: &mut BoundaryVoxels) -> StandingSpot {
    get_bounding_voxels_clipped_to(tile, tile_clip(tile.dim), boundary);
    let plane = best_fitting_plane(&boundary.points);

    let max_tilt = (FRAC_PI_4 * 0.25).cos();
    let can_stand = boundary.len() > CUBE_MIN_BOUNDARY_VOXELS
        && plane.is_some_and(|plane| plane.normal.dot(Vector3::unit_z()) > max_tilt);

    StandingSpot { can_stand, plane }
}

/// Runs `rule` over every tile of `src` and draws a blue marker into `lod`
/// for each standable one. Markers are placed in `src` coordinates.
///
/// # Returns
/// The number of markers drawn.
pub fn compute_standing_spots(
    src: &VoxelVolume,
    rule: StandingSpotRule,
    lod: &mut GeometryBuffer,
    scratch: &mut ScratchArena<Voxel>,
) -> usize {
    let tile_dim = rule.tile_dim();
    let step = tile_dim - Vector3::new(1, 1, 1);
    let tiles = Vector3::new(
        (src.dim.x - 1) / step.x,
        (src.dim.y - 1) / step.y,
        (src.dim.z - 1) / step.z,
    );

    let marker = [
        step.x as f32 * MARKER_SCALE,
        step.y as f32 * MARKER_SCALE,
        step.z as f32 * MARKER_SCALE,
    ];
    let color = PaletteColor::Blue.rgba();

    let mut tile = VoxelVolume::from_buffer(tile_dim, scratch.take(volume(tile_dim)));
    let mut boundary = BoundaryVoxels::with_capacity(tile.volume());
    let mut drawn = 0;

    for ty in 0..tiles.y {
        for tx in 0..tiles.x {
            for tz in 0..tiles.z {
                let offset = Vector3::new(tx * step.x, ty * step.y, tz * step.z);
                copy_chunk_offset(src, &mut tile, offset);

                let spot = match rule {
                    StandingSpotRule::Slab => compute_standing_spot_8x8x2(&tile, &mut boundary),
                    StandingSpotRule::Cube => compute_standing_spot_8x8x8(&tile, &mut boundary),
                };
                if spot.can_stand {
                    let min = [offset.x as f32, offset.y as f32, offset.z as f32];
                    lod.draw_box(min, marker, color);
                    drawn += 1;
                }

                tile.clear();
                boundary.clear();
            }
        }
    }

    scratch.recycle(tile.into_buffer());
    drawn
}

fn tile_clip(dim: Vector3<i32>) -> Aabb {
    Aabb::min_dim(
        Point3::new(0.0, 0.0, 0.0),
        Vector3::new(dim.x as f32, dim.y as f32, dim.z as f32),
    )
}
