//! # World Configuration
//!
//! Tunables for the streaming world, loaded from JSON with `serde_json`. Every
//! field has a default, so a config file only needs to name what it changes:
//!
//! ```json
//! {
//!     "visible_region": [6, 6, 4],
//!     "generator": { "kind": "perlin_plane", "frequency": 50.0, "amplitude": 15.0, "z_min": 0 }
//! }
//! ```

use std::{fs, path::Path};

use cgmath::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine_state::voxels::analysis::standing_spots::StandingSpotRule;

/// Errors raised while loading or validating a [`WorldConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read world config: {0}")]
    Io(#[from] std::io::Error),
    /// The config file is not valid JSON for [`WorldConfig`].
    #[error("failed to parse world config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("invalid world config: {0}")]
    Validation(String),
}

/// Which procedural generator fills new chunks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorKind {
    /// Volumetric 3D noise, filled where the rounded sample is one.
    Perlin,
    /// A 2D height field: noise sampled on the xy plane against a z ramp.
    PerlinPlane {
        /// Divisor applied to absolute x and y before sampling.
        frequency: f64,
        /// Height in voxels over which the noise ramp is spread.
        amplitude: f64,
        /// Absolute z of the bottom of the ramp.
        z_min: i32,
    },
    /// Alternating filled voxels below an absolute height.
    Checkerboard {
        /// Absolute z below which voxels may be filled.
        z_threshold: i32,
    },
    /// A single filled z-slice of the synthetic chunk.
    Plane {
        /// Slice index inside the padded chunk.
        z: i32,
    },
    /// Nothing is ever filled.
    Empty,
}

impl Default for GeneratorKind {
    fn default() -> Self {
        GeneratorKind::PerlinPlane {
            frequency: 50.0,
            amplitude: 15.0,
            z_min: 0,
        }
    }
}

/// Runtime configuration for the world and its worker pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Voxels per chunk along each axis.
    pub chunk_dim: [i32; 3],
    /// Chunks kept resident along each axis, centered on the camera chunk.
    pub visible_region: [i32; 3],
    /// Hash table buckets per visible-region chunk.
    pub hash_size_multiplier: usize,
    /// Capacity of the free-chunk stack. Zero means one slot per hash bucket;
    /// anything else must be at least that.
    pub free_chunk_capacity: usize,
    /// Entries per work queue. Zero means twice the visible-region volume.
    pub work_queue_size: usize,
    /// Vertex capacity of every freshly allocated mesh buffer. Must hold the
    /// densest possible chunk surface, see [`WorldConfig::max_mesh_vertices`].
    pub mesh_buffer_vertices: usize,
    /// Vertex capacity of the frame staging buffer.
    pub staging_buffer_vertices: usize,
    /// Worker threads. Zero picks one less than the available parallelism.
    pub worker_threads: usize,
    /// How long an idle worker sleeps between queue polls.
    pub poll_interval_ms: u64,
    /// Seed for the noise generator.
    pub noise_seed: u32,
    /// Generator used for new chunks.
    pub generator: GeneratorKind,
    /// Run the standing-spot analysis and draw it into each chunk's LOD mesh.
    pub compute_standing_spots: bool,
    /// Tile rule the standing-spot analysis applies.
    pub standing_spot_rule: StandingSpotRule,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_dim: [16, 8, 16],
            visible_region: [8, 8, 8],
            hash_size_multiplier: 4,
            free_chunk_capacity: 0,
            work_queue_size: 0,
            mesh_buffer_vertices: 65_536,
            staging_buffer_vertices: 4 * 1024 * 1024,
            worker_threads: 0,
            poll_interval_ms: 1,
            noise_seed: 0,
            generator: GeneratorKind::default(),
            compute_standing_spots: false,
            standing_spot_rule: StandingSpotRule::Slab,
        }
    }
}

impl WorldConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parses and validates a JSON config.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: WorldConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_dim.iter().any(|&d| d < 1) {
            return Err(ConfigError::Validation(format!(
                "chunk_dim must be positive, got {:?}",
                self.chunk_dim
            )));
        }
        if self.visible_region.iter().any(|&d| d < 1) {
            return Err(ConfigError::Validation(format!(
                "visible_region must be positive, got {:?}",
                self.visible_region
            )));
        }
        if self.hash_size_multiplier < 2 {
            return Err(ConfigError::Validation(
                "hash_size_multiplier must be at least 2 to hold garbage chunks".into(),
            ));
        }
        if self.mesh_buffer_vertices < self.max_mesh_vertices() {
            return Err(ConfigError::Validation(format!(
                "mesh_buffer_vertices {} cannot hold a worst-case chunk mesh ({})",
                self.mesh_buffer_vertices,
                self.max_mesh_vertices()
            )));
        }
        if self.free_chunk_capacity != 0 && self.free_chunk_capacity < self.hash_size() {
            return Err(ConfigError::Validation(format!(
                "free_chunk_capacity {} is smaller than the hash table ({})",
                self.free_chunk_capacity,
                self.hash_size()
            )));
        }
        if self.work_queue_size != 0 && self.work_queue_size < self.region_volume() {
            return Err(ConfigError::Validation(format!(
                "work_queue_size {} cannot hold one job per visible chunk ({})",
                self.work_queue_size,
                self.region_volume()
            )));
        }
        match self.generator {
            GeneratorKind::PerlinPlane {
                frequency,
                amplitude,
                ..
            } if frequency <= 0.0 || amplitude <= 0.0 => Err(ConfigError::Validation(
                "perlin_plane frequency and amplitude must be positive".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Chunk dimension as a vector.
    pub fn chunk_dim(&self) -> Vector3<i32> {
        Vector3::from(self.chunk_dim)
    }

    /// Visible region as a vector.
    pub fn visible_region(&self) -> Vector3<i32> {
        Vector3::from(self.visible_region)
    }

    /// Number of chunks in the visible region.
    pub fn region_volume(&self) -> usize {
        self.visible_region.iter().map(|&d| d.max(0) as usize).product()
    }

    /// Buckets per hash table.
    pub fn hash_size(&self) -> usize {
        self.region_volume() * self.hash_size_multiplier
    }

    /// Vertices in the largest mesh one chunk can produce.
    ///
    /// Every quad separates a filled voxel from an empty one: at most one per
    /// pair of neighbors inside the chunk plus one per face on its surface,
    /// six vertices each. LOD marker meshes are far smaller.
    pub fn max_mesh_vertices(&self) -> usize {
        let [x, y, z] = self.chunk_dim.map(|d| d.max(0) as usize);
        let faces = 3 * x * y * z + x * y + y * z + x * z;
        6 * faces
    }

    /// Resolved free-chunk stack capacity.
    pub fn free_chunk_capacity(&self) -> usize {
        if self.free_chunk_capacity == 0 {
            self.hash_size()
        } else {
            self.free_chunk_capacity
        }
    }

    /// Resolved work queue capacity.
    pub fn work_queue_capacity(&self) -> usize {
        if self.work_queue_size == 0 {
            2 * self.region_volume()
        } else {
            self.work_queue_size
        }
    }

    /// Resolved worker count, never zero.
    pub fn worker_count(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = WorldConfig::from_json_str(
            r#"{ "visible_region": [4, 4, 2], "generator": { "kind": "checkerboard", "z_threshold": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.chunk_dim, [16, 8, 16]);
        assert_eq!(config.region_volume(), 32);
        assert_eq!(config.hash_size(), 128);
        assert_eq!(config.work_queue_capacity(), 64);
        assert_eq!(config.free_chunk_capacity(), 128);
        assert_eq!(config.generator, GeneratorKind::Checkerboard { z_threshold: 3 });
    }

    #[test]
    fn rejects_degenerate_values() {
        let err = WorldConfig::from_json_str(r#"{ "chunk_dim": [0, 8, 8] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = WorldConfig::from_json_str(r#"{ "hash_size_multiplier": 1 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = WorldConfig::from_json_str(r#"{ "free_chunk_capacity": 1 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = WorldConfig::from_json_str(r#"{ "mesh_buffer_vertices": 6 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = WorldConfig::from_json_str(r#"{ "chunk_dim": "big" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn mesh_capacity_bound_covers_a_checkerboard_chunk() {
        let config = WorldConfig {
            chunk_dim: [4, 4, 4],
            ..WorldConfig::default()
        };
        // 32 isolated voxels, six quads each.
        assert!(config.max_mesh_vertices() >= 32 * 36);
        assert_eq!(config.max_mesh_vertices(), 6 * (192 + 48));
        assert!(WorldConfig::default().validate().is_ok());

        let tight = WorldConfig {
            mesh_buffer_vertices: config.max_mesh_vertices(),
            free_chunk_capacity: config.hash_size(),
            ..config
        };
        assert!(tight.validate().is_ok());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = WorldConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn default_generator_round_trips_through_json() {
        let text = serde_json::to_string(&WorldConfig::default()).unwrap();
        assert!(text.contains("\"perlin_plane\""));
        assert_eq!(WorldConfig::from_json_str(&text).unwrap(), WorldConfig::default());
    }
}
