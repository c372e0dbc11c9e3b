//! # Procedural Generation
//!
//! Fills a synthetic (padded) chunk from a deterministic noise function.
//!
//! ## Coordinates
//!
//! Every generator samples absolute positions, so the same voxel gets the same
//! answer from whichever chunk's padding it falls in. For synthetic voxel `v`
//! of a chunk at grid position `syn_p` the sample point on each axis is
//! `(v + chunk_dim * syn_p) / frequency`, with `chunk_dim` the world chunk
//! dimension, not the padded one.
//!
//! ## Generators
//!
//! * `Perlin` - volumetric noise, filled where the rounded sample is one
//! * `PerlinPlane` - 2D height field sampled on the xy plane
//! * `Checkerboard` - parity pattern below an absolute height
//! * `Plane` - one filled z-slice, for tests and flat debug worlds
//! * `Empty` - nothing

use cgmath::{Point3, Vector3};
use noise::{NoiseFn, Perlin};

use super::{
    chunk::{positions, VoxelVolume},
    voxel::{palette::PaletteColor, Voxel},
};
use crate::config::{GeneratorKind, WorldConfig};

/// Frequency divisor of the volumetric `Perlin` generator.
pub const NOISE_FREQUENCY: f64 = 200.0;

/// A deterministic real-valued function of three coordinates.
pub trait NoiseProvider: Send + Sync {
    /// Samples the noise field.
    fn noise(&self, x: f64, y: f64, z: f64) -> f64;
}

impl NoiseProvider for Perlin {
    fn noise(&self, x: f64, y: f64, z: f64) -> f64 {
        self.get([x, y, z])
    }
}

/// Fills synthetic chunks with one of the [`GeneratorKind`] patterns.
pub struct ChunkGenerator {
    kind: GeneratorKind,
    noise: Box<dyn NoiseProvider>,
}

impl ChunkGenerator {
    /// A generator with an explicit noise source.
    pub fn new(kind: GeneratorKind, noise: Box<dyn NoiseProvider>) -> Self {
        Self { kind, noise }
    }

    /// A generator backed by `noise::Perlin` seeded from the config.
    pub fn from_config(config: &WorldConfig) -> Self {
        Self::new(config.generator, Box::new(Perlin::new(config.noise_seed)))
    }

    /// The configured pattern.
    pub fn kind(&self) -> GeneratorKind {
        self.kind
    }

    /// Fills `synthetic`, a chunk at grid position `syn_p`, and returns the
    /// number of voxels it filled.
    ///
    /// `synthetic` is expected to be empty on entry.
    pub fn generate(
        &self,
        synthetic: &mut VoxelVolume,
        syn_p: Point3<i32>,
        chunk_dim: Vector3<i32>,
    ) -> usize {
        debug_assert_eq!(synthetic.filled_count, 0);
        let filled = match self.kind {
            GeneratorKind::Perlin => self.init_chunk_perlin(synthetic, syn_p, chunk_dim),
            GeneratorKind::PerlinPlane {
                frequency,
                amplitude,
                z_min,
            } => self.init_chunk_perlin_plane(synthetic, syn_p, chunk_dim, frequency, amplitude, z_min),
            GeneratorKind::Checkerboard { z_threshold } => {
                init_chunk_checkerboard(synthetic, syn_p, chunk_dim, z_threshold)
            }
            GeneratorKind::Plane { z } => init_chunk_plane(synthetic, z, PaletteColor::Green),
            GeneratorKind::Empty => 0,
        };
        synthetic.filled_count = filled;
        filled
    }

    fn init_chunk_perlin(&self, synthetic: &mut VoxelVolume, syn_p: Point3<i32>, chunk_dim: Vector3<i32>) -> usize {
        let mut filled = 0;
        for (index, p) in positions(synthetic.dim).enumerate() {
            let absolute = absolute_position(p, syn_p, chunk_dim);
            let sample = self.noise.noise(
                absolute[0] / NOISE_FREQUENCY,
                absolute[1] / NOISE_FREQUENCY,
                absolute[2] / NOISE_FREQUENCY,
            );
            if (sample + 0.5).floor() == 1.0 {
                synthetic.voxels[index] = Voxel::filled(PaletteColor::GrassGreen);
                filled += 1;
            }
        }
        filled
    }

    fn init_chunk_perlin_plane(
        &self,
        synthetic: &mut VoxelVolume,
        syn_p: Point3<i32>,
        chunk_dim: Vector3<i32>,
        frequency: f64,
        amplitude: f64,
        z_min: i32,
    ) -> usize {
        let dim = synthetic.dim;
        let mut filled = 0;
        for y in 0..dim.y {
            for x in 0..dim.x {
                let absolute = absolute_position(Point3::new(x, y, 0), syn_p, chunk_dim);
                let sample = self
                    .noise
                    .noise(absolute[0] / frequency, absolute[1] / frequency, 1.0);
                for z in 0..dim.z {
                    let z_absolute = z as f64 - (z_min as f64 - amplitude)
                        + chunk_dim.z as f64 * syn_p.z as f64;
                    if sample > z_absolute / amplitude {
                        let index = (x + y * dim.x + z * dim.x * dim.y) as usize;
                        synthetic.voxels[index] = Voxel::filled(PaletteColor::GrassGreen);
                        filled += 1;
                    }
                }
            }
        }
        filled
    }
}

fn absolute_position(p: Point3<i32>, syn_p: Point3<i32>, chunk_dim: Vector3<i32>) -> [f64; 3] {
    [
        p.x as f64 + chunk_dim.x as f64 * syn_p.x as f64,
        p.y as f64 + chunk_dim.y as f64 * syn_p.y as f64,
        p.z as f64 + chunk_dim.z as f64 * syn_p.z as f64,
    ]
}

/// Fills the whole z-slice `z` with `color`. Returns the voxels filled.
pub fn init_chunk_plane(volume: &mut VoxelVolume, z: i32, color: PaletteColor) -> usize {
    let dim = volume.dim;
    if z < 0 || z >= dim.z {
        return 0;
    }
    let mut filled = 0;
    for y in 0..dim.y {
        for x in 0..dim.x {
            let index = (x + y * dim.x + z * dim.x * dim.y) as usize;
            if !volume.voxels[index].is_filled() {
                filled += 1;
            }
            volume.voxels[index] = Voxel::filled(color);
        }
    }
    filled
}

fn init_chunk_checkerboard(
    volume: &mut VoxelVolume,
    syn_p: Point3<i32>,
    chunk_dim: Vector3<i32>,
    z_threshold: i32,
) -> usize {
    let mut filled = 0;
    for (index, p) in positions(volume.dim).enumerate() {
        let absolute = Point3::new(
            p.x + chunk_dim.x * syn_p.x,
            p.y + chunk_dim.y * syn_p.y,
            p.z + chunk_dim.z * syn_p.z,
        );
        if absolute.z < z_threshold && (absolute.x + absolute.y + absolute.z).rem_euclid(2) == 0 {
            volume.voxels[index] = Voxel::filled(PaletteColor::Stone);
            filled += 1;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(dim: Vector3<i32>) -> VoxelVolume {
        VoxelVolume::new(dim + Vector3::new(2, 2, 2))
    }

    #[test]
    fn same_seed_same_chunk() {
        let config = WorldConfig {
            generator: GeneratorKind::Perlin,
            noise_seed: 1234,
            ..WorldConfig::default()
        };
        let dim = Vector3::new(8, 8, 8);
        let a = ChunkGenerator::from_config(&config);
        let b = ChunkGenerator::from_config(&config);

        let mut first = synthetic(dim);
        let mut second = synthetic(dim);
        let p = Point3::new(3, -1, 2);
        let filled = a.generate(&mut first, p, dim);
        b.generate(&mut second, p, dim);

        assert_eq!(first, second);
        assert_eq!(filled, first.count_filled());
    }

    #[test]
    fn noise_sample_is_deterministic() {
        let noise = Perlin::new(99);
        let again = Perlin::new(99);
        assert_eq!(noise.noise(1.25, -3.5, 0.75), again.noise(1.25, -3.5, 0.75));
    }

    struct ConstantNoise(f64);

    impl NoiseProvider for ConstantNoise {
        fn noise(&self, _: f64, _: f64, _: f64) -> f64 {
            self.0
        }
    }

    #[test]
    fn perlin_plane_fills_below_the_ramp() {
        // The ramp starts at z_min - amplitude = 10, so z is filled while (z - 10) / 10 < 0.5.
        let generator = ChunkGenerator::new(
            GeneratorKind::PerlinPlane {
                frequency: 50.0,
                amplitude: 10.0,
                z_min: 20,
            },
            Box::new(ConstantNoise(0.5)),
        );
        let dim = Vector3::new(4, 4, 20);
        let mut volume = VoxelVolume::new(dim);
        let filled = generator.generate(&mut volume, Point3::new(0, 0, 0), dim);

        assert_eq!(filled, 15 * 16);
        assert!(volume.is_filled(Point3::new(0, 0, 14)));
        assert!(!volume.is_filled(Point3::new(0, 0, 15)));
    }

    #[test]
    fn volumetric_perlin_uses_rounded_samples() {
        let full = ChunkGenerator::new(GeneratorKind::Perlin, Box::new(ConstantNoise(0.6)));
        let none = ChunkGenerator::new(GeneratorKind::Perlin, Box::new(ConstantNoise(0.4)));
        let dim = Vector3::new(2, 2, 2);

        let mut volume = VoxelVolume::new(dim);
        assert_eq!(full.generate(&mut volume, Point3::new(0, 0, 0), dim), 8);
        let mut volume = VoxelVolume::new(dim);
        assert_eq!(none.generate(&mut volume, Point3::new(0, 0, 0), dim), 0);
    }

    #[test]
    fn checkerboard_is_continuous_across_chunks() {
        let generator = ChunkGenerator::new(
            GeneratorKind::Checkerboard { z_threshold: 100 },
            Box::new(ConstantNoise(0.0)),
        );
        let dim = Vector3::new(3, 3, 3);
        let mut left = VoxelVolume::new(dim);
        let mut right = VoxelVolume::new(dim);
        generator.generate(&mut left, Point3::new(0, 0, 0), dim);
        generator.generate(&mut right, Point3::new(1, 0, 0), dim);

        // Absolute x = 2 and x = 3 must alternate.
        let edge = left.is_filled(Point3::new(2, 0, 0));
        assert_ne!(edge, right.is_filled(Point3::new(0, 0, 0)));
    }

    #[test]
    fn plane_fills_one_slice() {
        let mut volume = VoxelVolume::new(Vector3::new(4, 3, 5));
        assert_eq!(init_chunk_plane(&mut volume, 2, PaletteColor::Green), 12);
        assert_eq!(volume.count_filled(), 12);
        assert_eq!(init_chunk_plane(&mut volume, 9, PaletteColor::Green), 0);
    }
}
