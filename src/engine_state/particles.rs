//! CPU particle systems, advanced by `SimParticleSystem` jobs.
//!
//! A system emits particles from a point at a fixed rate, integrates them
//! under gravity and drops them when their lifetime runs out. After every step
//! it redraws its particles as small boxes into its own geometry buffer, which
//! the orchestrator stages with a `CopyBufferRef` job.

use cgmath::{Point3, Vector3};

use crate::{core::MtResource, engine_state::rendering::geometry_buffer::GeometryBuffer};

/// Vertices drawn per particle.
const PARTICLE_VERTS: usize = 36;

/// Emitter tunables.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleSystemDesc {
    /// Where particles are born, in world units.
    pub origin: Point3<f32>,
    /// Particles spawned per second.
    pub spawn_rate: f32,
    /// Seconds a particle lives.
    pub lifetime: f32,
    /// Upward launch speed; horizontal speed is random within the same bound.
    pub speed: f32,
    /// Acceleration applied every step.
    pub gravity: Vector3<f32>,
    /// Live particle limit.
    pub max_particles: usize,
    /// Edge length of the drawn box.
    pub size: f32,
    /// Box color.
    pub color: [f32; 4],
    /// Seed for the spawn jitter.
    pub seed: u64,
}

impl Default for ParticleSystemDesc {
    fn default() -> Self {
        Self {
            origin: Point3::new(0.0, 0.0, 0.0),
            spawn_rate: 64.0,
            lifetime: 2.0,
            speed: 4.0,
            gravity: Vector3::new(0.0, 0.0, -9.8),
            max_particles: 256,
            size: 0.2,
            color: [1.0, 0.6, 0.1, 1.0],
            seed: 0,
        }
    }
}

/// One live particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    /// Current position.
    pub position: Point3<f32>,
    /// Current velocity.
    pub velocity: Vector3<f32>,
    /// Seconds left to live.
    pub remaining: f32,
}

/// A particle emitter and its live particles.
#[derive(Debug)]
pub struct ParticleSystem {
    desc: ParticleSystemDesc,
    particles: Vec<Particle>,
    rng: fastrand::Rng,
    spawn_accumulator: f32,
    geometry: MtResource<GeometryBuffer>,
}

impl ParticleSystem {
    /// Creates an empty system.
    pub fn new(desc: ParticleSystemDesc) -> Self {
        Self {
            desc,
            particles: Vec::with_capacity(desc.max_particles),
            rng: fastrand::Rng::with_seed(desc.seed),
            spawn_accumulator: 0.0,
            geometry: MtResource::new(GeometryBuffer::new(desc.max_particles * PARTICLE_VERTS)),
        }
    }

    /// Live particles.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Shared handle to the drawn particles.
    pub fn geometry(&self) -> MtResource<GeometryBuffer> {
        self.geometry.clone()
    }

    /// Advances the system by `dt` seconds and redraws it.
    pub fn simulate(&mut self, dt: f32) {
        let dt = dt.max(0.0);

        self.particles.retain_mut(|particle| {
            particle.remaining -= dt;
            if particle.remaining <= 0.0 {
                return false;
            }
            particle.velocity += self.desc.gravity * dt;
            particle.position += particle.velocity * dt;
            true
        });

        self.spawn_accumulator += self.desc.spawn_rate * dt;
        while self.spawn_accumulator >= 1.0 {
            self.spawn_accumulator -= 1.0;
            if self.particles.len() < self.desc.max_particles {
                let particle = self.spawn();
                self.particles.push(particle);
            }
        }

        self.draw();
    }

    fn spawn(&mut self) -> Particle {
        let speed = self.desc.speed;
        let mut jitter = || (self.rng.f32() * 2.0 - 1.0) * speed;
        let velocity = Vector3::new(jitter(), jitter(), speed);
        Particle {
            position: self.desc.origin,
            velocity,
            remaining: self.desc.lifetime,
        }
    }

    fn draw(&self) {
        let mut geometry = self.geometry.get_mut();
        geometry.reset();
        let half = self.desc.size * 0.5;
        for particle in &self.particles {
            let p = particle.position;
            geometry.draw_box(
                [p.x - half, p.y - half, p.z - half],
                [self.desc.size; 3],
                self.desc.color,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn spawns_at_the_configured_rate() {
        let mut system = ParticleSystem::new(ParticleSystemDesc {
            spawn_rate: 10.0,
            ..ParticleSystemDesc::default()
        });
        system.simulate(0.5);
        assert_eq!(system.particles().len(), 5);
        assert_eq!(system.geometry().get().at(), 5 * PARTICLE_VERTS);
    }

    #[test]
    fn particles_fall_and_expire() {
        let mut system = ParticleSystem::new(ParticleSystemDesc {
            spawn_rate: 1.0,
            lifetime: 1.5,
            speed: 0.0,
            ..ParticleSystemDesc::default()
        });
        system.simulate(1.0);
        assert_eq!(system.particles().len(), 1);

        system.spawn_accumulator = f32::NEG_INFINITY;
        system.simulate(1.0);
        let particle = system.particles()[0];
        assert_relative_eq!(particle.velocity.z, -9.8);
        assert!(particle.position.z < 0.0);

        system.simulate(1.0);
        assert!(system.particles().is_empty());
        assert!(system.geometry().get().is_empty());
    }

    #[test]
    fn same_seed_same_particles() {
        let desc = ParticleSystemDesc {
            seed: 7,
            ..ParticleSystemDesc::default()
        };
        let mut a = ParticleSystem::new(desc);
        let mut b = ParticleSystem::new(desc);
        for _ in 0..10 {
            a.simulate(0.1);
            b.simulate(0.1);
        }
        assert_eq!(a.particles(), b.particles());
        assert!(!a.particles().is_empty());
    }

    #[test]
    fn live_count_is_capped() {
        let mut system = ParticleSystem::new(ParticleSystemDesc {
            spawn_rate: 1000.0,
            lifetime: 100.0,
            max_particles: 8,
            ..ParticleSystemDesc::default()
        });
        system.simulate(1.0);
        assert_eq!(system.particles().len(), 8);
    }
}
