//! # Engine State Module
//!
//! The streaming orchestrator: everything the main thread does per frame.
//!
//! ## Key Components
//!
//! * `EngineState` - owns the world, the worker pool and the shared buffers
//! * `streaming` - the per-frame walk that queues init and copy jobs
//! * `staging_buffer` - the vertex buffer a renderer consumes each frame
//! * `particles` - CPU particle systems simulated on the worker pool
//! * `rendering` - geometry buffers, the mesher and the mesh freelist
//! * `task_management` - job rings and worker threads
//! * `voxels` - voxels, chunks, the world index, generation and analyses
//!
//! ## Frame
//!
//! 1. If the camera crossed into another chunk, rebuild the world index
//!    around it (`World::collect_unused_chunks`)
//! 2. Clear the staging buffer and walk the visible region (`buffer_world`)
//! 3. Queue particle simulation and copy jobs
//! 4. Drain the high-priority queue on the main thread, then wait for any
//!    worker still draining it
//! 5. Rewind the main thread's scratch arena
//!
//! After `frame` returns, the staging buffer holds every mesh of the visible
//! region that was complete at the start of the frame, in camera-relative
//! coordinates.

use std::{sync::Arc, time::Duration};

use cgmath::{Point3, Vector3};

use crate::{
    config::{ConfigError, WorldConfig},
    core::MtResource,
};
use particles::{ParticleSystem, ParticleSystemDesc};
use rendering::meshing::mesh_freelist::MeshFreelist;
use staging_buffer::StagingBuffer;
use streaming::{buffer_world, BufferStats};
use task_management::{
    task::{CopyBufferRefJob, JobContext, WorkQueueEntry},
    PoolStats, WorkerPool, WorkerPoolDesc,
};
use voxels::{
    chunk::volume,
    generation::ChunkGenerator,
    world::{CollectStats, World},
};

pub mod particles;
pub mod rendering;
pub mod staging_buffer;
pub mod streaming;
pub mod task_management;
pub mod voxels;

/// What one frame did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames run so far, including this one.
    pub frame: u64,
    /// Index rebuild, when the center moved.
    pub collect: Option<CollectStats>,
    /// Visible-region walk.
    pub buffered: BufferStats,
    /// Chunks in the world index after the frame.
    pub live_chunks: usize,
    /// Mesh buffers allocated so far.
    pub meshes_allocated: usize,
    /// Worker pool counters after the frame.
    pub pool: PoolStats,
}

/// The main state container for the streamed world.
///
/// # Examples
///
/// ```no_run
/// use cgmath::Point3;
/// use voxel_world::{config::WorldConfig, engine_state::EngineState};
///
/// let mut engine = EngineState::new(WorldConfig::default()).unwrap();
/// let stats = engine.frame(Point3::new(0, 0, 0), Point3::new(0.0, 0.0, 0.0), 1.0 / 60.0);
/// println!("{} chunks resident", stats.live_chunks);
/// ```
pub struct EngineState {
    world: World,
    pool: WorkerPool,
    freelist: Arc<MeshFreelist>,
    staging: Arc<StagingBuffer>,
    particle_systems: Vec<MtResource<ParticleSystem>>,
    config: WorldConfig,
    frame_count: u64,
}

impl EngineState {
    /// Validates `config` and starts the worker pool.
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let freelist = Arc::new(MeshFreelist::new(config.mesh_buffer_vertices));
        let staging = Arc::new(StagingBuffer::new(config.staging_buffer_vertices));
        let context = JobContext {
            freelist: freelist.clone(),
            staging: staging.clone(),
            generator: Arc::new(ChunkGenerator::from_config(&config)),
            chunk_dim: config.chunk_dim(),
            standing_spots: config
                .compute_standing_spots
                .then_some(config.standing_spot_rule),
        };

        let synthetic_volume = volume(config.chunk_dim() + Vector3::new(2, 2, 2));
        let pool = WorkerPool::new(
            WorkerPoolDesc {
                workers: config.worker_count(),
                queue_capacity: config.work_queue_capacity(),
                poll_interval: Duration::from_millis(config.poll_interval_ms),
                scratch_retain: 2 * synthetic_volume,
            },
            context,
        );

        log::info!(
            "World: chunk {:?}, visible region {:?}, {} hash buckets, generator {:?}",
            config.chunk_dim,
            config.visible_region,
            config.hash_size(),
            config.generator
        );

        Ok(Self {
            world: World::new(&config),
            pool,
            freelist,
            staging,
            particle_systems: Vec::new(),
            config,
            frame_count: 0,
        })
    }

    /// Runs one frame centered on chunk `center`, with the camera at
    /// `camera` (world units) and `dt` seconds since the last frame.
    pub fn frame(&mut self, center: Point3<i32>, camera: Point3<f32>, dt: f32) -> FrameStats {
        self.frame_count += 1;

        let collect = if center != self.world.center {
            self.world.center = center;
            Some(self.world.collect_unused_chunks(&self.freelist))
        } else {
            None
        };

        self.staging.clear();
        let buffered = buffer_world(&mut self.world, &mut self.pool, &self.staging, camera);
        self.queue_particle_jobs(camera, dt);

        self.pool.drain_high_priority();
        self.pool.wait_for_high_priority_workers();
        self.pool.rewind_main_thread_scratch();

        let stats = FrameStats {
            frame: self.frame_count,
            collect,
            buffered,
            live_chunks: self.world.live_chunk_count(),
            meshes_allocated: self.freelist.meshes_allocated(),
            pool: self.pool.stats(),
        };
        log::debug!("Frame {}: {:?}", self.frame_count, stats);
        stats
    }

    fn queue_particle_jobs(&mut self, camera: Point3<f32>, dt: f32) {
        let basis = Point3::new(0.0, 0.0, 0.0) - camera;
        for system in &self.particle_systems {
            let source = system.get().geometry();
            let count = source.get().at();
            if count > 0 {
                if let Some(dest) = self.staging.reserve(count) {
                    self.pool
                        .push_high(WorkQueueEntry::CopyBufferRef(CopyBufferRefJob { source, dest, basis }));
                }
            }
            self.pool.push_high(WorkQueueEntry::SimParticleSystem {
                system: system.clone(),
                dt,
            });
        }
    }

    /// Adds a particle system, simulated and staged every frame from the
    /// next one on. Its geometry is staged one frame behind its simulation.
    pub fn add_particle_system(&mut self, desc: ParticleSystemDesc) -> MtResource<ParticleSystem> {
        let system = MtResource::new(ParticleSystem::new(desc));
        self.particle_systems.push(system.clone());
        system
    }

    /// The world index.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The frame vertex buffer.
    pub fn staging(&self) -> &StagingBuffer {
        &self.staging
    }

    /// The mesh pool.
    pub fn freelist(&self) -> &MeshFreelist {
        &self.freelist
    }

    /// The active configuration.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Pauses background work without dropping it.
    pub fn suspend_workers(&self) {
        self.pool.suspend();
    }

    /// Resumes background work.
    pub fn resume_workers(&self) {
        self.pool.resume();
    }

    /// Blocks until every queued job has run.
    pub fn wait_until_idle(&self) {
        self.pool.wait_until_idle();
    }

    /// Stops and joins the workers. Also happens on drop.
    pub fn shutdown(&mut self) {
        self.pool.shutdown();
    }
}
