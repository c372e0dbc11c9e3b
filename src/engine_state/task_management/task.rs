//! # Work Queue Entries
//!
//! Every unit of background work is one variant of [`WorkQueueEntry`], and
//! [`execute`] dispatches them with a single exhaustive `match`. Adding a job
//! kind is a compile error until it is handled.
//!
//! ## Job Kinds
//! - `InitWorldChunk`: generate, copy and mesh one chunk (low priority)
//! - `CopyBuffer`: stage one chunk mesh into the frame buffer (high priority)
//! - `CopyBufferRef`: stage a shared mesh, e.g. a particle system's
//! - `CopyBufferSet`: up to [`MAX_COPY_TARGETS`] small chunk copies at once
//! - `SimParticleSystem`: advance a particle system
//! - `Noop`: never scheduled on purpose
//!
//! ## Thread-Local State
//! Each thread that runs jobs owns a [`ThreadLocalState`]: its scratch arena
//! plus handles to the shared services jobs need. Nothing in it is shared
//! mutably between threads.

use std::sync::Arc;

use cgmath::Vector3;

use crate::{
    core::{MtResource, ScratchArena},
    engine_state::{
        particles::ParticleSystem,
        rendering::{geometry_buffer::GeometryBuffer, meshing::mesh_freelist::MeshFreelist},
        staging_buffer::{ReservedRange, StagingBuffer},
        voxels::{
            analysis::standing_spots::StandingSpotRule,
            chunk::WorldChunk,
            generation::ChunkGenerator,
            tasks::chunk_generation_task::initialize_world_chunk,
            voxel::Voxel,
        },
    },
};

/// Copies a `CopyBufferSet` holds at most.
pub const MAX_COPY_TARGETS: usize = 64;

/// Stages one chunk's mesh (or LOD mesh) at a reserved range.
#[derive(Debug)]
pub struct CopyBufferJob {
    /// Source chunk, `MeshComplete` when the job was created.
    pub chunk: Arc<WorldChunk>,
    /// Copy the LOD mesh instead of the surface mesh.
    pub lod: bool,
    /// Destination range in the staging buffer.
    pub dest: ReservedRange,
    /// Render-space translation added to every position.
    pub basis: Vector3<f32>,
}

impl CopyBufferJob {
    /// Runs the copy.
    pub fn run(&self, staging: &StagingBuffer) {
        let data = self.chunk.read();
        let mesh = if self.lod {
            data.lod_mesh.as_deref()
        } else {
            data.mesh.as_deref()
        };
        match mesh {
            Some(mesh) if mesh.at() >= self.dest.count => staging.write(self.dest, mesh, self.basis),
            _ => {
                log::warn!(
                    "Chunk {:?} lost its mesh before it was staged",
                    data.world_p
                );
                staging.zero(self.dest);
            }
        }
    }
}

/// Stages a shared geometry buffer at a reserved range.
#[derive(Debug)]
pub struct CopyBufferRefJob {
    /// Source geometry.
    pub source: MtResource<GeometryBuffer>,
    /// Destination range in the staging buffer.
    pub dest: ReservedRange,
    /// Render-space translation added to every position.
    pub basis: Vector3<f32>,
}

impl CopyBufferRefJob {
    /// Runs the copy. The source may have shrunk since the range was
    /// reserved; only what it still holds is copied and the rest of the range
    /// is zeroed.
    pub fn run(&self, staging: &StagingBuffer) {
        let source = self.source.get();
        let copied = self.dest.count.min(source.at());
        staging.write(
            ReservedRange {
                start: self.dest.start,
                count: copied,
            },
            &source,
            self.basis,
        );
        if copied < self.dest.count {
            staging.zero(ReservedRange {
                start: self.dest.start + copied,
                count: self.dest.count - copied,
            });
        }
    }
}

/// A batch of small chunk copies run as one job.
#[derive(Debug, Default)]
pub struct CopyBufferSet {
    jobs: Vec<CopyBufferJob>,
}

impl CopyBufferSet {
    /// An empty batch.
    pub fn new() -> Self {
        Self {
            jobs: Vec::with_capacity(MAX_COPY_TARGETS),
        }
    }

    /// Adds a copy.
    ///
    /// # Panics
    /// Panics if the batch already holds [`MAX_COPY_TARGETS`] copies.
    pub fn push(&mut self, job: CopyBufferJob) {
        assert!(!self.is_full(), "copy set overflow");
        self.jobs.push(job);
    }

    /// True when no more copies fit.
    pub fn is_full(&self) -> bool {
        self.jobs.len() >= MAX_COPY_TARGETS
    }

    /// Copies in the batch.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Runs every copy in order.
    pub fn run(&self, staging: &StagingBuffer) {
        for job in &self.jobs {
            job.run(staging);
        }
    }
}

/// One unit of background work. Consumed exactly once.
#[derive(Debug)]
pub enum WorkQueueEntry {
    /// Generate and mesh a queued chunk.
    InitWorldChunk(Arc<WorldChunk>),
    /// Stage one chunk mesh.
    CopyBuffer(CopyBufferJob),
    /// Stage a shared mesh.
    CopyBufferRef(CopyBufferRefJob),
    /// Stage a batch of small chunk meshes.
    CopyBufferSet(CopyBufferSet),
    /// Advance a particle system by `dt` seconds.
    SimParticleSystem {
        /// The system to advance.
        system: MtResource<ParticleSystem>,
        /// Step length in seconds.
        dt: f32,
    },
    /// Does nothing. Scheduling it is a bug.
    Noop,
}

/// Shared services every job-running thread holds a handle to.
#[derive(Clone)]
pub struct JobContext {
    /// Pool chunk meshes come from.
    pub freelist: Arc<MeshFreelist>,
    /// Frame buffer copy jobs write into.
    pub staging: Arc<StagingBuffer>,
    /// Fills synthetic chunks.
    pub generator: Arc<ChunkGenerator>,
    /// Voxels per chunk along each axis.
    pub chunk_dim: Vector3<i32>,
    /// Standing-spot rule, when the analysis is enabled.
    pub standing_spots: Option<StandingSpotRule>,
}

/// Per-thread state handed to every job the thread runs.
pub struct ThreadLocalState {
    /// Scratch memory, rewound between jobs.
    pub scratch: ScratchArena<Voxel>,
    /// Shared services.
    pub context: JobContext,
}

impl ThreadLocalState {
    /// State for one thread. The arena keeps `scratch_retain` voxels cached
    /// across rewinds.
    pub fn new(context: JobContext, scratch_retain: usize) -> Self {
        Self {
            scratch: ScratchArena::new(scratch_retain),
            context,
        }
    }
}

/// Runs one entry on the calling thread.
pub fn execute(entry: WorkQueueEntry, local: &mut ThreadLocalState) {
    match entry {
        WorkQueueEntry::InitWorldChunk(chunk) => initialize_world_chunk(&chunk, local),
        WorkQueueEntry::CopyBuffer(job) => job.run(&local.context.staging),
        WorkQueueEntry::CopyBufferRef(job) => job.run(&local.context.staging),
        WorkQueueEntry::CopyBufferSet(set) => set.run(&local.context.staging),
        WorkQueueEntry::SimParticleSystem { system, dt } => system.get_mut().simulate(dt),
        WorkQueueEntry::Noop => {
            debug_assert!(false, "noop work queue entry");
            log::error!("Ignoring noop work queue entry");
        }
    }
}
