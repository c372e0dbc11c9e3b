#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel World
//!
//! The world-chunk subsystem of a voxel engine: a streamed grid of fixed-size
//! voxel chunks around a moving center, generated procedurally and meshed on
//! a pool of worker threads.
//!
//! ## Key Modules
//!
//! * `config` - JSON-loadable tunables and their validation
//! * `core` - concurrency primitives and scratch memory
//! * `engine_state` - the orchestrator, the world, meshing and the worker pool
//!
//! ## Architecture
//!
//! The main thread owns the world index. Each frame it diffs the visible
//! region against the index, queues init jobs for missing chunks and copy jobs
//! for finished meshes, and waits for the copies. Workers generate and mesh
//! chunks in the background. The result of a frame is a staging buffer of
//! camera-relative vertices ready for any renderer.
//!
//! ## Usage
//!
//! ```no_run
//! use voxel_world::{config::WorldConfig, run};
//!
//! voxel_world::init_logging();
//! run(WorldConfig::default(), 120).unwrap();
//! ```

use cgmath::Point3;
use log::info;

use config::{ConfigError, WorldConfig};
use engine_state::EngineState;

pub mod config;
pub mod core;
pub mod engine_state;

/// Installs the stdout logger, filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let mut log_builder = env_logger::Builder::new();
    let installed = log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .try_init();

    if installed.is_ok() {
        info!("Logger initialized");
    }
}

/// Runs a headless streaming session of `frames` frames, moving the center
/// one voxel along +x per frame.
pub fn run(config: WorldConfig, frames: u64) -> Result<(), ConfigError> {
    let chunk_dim = config.chunk_dim();
    let mut engine = EngineState::new(config)?;

    for frame in 0..frames {
        let camera = Point3::new(frame as f32, 0.0, 0.0);
        let center = Point3::new((frame as i32).div_euclid(chunk_dim.x), 0, 0);
        let stats = engine.frame(center, camera, 1.0 / 60.0);

        if let Some(collect) = stats.collect {
            info!(
                "Frame {}: center {:?}, kept {}, garbage {}, freed {}",
                stats.frame, center, collect.kept, collect.garbage, collect.freed
            );
        }
    }

    engine.wait_until_idle();
    info!(
        "Session done: {} chunks resident, {} staged vertices, {} mesh buffers",
        engine.world().live_chunk_count(),
        engine.staging().vertex_count(),
        engine.freelist().meshes_allocated()
    );
    engine.shutdown();
    Ok(())
}
