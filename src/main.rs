//! # Voxel World Headless Runner
//!
//! Streams the world around a camera flying along +x and logs what the
//! streamer does. Takes an optional path to a JSON [`WorldConfig`] and an
//! optional frame count.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- world.json 600
//! ```

use voxel_world::config::WorldConfig;

const DEFAULT_FRAMES: u64 = 240;

fn main() {
    voxel_world::init_logging();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => match WorldConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                log::error!("{path}: {err}");
                std::process::exit(1);
            }
        },
        None => WorldConfig::default(),
    };
    let frames = args
        .next()
        .and_then(|frames| frames.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);

    if let Err(err) = voxel_world::run(config, frames) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
