//! # Voxel World
//!
//! Representation, indexing and generation of the streamed voxel world.
//!
//! ## Architecture
//!
//! * **Voxel**: two bytes per cell, a filled flag and a palette color
//! * **Chunk**: dense voxel volumes, the shared chunk record and its lifecycle
//! * **World**: double-buffered hash index over a recycled chunk pool
//! * **Generation**: deterministic noise-driven fill of padded chunks
//! * **Tasks**: the worker-side body of chunk initialization
//! * **Analysis**: boundary voxels, plane fits, standing spots and picking
//!
//! ## Data Flow
//!
//! 1. The orchestrator finds a visible position with no chunk and takes a
//!    record from the world's pool
//! 2. A worker generates the padded chunk, copies its interior and meshes it
//! 3. The lifecycle advance publishes the result to the main thread
//! 4. When the region moves away, the next index rebuild returns the record
//!    and its meshes to their pools
//!
//! ## Thread Safety
//!
//! The index and the pool are main-thread only. Chunk records are shared with
//! workers through `Arc`, and a chunk's data is written only by the job that
//! owns its `Queued` state.

pub mod analysis;
pub mod chunk;
pub mod generation;
pub mod tasks;
pub mod voxel;
pub mod world;
