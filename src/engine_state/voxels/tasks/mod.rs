//! # Voxel Tasks
//!
//! Job bodies that run on the worker pool for voxel data.

pub mod chunk_generation_task;
