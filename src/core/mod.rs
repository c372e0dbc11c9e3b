//! # Core Module
//!
//! Concurrency primitives and memory helpers shared by the world, the mesher
//! and the worker pool.
//!
//! ## Key Components
//! - `MtResource`: reference-counted, lock-protected resource shared with jobs
//! - `TreiberStack` / `NodeArena`: lock-free LIFO of recyclable nodes with ABA protection
//! - `ScratchArena`: per-thread pool of zeroed buffers rewound after every job
//!
//! ## Usage
//! ```rust
//! use voxel_world::core::{NodeArena, TreiberStack};
//!
//! let arena = NodeArena::<u32>::new();
//! let stack = TreiberStack::new();
//! let node = arena.allocate();
//! arena.node(node).put(42);
//! stack.push(&arena, node);
//!
//! let popped = stack.pop(&arena).unwrap();
//! assert_eq!(arena.node(popped).take(), Some(42));
//! ```

pub mod mt_resource;
pub mod scratch_arena;
pub mod treiber_stack;

pub use mt_resource::MtResource;
pub use scratch_arena::ScratchArena;
pub use treiber_stack::{Node, NodeArena, NodeIndex, TreiberStack};
