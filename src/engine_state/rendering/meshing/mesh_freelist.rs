//! Lock-free recycling of chunk mesh buffers.
//!
//! Mesh buffers are large (tens of thousands of vertices each), so they are
//! allocated once and then passed between chunks forever. The freelist keeps
//! two [`TreiberStack`]s over one [`NodeArena`] of containers:
//!
//! - `first_free`: containers currently holding a spare mesh
//! - `containers`: empty containers waiting for the next returned mesh
//!
//! Workers take meshes while initializing chunks; the main thread returns them
//! when chunks are freed. Neither side blocks the other.

use std::sync::atomic::{fence, AtomicUsize, Ordering};

use crate::core::{NodeArena, TreiberStack};
use crate::engine_state::rendering::geometry_buffer::GeometryBuffer;

/// Shared pool of reusable mesh buffers.
#[derive(Debug)]
pub struct MeshFreelist {
    arena: NodeArena<Box<GeometryBuffer>>,
    first_free: TreiberStack,
    containers: TreiberStack,
    mesh_vertices: usize,
    meshes_allocated: AtomicUsize,
}

impl MeshFreelist {
    /// Creates an empty freelist whose fresh meshes hold `mesh_vertices` vertices.
    pub fn new(mesh_vertices: usize) -> Self {
        Self {
            arena: NodeArena::new(),
            first_free: TreiberStack::new(),
            containers: TreiberStack::new(),
            mesh_vertices,
            meshes_allocated: AtomicUsize::new(0),
        }
    }

    /// Takes a spare mesh, or allocates a new one when none is free.
    ///
    /// The returned mesh is empty (`at() == 0`).
    pub fn get_mesh_for_chunk(&self) -> Box<GeometryBuffer> {
        if let Some(container) = self.first_free.pop(&self.arena) {
            let mesh = self.arena.node(container).take();
            fence(Ordering::SeqCst);
            self.containers.push(&self.arena, container);
            if let Some(mesh) = mesh {
                debug_assert_eq!(mesh.at(), 0);
                return mesh;
            }
            log::warn!("Mesh freelist container was empty");
        }

        let total = self.meshes_allocated.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!(
            "Mesh freelist empty, allocating mesh #{} ({} vertices)",
            total,
            self.mesh_vertices
        );
        Box::new(GeometryBuffer::new(self.mesh_vertices))
    }

    /// Returns a mesh to the pool, rewinding it first.
    pub fn deallocate_mesh(&self, mut mesh: Box<GeometryBuffer>) {
        mesh.reset();
        let container = self
            .containers
            .pop(&self.arena)
            .unwrap_or_else(|| self.arena.allocate());
        let previous = self.arena.node(container).put(mesh);
        debug_assert!(previous.is_none(), "container already held a mesh");
        self.first_free.push(&self.arena, container);
    }

    /// Meshes allocated over the lifetime of the pool.
    pub fn meshes_allocated(&self) -> usize {
        self.meshes_allocated.load(Ordering::Relaxed)
    }

    /// Spare meshes currently pooled. Only exact while no thread is using the pool.
    pub fn free_meshes(&self) -> usize {
        self.first_free.len(&self.arena)
    }

    /// Container records ever allocated.
    pub fn containers_allocated(&self) -> usize {
        self.arena.allocated()
    }
}
