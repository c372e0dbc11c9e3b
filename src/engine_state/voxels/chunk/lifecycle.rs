//! # Chunk Lifecycle
//!
//! Every world chunk moves through
//!
//! ```text
//! Uninitialized -> Queued -> VoxelsInitialized -> MeshComplete
//! ```
//!
//! plus two side flags. `Garbage` is raised by the main thread when a queued
//! chunk leaves the visible region, and `Collected` is raised by the worker that
//! skipped generation because of it. The worker hands such a chunk back as
//! `Uninitialized`, and the next table rebuild frees it.
//!
//! ## Ordering
//!
//! The main thread only writes `Queued` and the side flags. Workers only advance
//! `Queued` onward. Before a worker publishes a new state it issues a full fence,
//! so anything that observes `VoxelsInitialized` also observes the voxels and the
//! mesh written before it.

use std::sync::atomic::{fence, AtomicBool, AtomicU8, Ordering};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Primary lifecycle state of a world chunk.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive)]
pub enum ChunkState {
    /// Pooled or freshly handed out, no job pending.
    Uninitialized = 0,
    /// An init job is in the work queue or running.
    Queued = 1,
    /// Voxels are final and readable.
    VoxelsInitialized = 2,
    /// A non-empty mesh is attached and may be copied out.
    MeshComplete = 3,
}

/// Atomic lifecycle word of one chunk.
#[derive(Debug)]
pub struct ChunkLifecycle {
    state: AtomicU8,
    garbage: AtomicBool,
    collected: AtomicBool,
}

impl Default for ChunkLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkLifecycle {
    /// A lifecycle in `Uninitialized` with no side flags.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ChunkState::Uninitialized as u8),
            garbage: AtomicBool::new(false),
            collected: AtomicBool::new(false),
        }
    }

    /// Current state.
    pub fn state(&self) -> ChunkState {
        let raw = self.state.load(Ordering::Acquire);
        match ChunkState::from_u8(raw) {
            Some(state) => state,
            None => unreachable!("corrupt chunk state {}", raw),
        }
    }

    /// True while an init job is pending or running.
    pub fn is_queued(&self) -> bool {
        self.state() == ChunkState::Queued
    }

    /// True once voxels are readable.
    pub fn is_voxels_initialized(&self) -> bool {
        self.state() >= ChunkState::VoxelsInitialized
    }

    /// True once a non-empty mesh is attached.
    pub fn is_mesh_complete(&self) -> bool {
        self.state() == ChunkState::MeshComplete
    }

    /// True when the chunk left the visible region while queued.
    pub fn is_garbage(&self) -> bool {
        self.garbage.load(Ordering::Acquire)
    }

    /// True when a worker skipped this garbage chunk and handed it back.
    pub fn is_collected(&self) -> bool {
        self.collected.load(Ordering::Acquire)
    }

    /// Claims the chunk for an init job. Clears stale side flags.
    ///
    /// # Panics
    /// Panics if the chunk is not `Uninitialized`; a chunk may only be queued once.
    pub fn queue_for_init(&self) {
        self.garbage.store(false, Ordering::Relaxed);
        self.collected.store(false, Ordering::Relaxed);
        if let Err(actual) = self.state.compare_exchange(
            ChunkState::Uninitialized as u8,
            ChunkState::Queued as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            panic!("chunk queued from state {:?}", ChunkState::from_u8(actual));
        }
    }

    /// Flags a queued chunk that left the visible region.
    ///
    /// The flag is raised before the state is read back, so the worker either
    /// sees it before generating or has already published. Returns false in
    /// the second case: the flag is lowered again and the chunk is an ordinary
    /// initialized chunk.
    pub fn mark_garbage(&self) -> bool {
        self.garbage.store(true, Ordering::SeqCst);
        if self.state.load(Ordering::SeqCst) == ChunkState::Queued as u8 {
            return true;
        }
        self.garbage.store(false, Ordering::SeqCst);
        false
    }

    /// Publishes a finished init job.
    ///
    /// # Panics
    /// Panics if the chunk was not queued.
    pub fn finalize_initialization(&self, mesh_has_vertices: bool) {
        fence(Ordering::SeqCst);
        self.advance(ChunkState::Queued, ChunkState::VoxelsInitialized);
        if mesh_has_vertices {
            self.advance(ChunkState::VoxelsInitialized, ChunkState::MeshComplete);
        }
    }

    /// Hands a garbage chunk back without generating it.
    ///
    /// # Panics
    /// Panics if the chunk is not a queued garbage chunk.
    pub fn abandon_garbage(&self) {
        assert!(self.is_garbage(), "abandoning a live chunk");
        self.collected.store(true, Ordering::Release);
        fence(Ordering::SeqCst);
        self.advance(ChunkState::Queued, ChunkState::Uninitialized);
    }

    /// Publishes a chunk whose init job failed.
    ///
    /// A garbage chunk is handed back as by [`ChunkLifecycle::abandon_garbage`];
    /// any other goes to `VoxelsInitialized`. Returns the new state, or `None`
    /// if the chunk was no longer queued.
    pub fn fail_initialization(&self) -> Option<ChunkState> {
        let to = if self.is_garbage() {
            self.collected.store(true, Ordering::Release);
            ChunkState::Uninitialized
        } else {
            ChunkState::VoxelsInitialized
        };
        fence(Ordering::SeqCst);
        self.state
            .compare_exchange(
                ChunkState::Queued as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| to)
    }

    /// Returns the word to its pooled state.
    pub fn reset(&self) {
        self.garbage.store(false, Ordering::Relaxed);
        self.collected.store(false, Ordering::Relaxed);
        self.state
            .store(ChunkState::Uninitialized as u8, Ordering::Release);
    }

    fn advance(&self, from: ChunkState, to: ChunkState) {
        if let Err(actual) =
            self.state
                .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            panic!(
                "chunk moved {:?} -> {:?} from state {:?}",
                from,
                to,
                ChunkState::from_u8(actual)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        let lifecycle = ChunkLifecycle::new();
        let mut seen = vec![lifecycle.state()];

        lifecycle.queue_for_init();
        seen.push(lifecycle.state());
        lifecycle.finalize_initialization(true);
        seen.push(lifecycle.state());

        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!(lifecycle.is_mesh_complete());
        assert!(lifecycle.is_voxels_initialized());
    }

    #[test]
    fn empty_mesh_stops_at_voxels_initialized() {
        let lifecycle = ChunkLifecycle::new();
        lifecycle.queue_for_init();
        lifecycle.finalize_initialization(false);
        assert_eq!(lifecycle.state(), ChunkState::VoxelsInitialized);
    }

    #[test]
    #[should_panic(expected = "chunk queued from state")]
    fn double_queue_panics() {
        let lifecycle = ChunkLifecycle::new();
        lifecycle.queue_for_init();
        lifecycle.queue_for_init();
    }

    #[test]
    #[should_panic]
    fn finalize_without_queue_panics() {
        ChunkLifecycle::new().finalize_initialization(true);
    }

    #[test]
    fn garbage_is_handed_back_uninitialized() {
        let lifecycle = ChunkLifecycle::new();
        lifecycle.queue_for_init();
        assert!(lifecycle.mark_garbage());
        lifecycle.abandon_garbage();
        assert_eq!(lifecycle.state(), ChunkState::Uninitialized);
        assert!(lifecycle.is_garbage());
        assert!(lifecycle.is_collected());

        lifecycle.queue_for_init();
        assert!(!lifecycle.is_garbage());
        assert!(!lifecycle.is_collected());
    }

    #[test]
    fn reset_clears_everything() {
        let lifecycle = ChunkLifecycle::new();
        lifecycle.queue_for_init();
        assert!(lifecycle.mark_garbage());
        lifecycle.reset();
        assert_eq!(lifecycle.state(), ChunkState::Uninitialized);
        assert!(!lifecycle.is_garbage());
    }

    #[test]
    fn published_chunk_refuses_the_garbage_flag() {
        let lifecycle = ChunkLifecycle::new();
        lifecycle.queue_for_init();
        lifecycle.finalize_initialization(true);

        assert!(!lifecycle.mark_garbage());
        assert!(!lifecycle.is_garbage());
        assert!(lifecycle.is_mesh_complete());
    }

    #[test]
    fn failed_initialization_publishes_or_hands_back() {
        let live = ChunkLifecycle::new();
        live.queue_for_init();
        assert_eq!(live.fail_initialization(), Some(ChunkState::VoxelsInitialized));
        assert_eq!(live.fail_initialization(), None);

        let garbage = ChunkLifecycle::new();
        garbage.queue_for_init();
        assert!(garbage.mark_garbage());
        assert_eq!(garbage.fail_initialization(), Some(ChunkState::Uninitialized));
        assert!(garbage.is_collected());
    }
}
