//! # Lock-Free Index Stacks
//!
//! A Treiber stack over nodes that live in a grow-only [`NodeArena`].
//!
//! ## Architecture
//!
//! Nodes are addressed by [`NodeIndex`] and are never released, only recycled
//! between stacks. Because a node's memory outlives every stack operation, a
//! thread can always read `next` from a node it saw at the head, even when a
//! competing thread popped it in the meantime.
//!
//! The head word packs a 32 bit generation tag next to the top node index. Every
//! successful push or pop bumps the tag, so the classic ABA interleaving (pop A,
//! pop B, push A) produces a different head word and a stale compare-exchange
//! fails instead of installing a dangling `next`.
//!
//! Several stacks may share one arena; a node belongs to at most one stack at a
//! time, which is the caller's contract.

use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Mutex, OnceLock, PoisonError,
};

/// Nodes allocated per arena segment.
const SEGMENT_LEN: usize = 256;
/// Upper bound on segments, which caps an arena at 1M nodes.
const MAX_SEGMENTS: usize = 4096;
/// Encoded "no node" value for links and the head index.
const NIL: u32 = 0;

/// Handle to a node inside a [`NodeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeIndex(u32);

impl NodeIndex {
    /// Raw slot number, stable for the lifetime of the arena.
    pub fn get(self) -> u32 {
        self.0
    }

    fn encode(self) -> u32 {
        self.0 + 1
    }

    fn decode(raw: u32) -> Option<Self> {
        raw.checked_sub(1).map(NodeIndex)
    }
}

/// One recyclable slot: an intrusive link plus a payload.
#[derive(Debug)]
pub struct Node<T> {
    next: AtomicU32,
    value: Mutex<Option<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            next: AtomicU32::new(NIL),
            value: Mutex::new(None),
        }
    }
}

impl<T> Node<T> {
    /// Moves the payload out of the node, leaving it empty.
    pub fn take(&self) -> Option<T> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Stores a payload, returning whatever was there before.
    pub fn put(&self, value: T) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(value)
    }
}

/// Grow-only storage for stack nodes.
///
/// Segments are created lazily with [`OnceLock`], so allocation never moves an
/// existing node and never needs a global lock.
#[derive(Debug)]
pub struct NodeArena<T> {
    segments: Box<[OnceLock<Box<[Node<T>]>>]>,
    allocated: AtomicU32,
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeArena<T> {
    /// Creates an arena with no nodes.
    pub fn new() -> Self {
        Self {
            segments: (0..MAX_SEGMENTS).map(|_| OnceLock::new()).collect(),
            allocated: AtomicU32::new(0),
        }
    }

    /// Allocates a fresh, unlinked node.
    ///
    /// # Panics
    /// Panics when the arena is exhausted.
    pub fn allocate(&self) -> NodeIndex {
        let raw = self.allocated.fetch_add(1, Ordering::Relaxed);
        assert!(
            (raw as usize) < SEGMENT_LEN * MAX_SEGMENTS,
            "node arena exhausted"
        );
        // Touch the segment so the node exists before anyone sees its index.
        let _ = self.segment(raw as usize / SEGMENT_LEN);
        NodeIndex(raw)
    }

    /// Returns the node behind `index`.
    pub fn node(&self, index: NodeIndex) -> &Node<T> {
        let raw = index.0 as usize;
        &self.segment(raw / SEGMENT_LEN)[raw % SEGMENT_LEN]
    }

    /// Number of nodes handed out so far.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed) as usize
    }

    fn segment(&self, segment: usize) -> &[Node<T>] {
        self.segments[segment].get_or_init(|| (0..SEGMENT_LEN).map(|_| Node::default()).collect())
    }
}

/// Result of a single pop attempt against a known head snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PopAttempt {
    Empty,
    Popped(NodeIndex),
    Contended,
}

/// A lock-free LIFO of node indices with a tagged head.
#[derive(Debug, Default)]
pub struct TreiberStack {
    head: AtomicU64,
}

fn pack(tag: u32, top: u32) -> u64 {
    ((tag as u64) << 32) | top as u64
}

fn unpack(head: u64) -> (u32, u32) {
    ((head >> 32) as u32, head as u32)
}

impl TreiberStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self {
            head: AtomicU64::new(pack(0, NIL)),
        }
    }

    /// Pushes `index` onto the stack.
    pub fn push<T>(&self, arena: &NodeArena<T>, index: NodeIndex) {
        let node = arena.node(index);
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let (tag, top) = unpack(head);
            node.next.store(top, Ordering::Relaxed);
            let new_head = pack(tag.wrapping_add(1), index.encode());
            match self
                .head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(observed) => head = observed,
            }
        }
    }

    /// Pops the top index, or returns `None` when the stack is empty.
    pub fn pop<T>(&self, arena: &NodeArena<T>) -> Option<NodeIndex> {
        loop {
            let head = self.load_head();
            match self.try_pop_from(arena, head) {
                PopAttempt::Empty => return None,
                PopAttempt::Popped(index) => return Some(index),
                PopAttempt::Contended => std::hint::spin_loop(),
            }
        }
    }

    /// True when the stack holds no nodes at the time of the call.
    pub fn is_empty(&self) -> bool {
        unpack(self.head.load(Ordering::Acquire)).1 == NIL
    }

    /// Counts the linked nodes. Only meaningful while the stack is quiescent.
    pub fn len<T>(&self, arena: &NodeArena<T>) -> usize {
        let mut count = 0;
        let mut cursor = unpack(self.head.load(Ordering::Acquire)).1;
        while let Some(index) = NodeIndex::decode(cursor) {
            count += 1;
            cursor = arena.node(index).next.load(Ordering::Acquire);
        }
        count
    }

    pub(crate) fn load_head(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    pub(crate) fn try_pop_from<T>(&self, arena: &NodeArena<T>, head: u64) -> PopAttempt {
        let (tag, top) = unpack(head);
        let Some(index) = NodeIndex::decode(top) else {
            return PopAttempt::Empty;
        };
        let next = arena.node(index).next.load(Ordering::Acquire);
        let new_head = pack(tag.wrapping_add(1), next);
        match self
            .head
            .compare_exchange(head, new_head, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => PopAttempt::Popped(index),
            Err(_) => PopAttempt::Contended,
        }
    }
}
