//! Per-thread scratch memory.
//!
//! Each worker (and the main thread) owns one [`ScratchArena`]. Jobs borrow
//! zeroed buffers from it, hand them back when done, and the owner rewinds the
//! arena at the end of every job or frame. Nothing allocated from an arena may
//! outlive the rewind, which the borrow checker enforces because buffers are
//! moved back in before [`ScratchArena::rewind`] can be called.

use bytemuck::Zeroable;

/// Reusable pool of zero-initialised buffers.
#[derive(Debug)]
pub struct ScratchArena<T: Zeroable + Copy> {
    free: Vec<Vec<T>>,
    outstanding: usize,
    reserved_elements: usize,
    retain_elements: usize,
}

impl<T: Zeroable + Copy> ScratchArena<T> {
    /// Creates an arena that keeps at most `retain_elements` across rewinds.
    pub fn new(retain_elements: usize) -> Self {
        Self {
            free: Vec::new(),
            outstanding: 0,
            reserved_elements: 0,
            retain_elements,
        }
    }

    /// Borrows a buffer of exactly `len` zeroed elements.
    pub fn take(&mut self, len: usize) -> Vec<T> {
        self.outstanding += 1;
        let position = self.free.iter().position(|buffer| buffer.capacity() >= len);
        let mut buffer = match position {
            Some(position) => self.free.swap_remove(position),
            None => {
                self.reserved_elements += len;
                Vec::with_capacity(len)
            }
        };
        buffer.clear();
        buffer.resize(len, T::zeroed());
        buffer
    }

    /// Returns a buffer obtained from [`ScratchArena::take`].
    pub fn recycle(&mut self, buffer: Vec<T>) {
        debug_assert!(self.outstanding > 0, "recycled a buffer this arena never lent");
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free.push(buffer);
    }

    /// Ends the current job or frame.
    ///
    /// Buffers stay cached for the next job unless the arena grew past its
    /// retention limit, in which case everything is released.
    ///
    /// # Panics
    /// Panics in debug builds if a borrowed buffer was never recycled.
    pub fn rewind(&mut self) {
        debug_assert_eq!(self.outstanding, 0, "scratch buffer leaked past rewind");
        if self.reserved_elements > self.retain_elements {
            log::trace!(
                "Releasing scratch arena ({} elements reserved, {} retained)",
                self.reserved_elements,
                self.retain_elements
            );
            self.free.clear();
            self.free.shrink_to_fit();
            self.reserved_elements = 0;
        }
        self.outstanding = 0;
    }

    /// Ends a job that panicked.
    ///
    /// Buffers the job borrowed were dropped during unwinding and are
    /// forgotten; everything cached is released.
    pub fn rewind_after_panic(&mut self) {
        if self.outstanding > 0 {
            log::warn!("Forgetting {} scratch buffers lost to a panic", self.outstanding);
        }
        self.outstanding = 0;
        self.free.clear();
        self.reserved_elements = 0;
    }

    /// Number of buffers currently lent out.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}
