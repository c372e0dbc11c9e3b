//! Bounded single-producer, multi-consumer job ring.
//!
//! Every slot carries a sequence number that says whose turn it is. For the
//! entry at position `pos` (slot `pos % capacity`):
//!
//! - `sequence == pos`: the slot is free for the producer
//! - `sequence == pos + 1`: the entry is published and may be claimed
//! - `sequence == pos + capacity`: a consumer has taken the entry and handed
//!   the slot on to the producer's next lap
//!
//! Consumers race on `dequeue` with a compare-and-swap; only the winner owns
//! the slot, so every entry runs exactly once. A slot whose entry has been
//! claimed but not yet taken keeps its old sequence, so the producer cannot
//! reuse it until the consumer lets go.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex, PoisonError,
};

use super::task::WorkQueueEntry;

#[derive(Debug)]
struct Slot {
    sequence: AtomicUsize,
    entry: Mutex<Option<WorkQueueEntry>>,
}

/// Bounded ring of [`WorkQueueEntry`] values.
#[derive(Debug)]
pub struct WorkQueue {
    slots: Box<[Slot]>,
    enqueue: AtomicUsize,
    dequeue: AtomicUsize,
}

/// An entry a consumer has won but not yet taken out of its slot.
///
/// Dropping it releases the slot back to the producer.
#[derive(Debug)]
pub struct ClaimedEntry<'a> {
    slot: &'a Slot,
    release: usize,
}

impl ClaimedEntry<'_> {
    /// Moves the entry out and frees the slot.
    pub fn take(self) -> Option<WorkQueueEntry> {
        let entry = self
            .slot
            .entry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if entry.is_none() {
            log::error!("Claimed an empty work queue slot");
        }
        entry
    }
}

impl Drop for ClaimedEntry<'_> {
    fn drop(&mut self) {
        self.slot
            .entry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.slot.sequence.store(self.release, Ordering::Release);
    }
}

impl WorkQueue {
    /// A queue able to hold `capacity` pending entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "work queue needs at least one slot");
        let slots = (0..capacity)
            .map(|sequence| Slot {
                sequence: AtomicUsize::new(sequence),
                entry: Mutex::new(None),
            })
            .collect();
        Self {
            slots,
            enqueue: AtomicUsize::new(0),
            dequeue: AtomicUsize::new(0),
        }
    }

    /// Pending entries the queue can hold.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, pos: usize) -> &Slot {
        &self.slots[pos % self.slots.len()]
    }

    /// Entries pushed but not yet claimed.
    pub fn len(&self) -> usize {
        let dequeue = self.dequeue.load(Ordering::Acquire);
        let enqueue = self.enqueue.load(Ordering::Acquire);
        enqueue.wrapping_sub(dequeue)
    }

    /// True when no entry is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the next push will succeed. Main thread only.
    ///
    /// Can be false while [`WorkQueue::len`] is below capacity, if a consumer
    /// still holds the slot the next entry would go into.
    pub fn has_room(&self) -> bool {
        let pos = self.enqueue.load(Ordering::Relaxed);
        self.slot(pos).sequence.load(Ordering::Acquire) == pos
    }

    /// Publishes `entry`, or hands it back when its slot is not free yet.
    /// Main thread only.
    pub fn try_push(&self, entry: WorkQueueEntry) -> Result<(), WorkQueueEntry> {
        let pos = self.enqueue.load(Ordering::Relaxed);
        let slot = self.slot(pos);
        if slot.sequence.load(Ordering::Acquire) != pos {
            return Err(entry);
        }

        let previous = slot
            .entry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(entry);
        debug_assert!(previous.is_none(), "work queue slot still occupied");

        slot.sequence.store(pos.wrapping_add(1), Ordering::Release);
        self.enqueue.store(pos.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Publishes `entry`. Main thread only.
    ///
    /// # Panics
    /// Panics if the queue is full; entries are never overwritten.
    pub fn push(&self, entry: WorkQueueEntry) {
        if self.try_push(entry).is_err() {
            panic!("work queue full ({} entries)", self.capacity());
        }
    }

    /// Wins the oldest entry, if any, without taking it out yet.
    ///
    /// Safe to call from any number of threads at once.
    pub fn claim(&self) -> Option<ClaimedEntry<'_>> {
        loop {
            let pos = self.dequeue.load(Ordering::Acquire);
            let slot = self.slot(pos);
            let sequence = slot.sequence.load(Ordering::Acquire);
            let lag = sequence.wrapping_sub(pos.wrapping_add(1)) as isize;

            if lag < 0 {
                return None;
            }
            if lag == 0
                && self
                    .dequeue
                    .compare_exchange(pos, pos.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                return Some(ClaimedEntry {
                    slot,
                    release: pos.wrapping_add(self.slots.len()),
                });
            }
        }
    }

    /// Claims and takes the oldest entry, if any.
    pub fn pop(&self) -> Option<WorkQueueEntry> {
        self.claim().and_then(ClaimedEntry::take)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{atomic::AtomicUsize, Arc},
        thread,
    };

    #[test]
    fn fifo_order() {
        let queue = WorkQueue::new(4);
        for _ in 0..3 {
            queue.push(WorkQueueEntry::Noop);
        }
        assert_eq!(queue.len(), 3);
        assert!(matches!(queue.pop(), Some(WorkQueueEntry::Noop)));
        assert_eq!(queue.len(), 2);
        queue.pop();
        queue.pop();
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn wraps_around() {
        let queue = WorkQueue::new(2);
        for _ in 0..10 {
            queue.push(WorkQueueEntry::Noop);
            queue.push(WorkQueueEntry::Noop);
            assert_eq!(queue.len(), 2);
            assert!(!queue.has_room());
            assert!(queue.pop().is_some());
            assert!(queue.pop().is_some());
        }
        assert!(queue.is_empty());
        assert!(queue.has_room());
    }

    #[test]
    #[should_panic(expected = "work queue full")]
    fn push_to_full_queue_panics() {
        let queue = WorkQueue::new(1);
        queue.push(WorkQueueEntry::Noop);
        queue.push(WorkQueueEntry::Noop);
    }

    #[test]
    fn claimed_slot_is_not_reused_until_taken() {
        let queue = WorkQueue::new(2);
        queue.push(WorkQueueEntry::Noop);
        let claimed = queue.claim().unwrap();

        queue.push(WorkQueueEntry::Noop);
        assert!(queue.pop().is_some());
        assert!(queue.is_empty());

        // The next push wraps onto the claimed slot.
        assert!(!queue.has_room());
        assert!(queue.try_push(WorkQueueEntry::Noop).is_err());

        assert!(matches!(claimed.take(), Some(WorkQueueEntry::Noop)));
        assert!(queue.has_room());
        queue.push(WorkQueueEntry::Noop);
        assert_eq!(queue.len(), 1);
        assert!(queue.pop().is_some());
    }

    #[test]
    fn dropped_claim_frees_its_slot() {
        let queue = WorkQueue::new(1);
        queue.push(WorkQueueEntry::Noop);
        drop(queue.claim());
        assert!(queue.has_room());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn concurrent_consumers_claim_each_entry_once() {
        let queue = Arc::new(WorkQueue::new(1024));
        for _ in 0..1000 {
            queue.push(WorkQueueEntry::Noop);
        }
        let claimed = Arc::new(AtomicUsize::new(0));

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                let claimed = claimed.clone();
                thread::spawn(move || {
                    while queue.pop().is_some() {
                        claimed.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for consumer in consumers {
            consumer.join().unwrap();
        }

        assert_eq!(claimed.load(Ordering::Relaxed), 1000);
        assert!(queue.is_empty());
    }

    #[test]
    fn producer_keeps_up_with_consumers_on_a_small_ring() {
        let queue = Arc::new(WorkQueue::new(4));
        let claimed = Arc::new(AtomicUsize::new(0));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                let claimed = claimed.clone();
                thread::spawn(move || {
                    while claimed.load(Ordering::Acquire) < 500 {
                        if queue.pop().is_some() {
                            claimed.fetch_add(1, Ordering::AcqRel);
                        } else {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut pushed = 0;
        while pushed < 500 {
            if queue.try_push(WorkQueueEntry::Noop).is_ok() {
                pushed += 1;
            } else {
                thread::yield_now();
            }
        }
        for consumer in consumers {
            consumer.join().unwrap();
        }
        assert_eq!(claimed.load(Ordering::Acquire), 500);
        assert!(queue.is_empty());
    }
}
