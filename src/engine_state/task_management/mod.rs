//! # Task Management System
//!
//! A fixed pool of worker threads fed by two bounded job rings.
//!
//! ## Architecture Overview
//!
//! - `WorkerPool`: owns the threads, the queues and the main thread's own
//!   job state
//! - `WorkQueue`: single-producer, multi-consumer ring (see `work_queue`)
//! - `WorkQueueEntry`: the closed set of jobs (see `task`)
//!
//! The main thread is the only producer. Chunk initialization goes on the low
//! priority queue and may span frames. Copy and simulation jobs go on the high
//! priority queue and always finish within the frame that created them: the
//! main thread drains that queue itself at the end of the frame and then waits
//! until no worker is still inside a high-priority drain.
//!
//! ## Worker Loop
//! 1. Poll every `poll_interval` until a queue has work or a flag is raised
//! 2. While suspended, wait
//! 3. Drain the high-priority queue (counted in `high_priority_worker_count`)
//! 4. Take low-priority jobs one at a time, going back to 1 as soon as
//!    high-priority work appears or the pool is suspended or exiting
//!
//! The scratch arena is rewound after every job.
//!
//! ## Failed Jobs
//! A job that panics is caught on the thread that ran it and counted as
//! failed. Its in-flight count is still released, and an `InitWorldChunk`
//! job's chunk is published empty (or handed back, if it became garbage), so
//! neither the pool nor the chunk waits on it forever.

pub mod task;
pub mod work_queue;

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use task::{execute, JobContext, ThreadLocalState, WorkQueueEntry};
use work_queue::WorkQueue;

use crate::engine_state::voxels::tasks::chunk_generation_task::recover_failed_initialization;

/// State shared by the main thread and every worker.
#[derive(Debug)]
struct PoolShared {
    high: WorkQueue,
    low: WorkQueue,
    suspend: AtomicBool,
    exit: AtomicBool,
    high_priority_worker_count: AtomicUsize,
    jobs_in_flight: AtomicUsize,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    poll_interval: Duration,
}

impl PoolShared {
    fn has_work(&self) -> bool {
        !self.high.is_empty() || !self.low.is_empty()
    }

    fn should_stop(&self) -> bool {
        self.exit.load(Ordering::Acquire) || self.suspend.load(Ordering::Acquire)
    }

    /// Pops and runs one entry from `queue`. Returns false when it was empty.
    fn run_one(&self, queue: &WorkQueue, local: &mut ThreadLocalState) -> bool {
        // Raised before the pop so `wait_until_idle` never sees an empty
        // queue with the job not yet counted.
        let _in_flight = CountGuard::enter(&self.jobs_in_flight);
        let Some(entry) = queue.pop() else {
            return false;
        };

        let init_chunk = match &entry {
            WorkQueueEntry::InitWorldChunk(chunk) => Some(chunk.clone()),
            _ => None,
        };
        match panic::catch_unwind(AssertUnwindSafe(|| execute(entry, local))) {
            Ok(()) => {
                local.scratch.rewind();
                self.jobs_completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                log::error!("Job panicked: {}", panic_message(payload.as_ref()));
                if let Some(chunk) = init_chunk {
                    recover_failed_initialization(&chunk, &local.context.freelist);
                }
                local.scratch.rewind_after_panic();
                self.jobs_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Holds one unit of an atomic counter, released even if a job panics.
struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Pool sizing and timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerPoolDesc {
    /// Worker threads to spawn.
    pub workers: usize,
    /// Capacity of each queue.
    pub queue_capacity: usize,
    /// Idle sleep between polls.
    pub poll_interval: Duration,
    /// Voxels each thread's scratch arena keeps across rewinds.
    pub scratch_retain: usize,
}

/// Counters for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker threads still running.
    pub workers: usize,
    /// Entries waiting on the high-priority queue.
    pub high_pending: usize,
    /// Entries waiting on the low-priority queue.
    pub low_pending: usize,
    /// Entries popped but not finished.
    pub in_flight: usize,
    /// Entries finished since start.
    pub completed: u64,
    /// Entries whose job panicked.
    pub failed: u64,
}

/// Manages the worker threads and their queues.
///
/// # Implementation Notes
/// - Only the thread that owns the pool may push
/// - Dropping the pool signals exit and joins every worker
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    main_thread: ThreadLocalState,
}

impl WorkerPool {
    /// Spawns `desc.workers` threads, each with its own job state built from
    /// `context`.
    ///
    /// # Panics
    /// Panics if a thread cannot be spawned.
    pub fn new(desc: WorkerPoolDesc, context: JobContext) -> Self {
        let shared = Arc::new(PoolShared {
            high: WorkQueue::new(desc.queue_capacity),
            low: WorkQueue::new(desc.queue_capacity),
            suspend: AtomicBool::new(false),
            exit: AtomicBool::new(false),
            high_priority_worker_count: AtomicUsize::new(0),
            jobs_in_flight: AtomicUsize::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            poll_interval: desc.poll_interval,
        });

        log::info!(
            "Available parallelism: {:?}",
            thread::available_parallelism()
        );
        log::info!(
            "Starting {} workers, queue capacity {}",
            desc.workers,
            desc.queue_capacity
        );

        let workers = (0..desc.workers)
            .map(|index| {
                let shared = shared.clone();
                let local = ThreadLocalState::new(context.clone(), desc.scratch_retain);
                thread::Builder::new()
                    .name(format!("voxel-worker-{index}"))
                    .spawn(move || worker_loop(&shared, local))
                    .unwrap_or_else(|err| panic!("failed to spawn worker {index}: {err}"))
            })
            .collect();

        Self {
            shared,
            workers,
            main_thread: ThreadLocalState::new(context, desc.scratch_retain),
        }
    }

    /// Queues a frame-critical job.
    ///
    /// A full queue is drained on the calling thread first. If a worker still
    /// holds the slot the job needs, the main thread yields until it is freed.
    pub fn push_high(&mut self, mut entry: WorkQueueEntry) {
        loop {
            match self.shared.high.try_push(entry) {
                Ok(()) => return,
                Err(rejected) => entry = rejected,
            }
            if self.shared.high.is_empty() {
                thread::yield_now();
            } else {
                log::debug!("High-priority queue full, draining on the main thread");
                self.drain_high_priority();
            }
        }
    }

    /// Queues a background job.
    ///
    /// # Panics
    /// Panics if the low-priority queue is full; check
    /// [`WorkerPool::low_priority_has_room`] first.
    pub fn push_low(&self, entry: WorkQueueEntry) {
        self.shared.low.push(entry);
    }

    /// True when another low-priority job fits.
    pub fn low_priority_has_room(&self) -> bool {
        self.shared.low.has_room()
    }

    /// Runs high-priority jobs on the calling thread until the queue is empty.
    pub fn drain_high_priority(&mut self) {
        while self.shared.run_one(&self.shared.high, &mut self.main_thread) {}
    }

    /// Blocks until no worker is draining the high-priority queue.
    pub fn wait_for_high_priority_workers(&self) {
        while self.shared.high_priority_worker_count.load(Ordering::SeqCst) > 0 {
            thread::yield_now();
        }
    }

    /// Runs low-priority jobs on the calling thread until the queue is empty.
    ///
    /// Useful when the pool has no workers, and in tests.
    pub fn drain_low_priority(&mut self) {
        while self.shared.run_one(&self.shared.low, &mut self.main_thread) {}
    }

    /// Blocks until both queues are empty and no job is running.
    pub fn wait_until_idle(&self) {
        while self.shared.has_work() || self.shared.jobs_in_flight.load(Ordering::SeqCst) > 0 {
            thread::sleep(self.shared.poll_interval);
        }
    }

    /// Rewinds the main thread's scratch arena. Call once per frame.
    pub fn rewind_main_thread_scratch(&mut self) {
        self.main_thread.scratch.rewind();
    }

    /// Stops workers from picking up new jobs.
    pub fn suspend(&self) {
        self.shared.suspend.store(true, Ordering::Release);
    }

    /// Lets suspended workers continue.
    pub fn resume(&self) {
        self.shared.suspend.store(false, Ordering::Release);
    }

    /// Signals exit and joins every worker. Pending jobs are dropped.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.exit.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
        log::info!(
            "Worker pool stopped after {} jobs ({} failed)",
            self.shared.jobs_completed.load(Ordering::Relaxed),
            self.shared.jobs_failed.load(Ordering::Relaxed)
        );
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers.len(),
            high_pending: self.shared.high.len(),
            low_pending: self.shared.low.len(),
            in_flight: self.shared.jobs_in_flight.load(Ordering::SeqCst),
            completed: self.shared.jobs_completed.load(Ordering::Relaxed),
            failed: self.shared.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &PoolShared, mut local: ThreadLocalState) {
    loop {
        while !shared.has_work() && !shared.should_stop() {
            thread::sleep(shared.poll_interval);
        }
        while shared.suspend.load(Ordering::Acquire) && !shared.exit.load(Ordering::Acquire) {
            thread::sleep(shared.poll_interval);
        }
        if shared.exit.load(Ordering::Acquire) {
            break;
        }

        {
            let _guard = CountGuard::enter(&shared.high_priority_worker_count);
            while shared.run_one(&shared.high, &mut local) {}
        }
        local.scratch.rewind();

        while shared.high.is_empty() && !shared.should_stop() {
            if !shared.run_one(&shared.low, &mut local) {
                break;
            }
        }
    }
    log::trace!("Worker exiting");
}
