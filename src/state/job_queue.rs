use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A unit of work: one listing URL
pub type Job = String;

/// Shared queue of pending jobs
///
/// Every operation takes the lock once, so a popped job is handed to exactly
/// one caller. Jobs are never added after construction; the length only
/// shrinks during a run.
#[derive(Debug)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
    seeded: usize,
    popped: AtomicUsize,
}

impl JobQueue {
    pub fn new(jobs: impl IntoIterator<Item = Job>) -> Self {
        let jobs: VecDeque<Job> = jobs.into_iter().collect();
        Self {
            seeded: jobs.len(),
            jobs: Mutex::new(jobs),
            popped: AtomicUsize::new(0),
        }
    }

    /// Removes and returns the next job, or None once the queue is drained
    pub fn pop(&self) -> Option<Job> {
        let mut jobs = self.lock();
        let job = jobs.pop_front();
        if job.is_some() {
            self.popped.fetch_add(1, Ordering::SeqCst);
        }
        job
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of jobs the queue was created with
    pub fn seeded(&self) -> usize {
        self.seeded
    }

    /// Number of jobs handed out so far
    pub fn popped(&self) -> usize {
        self.popped.load(Ordering::SeqCst)
    }

    // A panicking holder cannot leave the deque half-updated.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
