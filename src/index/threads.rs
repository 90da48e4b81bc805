//! Cooperative worker pool for index builders/streamers (C10, spec §4.9).
//!
//! Work items are closures submitted to a [`TaskGroup`]; [`TaskGroup::wait_finish`]
//! blocks until every closure submitted to that group has run. Grounded on the
//! teacher's use of `rayon` for parallel batch insert/search (`index/hnsw/index/batch.rs`,
//! `collection/search/query/parallel_traversal.rs`) — the pool itself is a thin
//! wrapper around `rayon::ThreadPool::spawn`, with group completion tracked by a
//! `parking_lot::Condvar` rather than rayon's own scoped-thread join, since spec
//! §4.9 describes submit-then-wait across a named group rather than a single
//! scoped block.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// A pool of OS worker threads shared by one or more task groups.
pub struct IndexThreads {
    pool: rayon::ThreadPool,
}

impl IndexThreads {
    /// Builds a pool with `num_threads` workers (`0` lets rayon pick a default
    /// based on available parallelism).
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|err| Error::Internal(err.to_string()))?;
        Ok(Self { pool })
    }

    /// Opens a new task group backed by this pool.
    #[must_use]
    pub fn task_group(&self) -> TaskGroup<'_> {
        TaskGroup { pool: &self.pool, pending: Arc::new(Pending::default()) }
    }
}

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    done: Condvar,
}

/// A batch of closures submitted together; `wait_finish` blocks until all of
/// them have completed, regardless of which worker ran each one.
pub struct TaskGroup<'a> {
    pool: &'a rayon::ThreadPool,
    pending: Arc<Pending>,
}

impl TaskGroup<'_> {
    /// Submits one closure to the pool. Returns immediately.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        *self.pending.count.lock() += 1;
        let pending = Arc::clone(&self.pending);
        self.pool.spawn(move || {
            job();
            let mut count = pending.count.lock();
            *count -= 1;
            if *count == 0 {
                pending.done.notify_all();
            }
        });
    }

    /// Blocks the calling thread until every closure submitted to this group
    /// has returned.
    pub fn wait_finish(&self) {
        let mut count = self.pending.count.lock();
        while *count != 0 {
            self.pending.done.wait(&mut count);
        }
    }

    /// Number of closures submitted to this group that have not yet returned.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        *self.pending.count.lock()
    }
}
