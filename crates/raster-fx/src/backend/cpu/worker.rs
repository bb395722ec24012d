//! The CPU backend's bounded worker pool.
//!
//! Pixel-kernel tasks are fire-and-forget: there is no ordering
//! guarantee between them, and [`WorkerPool::wait_idle`] is the only
//! join. The device's `synchronize()` forwards there.

use std::sync::{Arc, Condvar, Mutex};

/// A bounded thread pool with a pending-job gate.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    pending: Arc<(Mutex<usize>, Condvar)>,
}

impl WorkerPool {
    /// Creates a pool with the default thread count:
    /// `max(1, available_parallelism - 1)`, leaving one core to the
    /// caller.
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(1);

        Self::with_threads(threads)
    }

    /// Creates a pool with an explicit thread count.
    pub fn with_threads(threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("raster-worker-{i}"))
            .build()
            .expect("worker pool");

        Self {
            pool,
            pending: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    /// Number of worker threads.
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Submits a job. Returns immediately; the job runs on some
    /// worker thread with no ordering relative to other jobs.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        {
            let (lock, _) = &*self.pending;
            *lock.lock().expect("worker gate") += 1;
        }

        let pending = Arc::clone(&self.pending);
        self.pool.spawn(move || {
            job();

            let (lock, signal) = &*pending;
            let mut count = lock.lock().expect("worker gate");
            *count -= 1;
            if *count == 0 {
                signal.notify_all();
            }
        });
    }

    /// Blocks until every submitted job has finished.
    pub fn wait_idle(&self) {
        let (lock, signal) = &*self.pending;
        let mut count = lock.lock().expect("worker gate");
        while *count > 0 {
            count = signal.wait(count).expect("worker gate");
        }
    }

    /// Number of jobs submitted but not yet finished.
    pub fn pending_jobs(&self) -> usize {
        let (lock, _) = &*self.pending;
        *lock.lock().expect("worker gate")
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.thread_count())
            .field("pending", &self.pending_jobs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_thread_count_bounds() {
        let pool = WorkerPool::new();
        assert!(pool.thread_count() >= 1);

        let one = WorkerPool::with_threads(0);
        assert_eq!(one.thread_count(), 1);
    }

    #[test]
    fn test_wait_idle_joins_all_jobs() {
        let pool = WorkerPool::with_threads(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..64 {
            let counter = Arc::clone(&counter);
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 64);
        assert_eq!(pool.pending_jobs(), 0);
    }

    #[test]
    fn test_wait_idle_on_empty_pool() {
        let pool = WorkerPool::with_threads(2);
        pool.wait_idle();
    }
}
