//! Fixed-size worker pool for batch attempts.
//!
//! Jobs run on a fixed set of OS threads in submission order. A worker
//! blocks only inside the job it runs, which for batch attempts means the
//! executor subprocess or its deadline.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::error;

type Job = Box<dyn FnOnce() + Send>;

/// Error returned when submitting to a pool that was shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

struct PoolInner {
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    shutdown: AtomicBool,
}

/// Worker pool with FIFO dispatch
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `num_threads` workers (at least one).
    ///
    /// Workers are named `tally-worker-0`, `tally-worker-1`, etc.
    pub fn new(num_threads: usize) -> io::Result<Self> {
        let num_threads = num_threads.max(1);
        let pool = WorkerPool {
            inner: Arc::new(PoolInner {
                queue: Mutex::new(VecDeque::new()),
                work_ready: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::with_capacity(num_threads)),
        };
        for i in 0..num_threads {
            let inner = Arc::clone(&pool.inner);
            // On failure, dropping `pool` joins the workers already started.
            let handle = std::thread::Builder::new()
                .name(format!("tally-worker-{}", i))
                .spawn(move || worker_loop(&inner))?;
            pool.workers.lock().push(handle);
        }
        Ok(pool)
    }

    /// Queue a job. Jobs start in submission order.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), PoolClosed> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(PoolClosed);
        }
        self.inner.queue.lock().push_back(Box::new(job));
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Signal workers to exit once the queue is empty and join them
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);

        // Holding the queue lock while notifying: a worker between its
        // shutdown check and its wait holds this lock.
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
            error!(
                target: "tally::exec",
                panic = e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)"),
                "Worker job panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_submit_runs_every_job() {
        let pool = WorkerPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let c = Arc::clone(&counter);
            pool.submit(move || {
                c.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_fifo_with_one_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let b = Arc::clone(&barrier);
        pool.submit(move || {
            b.wait();
        })
        .unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let o = Arc::clone(&order);
            pool.submit(move || o.lock().push(i)).unwrap();
        }
        barrier.wait();
        pool.shutdown();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_workers_run_concurrently() {
        let pool = WorkerPool::new(3).unwrap();
        let barrier = Arc::new(Barrier::new(3));
        for _ in 0..3 {
            let b = Arc::clone(&barrier);
            pool.submit(move || {
                b.wait();
            })
            .unwrap();
        }
        // Deadlocks unless all three jobs run at once.
        pool.shutdown();
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(1).unwrap();
        pool.submit(|| panic!("boom")).unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let d = Arc::clone(&done);
        pool.submit(move || d.store(true, Ordering::Release)).unwrap();
        pool.shutdown();
        assert!(done.load(Ordering::Acquire));
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(1).unwrap();
        pool.shutdown();
        let err = pool.submit(|| {}).unwrap_err();
        assert_eq!(err, PoolClosed);
        assert_eq!(err.to_string(), "worker pool is shut down");
    }

    #[test]
    fn test_shutdown_runs_queued_jobs() {
        let pool = WorkerPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let c = Arc::clone(&counter);
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis(5));
                c.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::Relaxed), 4);
    }
}
