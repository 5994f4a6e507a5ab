//! Run-level cancellation

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag for one run.
///
/// Cloning yields a handle to the same flag. Once cancelled, no new batch is
/// started; in-flight batches get the configured grace period to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    at: Mutex<Option<Instant>>,
}

impl CancelToken {
    /// New, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Repeated calls keep the first instant.
    pub fn cancel(&self) {
        let mut at = self.inner.at.lock();
        if at.is_none() {
            *at = Some(Instant::now());
        }
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Time since cancellation, if cancelled
    pub fn elapsed(&self) -> Option<Duration> {
        self.inner.at.lock().map(|at| at.elapsed())
    }

    /// Whether the run was cancelled at least `grace` ago
    pub fn grace_expired(&self, grace: Duration) -> bool {
        self.elapsed().map_or(false, |elapsed| elapsed >= grace)
    }
}
