//! Outbound frame budget.
//!
//! Every session shares one writer task. Without a limit a fast transform
//! could queue an entire edge map in memory while the parent is still
//! draining the pipe, so each queued frame holds a slot until the writer
//! task has flushed it.
//!
//! - `max_pending`: slots available across all sessions (default: 1024)
//! - `timeout`: how long a producer waits for a free slot (default: 5s)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{EdgeStreamError, Result};

/// Default maximum pending frames before producers have to wait.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default time a producer waits for a free slot.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const CHECK_INTERVAL: Duration = Duration::from_micros(100);

/// Lock-free counter of frames queued but not yet written.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
}

impl BackpressureController {
    pub fn new(max_pending: usize, timeout: Duration) -> Self {
        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending,
            timeout,
        }
    }

    /// Whether producers are currently being held back.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Take a slot without waiting.
    pub fn try_reserve(&self) -> Result<BackpressureGuard> {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_pending).then_some(current + 1)
            })
            .map_err(|_| EdgeStreamError::BackpressureTimeout)?;

        Ok(BackpressureGuard::new(self.clone()))
    }

    /// Take a slot, waiting up to the configured timeout for one to free up.
    pub async fn reserve(&self) -> Result<BackpressureGuard> {
        let start = Instant::now();

        loop {
            match self.try_reserve() {
                Ok(guard) => return Ok(guard),
                Err(_) if start.elapsed() > self.timeout => {
                    tracing::warn!(
                        pending = self.pending_count(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "outbound queue stayed full"
                    );
                    return Err(EdgeStreamError::BackpressureTimeout);
                }
                Err(_) => tokio::time::sleep(CHECK_INTERVAL).await,
            }
        }
    }

    /// Return `count` slots after a batch has been written.
    #[inline]
    pub fn release_many(&self, count: usize) {
        self.pending.fetch_sub(count, Ordering::Release);
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING, DEFAULT_TIMEOUT)
    }
}

/// A reserved slot, returned to the controller on drop unless disarmed.
///
/// The writer handle disarms the guard once the frame is in the writer
/// channel; from then on the writer task owns the slot.
#[must_use]
pub struct BackpressureGuard {
    controller: BackpressureController,
    armed: bool,
}

impl BackpressureGuard {
    fn new(controller: BackpressureController) -> Self {
        Self {
            controller,
            armed: true,
        }
    }

    /// Hand the slot over to whoever writes the frame.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for BackpressureGuard {
    fn drop(&mut self) {
        if self.armed {
            self.controller.release_many(1);
        }
    }
}
