//! Progress reporting and cancellation support.
//!
//! [`CancellationToken`] is how [`cleanup`](crate::FrameDemuxer::cleanup)
//! reaches a running pipeline: both passes check it before every capture and
//! the callback surface goes silent once it fires. [`ProgressTracker`] turns
//! capture counts into the percentages delivered to `on_progress`.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share state; cancelling any clone cancels them all.
///
/// # Example
///
/// ```
/// use framesweep::CancellationToken;
///
/// let token = CancellationToken::new();
/// let clone = token.clone();
/// token.cancel();
/// assert!(clone.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts per-sample advances into clamped, non-decreasing percentages.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    current: u64,
    last_reported: f32,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            current: 0,
            last_reported: 0.0,
            start_time: Instant::now(),
        }
    }

    /// Record one processed sample and return the percentage to report.
    pub fn advance(&mut self) -> f32 {
        self.current += 1;
        self.percentage()
    }

    /// Percentage to report when the pass ends, whatever was captured.
    pub fn finish(&mut self) -> f32 {
        self.last_reported = 100.0;
        self.last_reported
    }

    /// `current / total × 100`, clamped to `0..=100` and never below the
    /// previous value. An empty pass counts as done.
    pub fn percentage(&mut self) -> f32 {
        let raw = if self.total == 0 {
            100.0
        } else {
            self.current as f32 / self.total as f32 * 100.0
        };
        self.last_reported = raw.clamp(0.0, 100.0).max(self.last_reported);
        self.last_reported
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Estimated time remaining, based on current throughput.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.current == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.current);
        let per_item = self.elapsed().div_f64(self.current as f64);
        Some(per_item.mul_f64(remaining as f64))
    }
}
