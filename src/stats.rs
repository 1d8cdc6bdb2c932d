use crate::config::IDLE_SENTINEL;
use std::sync::atomic::{AtomicI64, Ordering};

/// Completed/total query counters shared between the dump worker and the progress ticker.
///
/// Both hold [`IDLE_SENTINEL`] while no run is active.
pub struct RunCounters {
    completed: AtomicI64,
    total: AtomicI64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub completed: i64,
    pub total: i64,
    pub percent: f32,
}

impl Default for RunCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl RunCounters {
    pub fn new() -> Self {
        Self {
            completed: AtomicI64::new(IDLE_SENTINEL),
            total: AtomicI64::new(IDLE_SENTINEL),
        }
    }

    /// Arms the counters for a run over `total` items.
    pub fn begin(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total as i64, Ordering::Relaxed);
    }

    pub fn inc_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Puts both counters back to the idle sentinel.
    pub fn clear(&self) {
        self.completed.store(IDLE_SENTINEL, Ordering::Relaxed);
        self.total.store(IDLE_SENTINEL, Ordering::Relaxed);
    }

    pub fn completed(&self) -> i64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> i64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn is_idle(&self) -> bool {
        self.total() == IDLE_SENTINEL
    }

    pub fn snapshot(&self) -> Progress {
        Progress::new(self.completed(), self.total())
    }
}

impl Progress {
    /// `percent` is 0 when `total` is not positive.
    pub fn new(completed: i64, total: i64) -> Self {
        let percent = if total > 0 {
            completed as f32 / total as f32 * 100.0
        } else {
            0.0
        };
        Self {
            completed,
            total,
            percent,
        }
    }
}
