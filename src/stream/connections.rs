// Live connection accounting
//
// Every open generation request holds a guard; dropping the guard (stream
// finished, errored, cancelled or abandoned) returns the count to baseline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Decrements the owning tracker on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active(), 0);
        let a = tracker.acquire();
        let b = tracker.clone().acquire();
        assert_eq!(tracker.active(), 2);
        drop(a);
        assert_eq!(tracker.active(), 1);
        drop(b);
        assert_eq!(tracker.active(), 0);
    }
}
