//! Least Connections load balancing strategy.
//!
//! The active-connection counters live behind one mutex so that the
//! scan for the minimum and the increment of the winner happen as a single
//! step with respect to every other reservation and release.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::observability::metrics;

/// Least connections selector.
/// Selects the backend with the minimum number of active sessions.
#[derive(Debug)]
pub struct LeastConnections {
    active: Mutex<Vec<usize>>,
}

impl LeastConnections {
    /// Create a selector for `backend_count` backends, all idle.
    pub fn new(backend_count: usize) -> Self {
        Self {
            active: Mutex::new(vec![0; backend_count]),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<usize>> {
        // Counters stay consistent even if a holder panicked mid-scan.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a slot on the least loaded backend.
    ///
    /// In case of a tie the lowest index wins. Returns `None` only when the
    /// selector tracks no backends.
    pub fn reserve(self: &Arc<Self>) -> Option<Reservation> {
        let mut active = self.lock();

        let (index, _) = active
            .iter()
            .enumerate()
            .min_by_key(|(_, count)| **count)?;
        active[index] += 1;
        metrics::record_backend_active(index, active[index]);

        Some(Reservation {
            selector: Arc::clone(self),
            index,
            released: false,
        })
    }

    fn release(&self, index: usize) {
        let mut active = self.lock();
        match active.get_mut(index) {
            Some(count) if *count > 0 => {
                *count -= 1;
                metrics::record_backend_active(index, *count);
            }
            Some(_) => tracing::error!(index, "Release on idle backend ignored"),
            None => tracing::error!(index, "Release for unknown backend ignored"),
        }
    }

    /// Snapshot of every backend's active count, in roster order.
    pub fn active_counts(&self) -> Vec<usize> {
        self.lock().clone()
    }

    /// Active count of a single backend.
    pub fn active_count(&self, index: usize) -> Option<usize> {
        self.lock().get(index).copied()
    }

    /// Number of backends tracked.
    pub fn backend_count(&self) -> usize {
        self.lock().len()
    }
}

/// A claim on one backend's active-connection slot.
///
/// Released exactly once: either explicitly through [`Reservation::release`]
/// or when dropped.
#[derive(Debug)]
pub struct Reservation {
    selector: Arc<LeastConnections>,
    index: usize,
    released: bool,
}

impl Reservation {
    /// Index of the reserved backend in the registry.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the slot has already been given back.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Give the slot back. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.selector.release(self.index);
        true
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.release();
    }
}
