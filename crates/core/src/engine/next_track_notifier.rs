use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::shared::tracking_error::TrackingError;
use crate::tracking::domain::track::TrackDescriptor;

use super::pending::{pending, Completer, Pending};

struct NotifierState {
    open: bool,
    waiters: Vec<Completer<TrackDescriptor>>,
}

/// One-shot broadcast of newly created tracks.
///
/// Every handle registered before a broadcast resolves with that broadcast's
/// descriptor; the waiter list is then emptied, so later registrations wait
/// for the next new track. Handles are completed after the lock is released.
pub struct NextTrackNotifier {
    state: Mutex<NotifierState>,
}

impl NextTrackNotifier {
    /// Creates a closed notifier.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NotifierState {
                open: false,
                waiters: Vec::new(),
            }),
        }
    }

    pub fn register(&self) -> Result<Pending<TrackDescriptor>, TrackingError> {
        let mut state = self.lock();
        if !state.open {
            return Err(TrackingError::LifecycleMisuse {
                operation: "next_track",
            });
        }
        let (completer, handle) = pending();
        state.waiters.push(completer);
        Ok(handle)
    }

    /// Resolves all outstanding handles with `track`. Returns how many
    /// waiters were still listening.
    pub fn broadcast(&self, track: TrackDescriptor) -> usize {
        let waiters = std::mem::take(&mut self.lock().waiters);
        waiters
            .into_iter()
            .map(|w| w.complete(Ok(track)))
            .filter(|delivered| *delivered)
            .count()
    }

    pub fn open(&self) {
        self.lock().open = true;
    }

    /// Stops accepting registrations and cancels outstanding handles.
    pub fn close(&self) {
        let waiters = {
            let mut state = self.lock();
            state.open = false;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            waiter.complete(Err(TrackingError::Cancelled));
        }
    }

    #[cfg(test)]
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    fn lock(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NextTrackNotifier {
    fn default() -> Self {
        Self::new()
    }
}
