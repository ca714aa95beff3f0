use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::shared::frame::Frame;

/// Single-slot latest-frame handoff between the producer and the detection
/// loop. Publishing never blocks and overwrites any unconsumed frame.
#[derive(Default)]
pub struct Mailbox {
    slot: Mutex<Option<Arc<Frame>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when an unconsumed frame was superseded.
    pub fn publish(&self, frame: Arc<Frame>) -> bool {
        self.lock().replace(frame).is_some()
    }

    /// Takes and clears the pending frame.
    pub fn take(&self) -> Option<Arc<Frame>> {
        self.lock().take()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Frame>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
