use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::shared::tracking_error::TrackingError;

/// Handle to a result produced on another thread.
///
/// Returned immediately by `next_track` and `recognize`; the caller decides
/// how to wait. If the producing side is dropped without completing, the
/// handle resolves to [`TrackingError::Cancelled`].
#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<Result<T, TrackingError>>,
}

/// Producer side of a [`Pending`]. Completing consumes it.
#[derive(Debug)]
pub struct Completer<T> {
    tx: Sender<Result<T, TrackingError>>,
}

pub fn pending<T>() -> (Completer<T>, Pending<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (Completer { tx }, Pending { rx })
}

impl<T> Completer<T> {
    /// Returns false if the handle was already dropped.
    pub fn complete(self, result: Result<T, TrackingError>) -> bool {
        self.tx.send(result).is_ok()
    }
}

impl<T> Pending<T> {
    /// Blocks until the result is available.
    pub fn wait(self) -> Result<T, TrackingError> {
        self.rx.recv().unwrap_or(Err(TrackingError::Cancelled))
    }

    /// Blocks for at most `timeout`. The handle stays usable after a
    /// [`TrackingError::Timeout`].
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, TrackingError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TrackingError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TrackingError::Cancelled),
        }
    }

    /// Non-blocking poll. `None` while the result is still outstanding.
    pub fn try_take(&self) -> Option<Result<T, TrackingError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TrackingError::Cancelled)),
        }
    }

    /// Underlying channel, for use with `crossbeam_channel::select!`.
    pub fn receiver(&self) -> &Receiver<Result<T, TrackingError>> {
        &self.rx
    }
}
