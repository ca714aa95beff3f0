use thiserror::Error;

use crate::tracking::domain::track::TrackId;

/// Errors surfaced by the tracking engine and its pending handles.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("track {0} not found")]
    NotFound(TrackId),
    #[error("detector failed: {0}")]
    Detector(String),
    #[error("embedder failed: {0}")]
    Embedder(String),
    #[error("region tracker failed: {0}")]
    Tracker(String),
    #[error("{operation} is not allowed in the engine's current lifecycle state")]
    LifecycleMisuse { operation: &'static str },
    #[error("engine stopped before the request resolved")]
    Cancelled,
    #[error("timed out waiting for a result")]
    Timeout,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

impl TrackingError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackingError::NotFound(_))
    }
}
