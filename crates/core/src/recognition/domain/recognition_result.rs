use crate::recognition::domain::identity_store::IdentityId;
use crate::shared::region::Region;
use crate::tracking::domain::track::TrackId;

/// The outcome of recognizing one track.
///
/// Returned to the caller and not retained by the engine; registering an
/// unknown face as a new identity is the caller's decision.
#[derive(Clone, Debug, PartialEq)]
pub struct RecognitionResult {
    pub track_id: TrackId,
    /// Region the embedding was computed from.
    pub region: Region,
    /// Closest known identity within the match policy, if any.
    pub identity: Option<IdentityId>,
    /// Distance to `identity`; `None` when no identity matched.
    pub distance: Option<f32>,
    pub embedding: Vec<f32>,
}

impl RecognitionResult {
    pub fn is_known(&self) -> bool {
        self.identity.is_some()
    }
}
