use crate::shared::region::Region;

/// Track identifiers are allocated in increasing order and never reused
/// within a registry's lifetime.
pub type TrackId = u32;

/// A point-in-time view of one live track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub id: TrackId,
    pub region: Region,
}
