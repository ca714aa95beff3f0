use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Follows one face from frame to frame.
///
/// Each update reports the new region and a quality score on the
/// tracker's own scale; the registry drops the track when the score falls
/// under its configured threshold.
pub trait RegionTracker: Send + Sync {
    fn update(&mut self, frame: &Frame) -> Result<(Region, f64), Box<dyn std::error::Error>>;
}

/// Starts a [`RegionTracker`] on an initial region.
pub trait RegionTrackerFactory: Send + Sync {
    fn start(
        &self,
        frame: &Frame,
        region: Region,
    ) -> Result<Box<dyn RegionTracker>, Box<dyn std::error::Error>>;
}
