use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Full-frame face detection.
///
/// Detections carry no identity and no continuity between calls; the
/// engine reconciles them against live tracks. The detector is owned by
/// the detection thread, hence `Send` and `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
