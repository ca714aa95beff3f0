use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Computes a fixed-length identity descriptor for a face.
///
/// Shared by all recognition workers, so implementations take `&self` and
/// guard any mutable inference state themselves.
pub trait FaceEmbedder: Send + Sync {
    fn embed(&self, frame: &Frame, region: &Region)
        -> Result<Vec<f32>, Box<dyn std::error::Error>>;
}
