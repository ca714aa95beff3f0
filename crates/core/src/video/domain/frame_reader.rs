use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;

/// What a [`FrameReader`] learned about its source when opening it.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceMetadata {
    /// Dimensions of the first frame.
    pub width: u32,
    pub height: u32,
    pub total_frames: usize,
    pub source_path: PathBuf,
}

/// Produces frames for the tracking engine.
///
/// Plays the part of the camera feed: frames come out in order and the
/// caller pushes each one into the engine.
pub trait FrameReader: Send {
    fn open(&mut self, path: &Path) -> Result<SequenceMetadata, Box<dyn std::error::Error>>;

    /// Returns an iterator over frames in sequence order.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_>;

    /// Releases any resources held by the reader.
    fn close(&mut self);
}
