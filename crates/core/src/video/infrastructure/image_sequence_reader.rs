use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::video::domain::frame_reader::{FrameReader, SequenceMetadata};

/// Reads a single image, or every image in a directory, as a frame
/// sequence.
///
/// Directory entries are filtered by extension and sorted by file name.
/// Images are decoded lazily with the `image` crate; every frame must
/// match the dimensions of the first.
pub struct ImageSequenceReader {
    paths: Vec<PathBuf>,
    dimensions: Option<(u32, u32)>,
}

impl ImageSequenceReader {
    pub fn new() -> Self {
        Self {
            paths: Vec::new(),
            dimensions: None,
        }
    }
}

impl Default for ImageSequenceReader {
    fn default() -> Self {
        Self::new()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn load_frame(
    path: &Path,
    index: usize,
    expected: (u32, u32),
) -> Result<Frame, Box<dyn std::error::Error>> {
    let img = image::open(path)
        .map_err(|e| format!("Failed to decode {}: {e}", path.display()))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    if (width, height) != expected {
        return Err(format!(
            "{} is {width}x{height}, expected {}x{}",
            path.display(),
            expected.0,
            expected.1
        )
        .into());
    }
    Ok(Frame::new(img.into_raw(), width, height, 3, index))
}

impl FrameReader for ImageSequenceReader {
    fn open(&mut self, path: &Path) -> Result<SequenceMetadata, Box<dyn std::error::Error>> {
        let paths = if path.is_dir() {
            list_images(path)?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(format!("{} does not exist", path.display()).into());
        };

        let first = paths
            .first()
            .ok_or_else(|| format!("No images found in {}", path.display()))?;
        let (width, height) = image::image_dimensions(first)
            .map_err(|e| format!("Failed to read {}: {e}", first.display()))?;

        log::debug!(
            "Opened {} image(s) from {} ({width}x{height})",
            paths.len(),
            path.display()
        );
        let metadata = SequenceMetadata {
            width,
            height,
            total_frames: paths.len(),
            source_path: path.to_path_buf(),
        };
        self.paths = paths;
        self.dimensions = Some((width, height));
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        let Some(expected) = self.dimensions else {
            return Box::new(std::iter::once(Err(
                "ImageSequenceReader: not opened".into()
            )));
        };
        Box::new(
            self.paths
                .iter()
                .enumerate()
                .map(move |(index, path)| load_frame(path, index, expected)),
        )
    }

    fn close(&mut self) {
        self.paths.clear();
        self.dimensions = None;
    }
}
