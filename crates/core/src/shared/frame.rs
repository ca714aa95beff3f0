use ndarray::ArrayView3;

use crate::shared::region::Region;

/// One camera frame: contiguous interleaved pixel bytes in row-major order.
///
/// Frames are immutable once handed to the engine. The engine shares them
/// behind an `Arc` between the tracking pass, the detection mailbox and the
/// recognition workers, so no copy is made per consumer.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Position of the frame in its source stream.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Luma of the pixel at `(x, y)`, with coordinates clamped to the frame
    /// edge. Single-channel frames return the raw value and an empty frame
    /// reads as black.
    pub fn luma(&self, x: i32, y: i32) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let cx = x.clamp(0, self.width as i32 - 1) as usize;
        let cy = y.clamp(0, self.height as i32 - 1) as usize;
        let c = self.channels as usize;
        let offset = (cy * self.width as usize + cx) * c;
        if c < 3 {
            return self.data[offset] as f32;
        }
        // BT.601
        0.299 * self.data[offset] as f32
            + 0.587 * self.data[offset + 1] as f32
            + 0.114 * self.data[offset + 2] as f32
    }

    /// Copies the pixels inside `region` (clipped to the frame) into a new
    /// frame. Returns `None` when the clipped region is empty.
    pub fn crop(&self, region: &Region) -> Option<Frame> {
        let clipped = region.clamp_to(self.width, self.height);
        if clipped.is_empty() {
            return None;
        }
        let c = self.channels as usize;
        let row_len = clipped.width() as usize * c;
        let mut pixels = Vec::with_capacity(row_len * clipped.height() as usize);
        for y in clipped.top..clipped.bottom {
            let start = (y as usize * self.width as usize + clipped.left as usize) * c;
            pixels.extend_from_slice(&self.data[start..start + row_len]);
        }
        Some(Frame::new(
            pixels,
            clipped.width() as u32,
            clipped.height() as u32,
            self.channels,
            self.index,
        ))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
