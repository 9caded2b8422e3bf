//! Decoded video frames and the surface that supplies them.

use image::RgbaImage;

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// One decoded video frame, RGBA8, at the stream's native size.
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    /// Position in the source's decode order. The first frame is 1.
    sequence: u64,
}

impl Frame {
    /// Wraps a row-major RGBA buffer. The sequence number starts at 0
    /// until a source stamps it.
    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
            sequence: 0,
        }
    }

    /// Same frame, stamped with the source's decode position.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Native width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Native height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Decode position assigned by the source.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True if the frame has area and its buffer matches its dimensions.
    pub fn is_valid(&self) -> bool {
        let expected = self.width as usize * self.height as usize * BYTES_PER_PIXEL;
        expected > 0 && self.pixels.len() == expected
    }

    /// Converts into an image raster, or `None` if the buffer is malformed.
    pub fn into_raster(self) -> Option<RgbaImage> {
        if !self.is_valid() {
            return None;
        }
        RgbaImage::from_raw(self.width, self.height, self.pixels)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frame(#{} {}x{}, {} bytes)",
            self.sequence,
            self.width,
            self.height,
            self.pixels.len()
        )
    }
}

/// Live decoded-video surface owned by the presentation layer.
///
/// The capture pipeline only reads from it.
pub trait FrameSource {
    /// Native video dimensions. `(0, 0)` until the first frame arrives.
    fn dimensions(&self) -> (u32, u32);

    /// The most recently decoded frame, if any.
    fn current_frame(&self) -> Option<Frame>;
}
