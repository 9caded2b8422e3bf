//! In-memory frame sources for tests and the demo binary.

use super::frame::{Frame, FrameSource, BYTES_PER_PIXEL};
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};

/// A frame source that holds whatever frame was delivered last.
#[derive(Debug, Clone, Default)]
pub struct StaticFrameSource {
    frame: Option<Frame>,
    decoded: u64,
}

impl StaticFrameSource {
    /// A source that has already decoded `frame`.
    pub fn new(frame: Frame) -> Self {
        let mut source = Self::default();
        source.deliver(frame);
        source
    }

    /// A source whose video has not delivered anything yet (reports 0x0).
    pub fn not_ready() -> Self {
        Self::default()
    }

    /// A left-to-right, top-to-bottom gradient.
    ///
    /// Red follows the column and green follows the row, so no two columns
    /// are alike and a horizontal flip is always visible.
    pub fn test_pattern(width: u32, height: u32) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for y in 0..height {
            for x in 0..width {
                let r = (x * 255 / width.max(2).saturating_sub(1)) as u8;
                let g = (y * 255 / height.max(2).saturating_sub(1)) as u8;
                let b = ((x ^ y) & 0xFF) as u8;
                pixels.extend_from_slice(&[r, g, b, 0xFF]);
            }
        }
        Self::new(Frame::rgba(width, height, pixels))
    }

    /// Opaque noise from a seeded ChaCha20 stream.
    pub fn noise(width: u32, height: u32, seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut pixels = vec![0u8; width as usize * height as usize * BYTES_PER_PIXEL];
        rng.fill_bytes(&mut pixels);
        for alpha in pixels.iter_mut().skip(3).step_by(BYTES_PER_PIXEL) {
            *alpha = 0xFF;
        }
        Self::new(Frame::rgba(width, height, pixels))
    }

    /// Makes `frame` the current one, as if the decoder just produced it.
    pub fn deliver(&mut self, frame: Frame) {
        self.decoded += 1;
        self.frame = Some(frame.with_sequence(self.decoded));
    }

    /// How many frames have been delivered so far.
    pub fn frames_decoded(&self) -> u64 {
        self.decoded
    }
}

impl FrameSource for StaticFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        self.frame
            .as_ref()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0))
    }

    fn current_frame(&self) -> Option<Frame> {
        self.frame.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_reports_zero() {
        let source = StaticFrameSource::not_ready();
        assert_eq!(source.dimensions(), (0, 0));
        assert!(source.current_frame().is_none());
        assert_eq!(source.frames_decoded(), 0);
    }

    #[test]
    fn test_delivered_frames_are_numbered() {
        let mut source = StaticFrameSource::not_ready();
        source.deliver(Frame::rgba(2, 2, vec![0u8; 2 * 2 * BYTES_PER_PIXEL]));
        source.deliver(Frame::rgba(4, 2, vec![0u8; 4 * 2 * BYTES_PER_PIXEL]));

        assert_eq!(source.dimensions(), (4, 2));
        assert_eq!(source.current_frame().unwrap().sequence(), 2);
        assert_eq!(source.frames_decoded(), 2);
    }

    #[test]
    fn test_pattern_is_valid_and_asymmetric() {
        let source = StaticFrameSource::test_pattern(8, 4);
        let frame = source.current_frame().unwrap();
        assert!(frame.is_valid());

        let row = &frame.pixels()[..8 * BYTES_PER_PIXEL];
        assert_ne!(row[..BYTES_PER_PIXEL], row[7 * BYTES_PER_PIXEL..]);
    }

    #[test]
    fn test_noise_is_deterministic() {
        let a = StaticFrameSource::noise(16, 16, 7).current_frame().unwrap();
        let b = StaticFrameSource::noise(16, 16, 7).current_frame().unwrap();
        let c = StaticFrameSource::noise(16, 16, 8).current_frame().unwrap();
        assert_eq!(a.pixels(), b.pixels());
        assert_ne!(a.pixels(), c.pixels());
        assert!(a.is_valid());
    }
}
