//! Frame-to-still transformation.
//!
//! The raster is always built at the frame's native size, never the
//! on-screen size. Front-camera frames are flipped horizontally before
//! encoding. Back-camera frames are left as they are.

use super::encoding::{Encoding, ImageArtifact};
use super::frame::FrameSource;
use crate::device::FacingMode;
use image::imageops;
use thiserror::Error;

/// Errors that can occur while producing a still.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("video frame not ready ({width}x{height})")]
    FrameNotReady { width: u32, height: u32 },
    #[error("{0}")]
    Encoding(String),
}

/// Captures the current frame of `source` as an encoded still.
pub fn capture<F: FrameSource + ?Sized>(
    source: &F,
    facing: FacingMode,
    encoding: &Encoding,
) -> Result<ImageArtifact, CaptureError> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(CaptureError::FrameNotReady { width, height });
    }

    let frame = source
        .current_frame()
        .ok_or(CaptureError::FrameNotReady { width, height })?;
    let sequence = frame.sequence();
    let (width, height) = (frame.width(), frame.height());
    let mut raster = frame
        .into_raster()
        .ok_or(CaptureError::FrameNotReady { width, height })?;

    if facing.mirrors_capture() {
        imageops::flip_horizontal_in_place(&mut raster);
    }

    let artifact = encoding.encode(raster)?;
    tracing::debug!(
        facing = %facing,
        frame = sequence,
        width,
        height,
        format = artifact.format().extension(),
        bytes = artifact.bytes().len(),
        "Captured still"
    );
    Ok(artifact)
}
