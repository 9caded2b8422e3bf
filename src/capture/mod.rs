//! Still capture from a live video surface.
//!
//! This module reads one frame from a [`FrameSource`], applies the
//! mirroring policy for the active camera and encodes the result into an
//! [`ImageArtifact`].

mod encoding;
mod frame;
mod pipeline;
mod source;

pub use encoding::{Encoding, ImageArtifact, ImageFormat};
pub use frame::{Frame, FrameSource, BYTES_PER_PIXEL};
pub use pipeline::{capture, CaptureError};
pub use source::StaticFrameSource;
