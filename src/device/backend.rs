//! Platform media-capture abstraction.
//!
//! The session never talks to a camera directly. It goes through
//! [`MediaDevices`], which negotiates a stream for a set of
//! [`MediaConstraints`], and [`MediaStream`], which owns the tracks of
//! one negotiated stream.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which physical camera a stream should come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// User-facing camera.
    #[default]
    Front,
    /// Environment-facing camera.
    Back,
}

impl FacingMode {
    /// Returns the other camera.
    pub fn opposite(self) -> Self {
        match self {
            FacingMode::Front => FacingMode::Back,
            FacingMode::Back => FacingMode::Front,
        }
    }

    /// Whether captured stills from this camera are flipped horizontally.
    #[inline]
    pub fn mirrors_capture(self) -> bool {
        matches!(self, FacingMode::Front)
    }

    /// Whether the live preview should be flipped horizontally.
    ///
    /// Must agree with [`FacingMode::mirrors_capture`], otherwise saved
    /// photos come out reversed relative to what the user framed.
    #[inline]
    pub fn mirror_preview(self) -> bool {
        self.mirrors_capture()
    }

    /// Platform constraint keyword for this facing mode.
    pub fn constraint(self) -> &'static str {
        match self {
            FacingMode::Front => "user",
            FacingMode::Back => "environment",
        }
    }
}

impl std::fmt::Display for FacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacingMode::Front => f.write_str("front"),
            FacingMode::Back => f.write_str("back"),
        }
    }
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(FacingMode::Front),
            "back" | "environment" => Ok(FacingMode::Back),
            other => Err(format!("unknown facing mode: {other}")),
        }
    }
}

/// Preferred stream resolution.
///
/// This is an *ideal* value: the platform may substitute the closest
/// mode it actually supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionHint {
    /// Ideal width in pixels.
    pub width: u32,
    /// Ideal height in pixels.
    pub height: u32,
}

impl Default for ResolutionHint {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl ResolutionHint {
    /// Creates a hint for the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Picks the mode closest to this hint, by summed axis distance.
    pub fn closest<'a>(&self, modes: impl IntoIterator<Item = &'a (u32, u32)>) -> Option<(u32, u32)> {
        modes
            .into_iter()
            .min_by_key(|(w, h)| w.abs_diff(self.width) as u64 + h.abs_diff(self.height) as u64)
            .copied()
    }
}

/// Constraints passed to [`MediaDevices::get_user_media`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Requested camera.
    pub facing: FacingMode,
    /// Ideal resolution.
    pub resolution: ResolutionHint,
}

impl MediaConstraints {
    /// Creates constraints for a video-only stream.
    pub fn video(facing: FacingMode, resolution: ResolutionHint) -> Self {
        Self { facing, resolution }
    }
}

/// Settings actually negotiated for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamSettings {
    /// Delivered width in pixels.
    pub width: u32,
    /// Delivered height in pixels.
    pub height: u32,
    /// Camera the stream comes from.
    pub facing: FacingMode,
}

/// Errors reported by the platform while acquiring a stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("media capture is not supported on this platform")]
    NotSupported,
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
}

/// A live media stream made of one or more tracks.
pub trait MediaStream {
    /// Platform identifier of the stream.
    fn id(&self) -> &str;

    /// Negotiated settings.
    fn settings(&self) -> StreamSettings;

    /// Returns true while at least one track is still running.
    fn is_active(&self) -> bool;

    /// Stops every track. Returns how many tracks were running.
    ///
    /// Calling this on a stopped stream does nothing and returns 0.
    fn stop_tracks(&mut self) -> usize;
}

/// Platform entry point for camera access.
#[allow(async_fn_in_trait)]
pub trait MediaDevices {
    /// Stream type handed out by this backend.
    type Stream: MediaStream;

    /// Returns true if the platform offers any media-capture capability.
    fn is_supported(&self) -> bool;

    /// Requests a video stream.
    ///
    /// May suspend for as long as the user leaves a permission prompt open.
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Self::Stream, DeviceError>;
}
