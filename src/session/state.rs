//! Observable session state.

use super::error::SessionError;
use crate::device::{FacingMode, StreamSettings};
use serde::Serialize;

/// The states a capture session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No camera held.
    Idle,
    /// Waiting for the platform to grant a stream.
    Requesting,
    /// Streaming, ready to capture.
    Live,
    /// A still has been taken and is held for review.
    Captured,
    /// A device or playback failure occurred.
    Error,
}

impl SessionState {
    /// Returns true in the states that own a device handle.
    pub fn holds_device(&self) -> bool {
        matches!(self, SessionState::Live | SessionState::Captured)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Requesting => "requesting",
            SessionState::Live => "live",
            SessionState::Captured => "captured",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Commands the presentation layer can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Acquire a camera.
    Open,
    /// Take a still.
    Capture,
    /// Change camera.
    Switch,
    /// Drop the still and go back to streaming.
    Retake,
    /// Persist the still.
    Save,
    /// Release everything.
    Close,
    /// Re-request the camera after a failure.
    Retry,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommandKind::Open => "open",
            CommandKind::Capture => "capture",
            CommandKind::Switch => "switch",
            CommandKind::Retake => "retake",
            CommandKind::Save => "save",
            CommandKind::Close => "close",
            CommandKind::Retry => "retry",
        };
        f.write_str(name)
    }
}

/// Everything the presentation layer needs to render a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Current state.
    pub state: SessionState,
    /// Active or last requested camera.
    pub facing: FacingMode,
    /// Whether the live preview should be drawn mirrored.
    pub mirror_preview: bool,
    /// Negotiated stream settings while a device is held.
    pub stream: Option<StreamSettings>,
    /// The frame source reported that video is flowing.
    pub stream_ready: bool,
    /// A captured still is available.
    pub has_image: bool,
    /// Set only in [`SessionState::Error`].
    pub last_error: Option<SessionError>,
    /// Advisory: the presentation layer may go fullscreen.
    pub fullscreen_requested: bool,
}

impl SessionSnapshot {
    pub(crate) fn idle(facing: FacingMode) -> Self {
        Self {
            state: SessionState::Idle,
            facing,
            mirror_preview: facing.mirror_preview(),
            stream: None,
            stream_ready: false,
            has_image: false,
            last_error: None,
            fullscreen_requested: false,
        }
    }
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedPhoto {
    /// Suggested filename handed to the sink.
    pub filename: String,
    /// Where the sink put it.
    pub location: String,
    /// BLAKE3 digest of the saved bytes.
    pub digest: String,
    /// Session state after the save.
    pub state: SessionState,
}
