//! Session error taxonomy.
//!
//! Matching is done on [`ErrorKind`]. The detail string is for humans.

use super::state::{CommandKind, SessionState};
use crate::capture::CaptureError;
use crate::device::DeviceError;
use crate::sink::SinkError;
use serde::Serialize;
use thiserror::Error;

/// Closed set of failure kinds a session can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The platform has no media-capture capability.
    NotSupported,
    /// The user declined camera access.
    PermissionDenied,
    /// Any other acquisition failure (device busy, hardware error).
    DeviceUnavailable,
    /// Capture was requested before the video delivered a frame.
    FrameNotReady,
    /// A camera request is still outstanding.
    Busy,
    /// The frame source failed to start decoding after binding.
    PlaybackFailure,
    /// The still could not be encoded.
    EncodingFailure,
}

impl ErrorKind {
    /// Stable snake_case name, used as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::DeviceUnavailable => "device_unavailable",
            ErrorKind::FrameNotReady => "frame_not_ready",
            ErrorKind::Busy => "busy",
            ErrorKind::PlaybackFailure => "playback_failure",
            ErrorKind::EncodingFailure => "encoding_failure",
        }
    }

    /// Whether Retry may be attempted without closing the session.
    ///
    /// Platforms do not re-prompt for permission on demand, and an
    /// unsupported platform stays unsupported.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorKind::NotSupported | ErrorKind::PermissionDenied)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure recorded by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {detail}")]
pub struct SessionError {
    kind: ErrorKind,
    detail: String,
}

impl SessionError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// The error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable detail.
    #[inline]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<DeviceError> for SessionError {
    fn from(e: DeviceError) -> Self {
        let kind = match e {
            DeviceError::NotSupported => ErrorKind::NotSupported,
            DeviceError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            DeviceError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        let kind = match e {
            CaptureError::FrameNotReady { .. } => ErrorKind::FrameNotReady,
            CaptureError::Encoding(_) => ErrorKind::EncodingFailure,
        };
        Self::new(kind, e.to_string())
    }
}

/// Why a command did not complete.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command is not a legal transition from the current state.
    #[error("{command} is not accepted while the session is {state}")]
    Rejected {
        command: CommandKind,
        state: SessionState,
    },
    /// Retry was requested after a failure that needs a fresh session.
    #[error("{0} cannot be retried; close the session and open it again")]
    NotRetryable(ErrorKind),
    /// A device or frame failure.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The artifact sink failed. The photo is still held.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl CommandError {
    /// The session error kind, for `Session` failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CommandError::Session(e) => Some(e.kind()),
            _ => None,
        }
    }
}
