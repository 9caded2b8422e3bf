//! Exclusive ownership of one open media stream.

use super::backend::{FacingMode, MediaStream, StreamSettings};

/// Ownership token for an open camera stream.
///
/// The handle stops every track of its stream exactly once: either on an
/// explicit [`DeviceHandle::release`] or when it is dropped, whichever
/// comes first.
pub struct DeviceHandle<S: MediaStream> {
    stream: Option<S>,
    facing: FacingMode,
    settings: StreamSettings,
}

impl<S: MediaStream> DeviceHandle<S> {
    /// Wraps a freshly negotiated stream.
    pub fn new(stream: S, facing: FacingMode) -> Self {
        let settings = stream.settings();
        Self {
            stream: Some(stream),
            facing,
            settings,
        }
    }

    /// Camera this handle was opened for.
    #[inline]
    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    /// Settings negotiated when the stream was opened.
    #[inline]
    pub fn settings(&self) -> StreamSettings {
        self.settings
    }

    /// Returns true until the handle has been released.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Stops all tracks and gives up the stream.
    ///
    /// Idempotent. Returns true if this call actually released the stream.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                let stopped = stream.stop_tracks();
                tracing::info!(
                    stream = stream.id(),
                    facing = %self.facing,
                    tracks = stopped,
                    "Camera stream released"
                );
                true
            }
            None => false,
        }
    }
}

impl<S: MediaStream> Drop for DeviceHandle<S> {
    fn drop(&mut self) {
        if self.release() {
            tracing::debug!(facing = %self.facing, "Device handle released on drop");
        }
    }
}

impl<S: MediaStream> std::fmt::Debug for DeviceHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("stream", &self.stream.as_ref().map(|s| s.id()))
            .field("facing", &self.facing)
            .field("settings", &self.settings)
            .finish()
    }
}
