//! Acquire, hold, switch and release the camera.

use super::backend::{DeviceError, FacingMode, MediaConstraints, MediaDevices, ResolutionHint};
use super::handle::DeviceHandle;
use crate::metrics::SessionMetrics;

/// Handle type produced by a manager over backend `D`.
pub type HandleOf<D> = DeviceHandle<<D as MediaDevices>::Stream>;

/// Owns the platform backend and hands out [`DeviceHandle`]s.
pub struct DeviceSessionManager<D: MediaDevices> {
    devices: D,
    metrics: Option<SessionMetrics>,
}

impl<D: MediaDevices> DeviceSessionManager<D> {
    /// Creates a manager over the given backend.
    pub fn new(devices: D) -> Self {
        Self {
            devices,
            metrics: None,
        }
    }

    /// Attaches a metrics registry.
    pub fn with_metrics(mut self, metrics: SessionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The wrapped backend.
    pub fn devices(&self) -> &D {
        &self.devices
    }

    /// Returns true if the platform can capture video at all.
    pub fn is_supported(&self) -> bool {
        self.devices.is_supported()
    }

    /// Requests a stream from the given camera.
    ///
    /// `NotSupported` is decided up front without touching the backend, so
    /// an incapable platform never sees a request.
    pub async fn acquire(
        &self,
        facing: FacingMode,
        resolution: ResolutionHint,
    ) -> Result<HandleOf<D>, DeviceError> {
        if !self.devices.is_supported() {
            tracing::warn!("Media capture not supported, refusing to request camera");
            return Err(DeviceError::NotSupported);
        }

        let constraints = MediaConstraints::video(facing, resolution);
        tracing::debug!(
            facing = facing.constraint(),
            ideal_width = resolution.width,
            ideal_height = resolution.height,
            "Requesting camera stream"
        );

        match self.devices.get_user_media(&constraints).await {
            Ok(stream) => {
                let handle = DeviceHandle::new(stream, facing);
                let settings = handle.settings();
                tracing::info!(
                    facing = %facing,
                    width = settings.width,
                    height = settings.height,
                    "Camera stream acquired"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_acquired();
                }
                Ok(handle)
            }
            Err(e) => {
                tracing::warn!(facing = %facing, error = %e, "Camera acquisition failed");
                Err(e)
            }
        }
    }

    /// Stops every track of `handle`. Safe to call more than once.
    pub fn release(&self, handle: &mut HandleOf<D>) {
        if handle.release() {
            if let Some(metrics) = &self.metrics {
                metrics.record_released();
            }
        }
    }

    /// Releases `old`, then requests the other camera.
    ///
    /// There is no rollback: if the new request fails the old stream
    /// stays closed.
    pub async fn switch(
        &self,
        mut old: HandleOf<D>,
        facing: FacingMode,
        resolution: ResolutionHint,
    ) -> Result<HandleOf<D>, DeviceError> {
        tracing::info!(from = %old.facing(), to = %facing, "Switching camera");
        self.release(&mut old);
        drop(old);
        self.acquire(facing, resolution).await
    }
}
