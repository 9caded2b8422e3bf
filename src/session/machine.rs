//! The capture session state machine.
//!
//! All commands take `&self` and run on one thread. Only `open`, `switch`
//! and `retry` suspend, while the platform negotiates a stream. While one
//! of those is outstanding every other command is rejected with
//! [`ErrorKind::Busy`]. Nothing is queued.
//!
//! The device handle, the captured image and the last error live inside
//! the current phase variant, so none of them can outlive the state that
//! owns them.

use super::error::{CommandError, ErrorKind, SessionError};
use super::state::{CommandKind, SavedPhoto, SessionSnapshot, SessionState};
use crate::capture::{self, FrameSource, ImageArtifact};
use crate::config::{ConfigError, SessionConfig};
use crate::device::{
    DeviceHandle, DeviceSessionManager, FacingMode, HandleOf, MediaDevices, MediaStream,
    StreamSettings,
};
use crate::metrics::SessionMetrics;
use crate::sink::{suggested_filename, ArtifactSink};
use std::cell::RefCell;
use tokio::sync::watch;

enum Phase<S: MediaStream> {
    Idle,
    Requesting,
    Live(DeviceHandle<S>),
    Captured {
        handle: DeviceHandle<S>,
        image: ImageArtifact,
    },
    Error(SessionError),
}

impl<S: MediaStream> Phase<S> {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Requesting => SessionState::Requesting,
            Phase::Live(_) => SessionState::Live,
            Phase::Captured { .. } => SessionState::Captured,
            Phase::Error(_) => SessionState::Error,
        }
    }

    fn handle(&self) -> Option<&DeviceHandle<S>> {
        match self {
            Phase::Live(handle) | Phase::Captured { handle, .. } => Some(handle),
            _ => None,
        }
    }
}

struct Inner<S: MediaStream> {
    phase: Phase<S>,
    facing: FacingMode,
    stream_ready: bool,
}

/// One open-to-closed episode of camera usage.
///
/// Dropping the session releases any camera it still holds.
pub struct Session<D: MediaDevices> {
    manager: DeviceSessionManager<D>,
    config: SessionConfig,
    inner: RefCell<Inner<D::Stream>>,
    updates: watch::Sender<SessionSnapshot>,
    metrics: Option<SessionMetrics>,
}

/// Returns the session to Idle if a camera request is abandoned mid-flight.
struct PendingRequest<'a, D: MediaDevices> {
    session: &'a Session<D>,
    armed: bool,
}

impl<D: MediaDevices> PendingRequest<'_, D> {
    fn complete(mut self) {
        self.armed = false;
    }
}

impl<D: MediaDevices> Drop for PendingRequest<'_, D> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut inner) = self.session.inner.try_borrow_mut() {
            if matches!(inner.phase, Phase::Requesting) {
                inner.phase = Phase::Idle;
            }
        }
        tracing::info!("Camera request cancelled");
        self.session.publish();
    }
}

impl<D: MediaDevices> Session<D> {
    /// Creates an idle session over the given backend.
    pub fn new(devices: D, config: SessionConfig) -> Result<Self, ConfigError> {
        Self::build(devices, config, None)
    }

    /// Creates an idle session that reports into `metrics`.
    pub fn with_metrics(
        devices: D,
        config: SessionConfig,
        metrics: SessionMetrics,
    ) -> Result<Self, ConfigError> {
        Self::build(devices, config, Some(metrics))
    }

    fn build(
        devices: D,
        config: SessionConfig,
        metrics: Option<SessionMetrics>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut manager = DeviceSessionManager::new(devices);
        if let Some(metrics) = &metrics {
            manager = manager.with_metrics(metrics.clone());
        }
        let facing = config.default_facing;
        let (updates, _) = watch::channel(SessionSnapshot::idle(facing));

        Ok(Self {
            manager,
            config,
            inner: RefCell::new(Inner {
                phase: Phase::Idle,
                facing,
                stream_ready: false,
            }),
            updates,
            metrics,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns true if the platform can capture video at all.
    ///
    /// The presentation layer should show an unsupported-platform message
    /// instead of offering Open when this is false.
    pub fn is_supported(&self) -> bool {
        self.manager.is_supported()
    }

    /// The platform backend.
    pub fn devices(&self) -> &D {
        self.manager.devices()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.inner.borrow().phase.state()
    }

    /// Active or last requested camera.
    pub fn facing(&self) -> FacingMode {
        self.inner.borrow().facing
    }

    /// The captured still, present only while Captured.
    pub fn captured_image(&self) -> Option<ImageArtifact> {
        match &self.inner.borrow().phase {
            Phase::Captured { image, .. } => Some(image.clone()),
            _ => None,
        }
    }

    /// The recorded failure, present only in the Error state.
    pub fn last_error(&self) -> Option<SessionError> {
        match &self.inner.borrow().phase {
            Phase::Error(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Negotiated stream settings while a device is held.
    pub fn stream_settings(&self) -> Option<StreamSettings> {
        self.inner.borrow().phase.handle().map(|h| h.settings())
    }

    /// A point-in-time view for rendering.
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.borrow();
        let state = inner.phase.state();
        SessionSnapshot {
            state,
            facing: inner.facing,
            mirror_preview: inner.facing.mirror_preview(),
            stream: inner.phase.handle().map(|h| h.settings()),
            stream_ready: inner.stream_ready,
            has_image: matches!(inner.phase, Phase::Captured { .. }),
            last_error: match &inner.phase {
                Phase::Error(e) => Some(e.clone()),
                _ => None,
            },
            fullscreen_requested: self.config.fullscreen_on_open && state.holds_device(),
        }
    }

    /// Subscribes to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Requests the given camera. Idle → Requesting → Live or Error.
    pub async fn open(&self, facing: FacingMode) -> Result<SessionState, CommandError> {
        {
            let mut inner = self.inner.borrow_mut();
            let state = inner.phase.state();
            if state != SessionState::Idle {
                drop(inner);
                return Err(self.reject(CommandKind::Open, state));
            }
            inner.facing = facing;
            inner.stream_ready = false;
            inner.phase = Phase::Requesting;
        }
        tracing::info!(facing = %facing, "Opening camera session");
        self.publish();
        self.request(facing, None).await
    }

    /// Takes a still from `source`. Live → Captured.
    ///
    /// If the video has not delivered a frame yet the command fails with
    /// [`ErrorKind::FrameNotReady`] and the session stays Live.
    pub fn capture<F: FrameSource + ?Sized>(
        &self,
        source: &F,
    ) -> Result<SessionState, CommandError> {
        let (state, facing) = {
            let inner = self.inner.borrow();
            (inner.phase.state(), inner.facing)
        };
        if state != SessionState::Live {
            return Err(self.reject(CommandKind::Capture, state));
        }

        // The source may call back into the session, so no borrow is held here.
        let image = match capture::capture(source, facing, &self.config.encoding) {
            Ok(image) => image,
            Err(e) => {
                let err = SessionError::from(e);
                tracing::warn!(error = %err, "Capture failed, staying live");
                self.record_error(err.kind());
                return Err(err.into());
            }
        };

        {
            let mut inner = self.inner.borrow_mut();
            let phase = std::mem::replace(&mut inner.phase, Phase::Idle);
            match phase {
                Phase::Live(handle) => inner.phase = Phase::Captured { handle, image },
                other => {
                    let state = other.state();
                    inner.phase = other;
                    drop(inner);
                    tracing::debug!(state = %state, "Session moved on during capture, dropping still");
                    return Err(self.reject(CommandKind::Capture, state));
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_capture();
        }
        self.publish();
        Ok(SessionState::Captured)
    }

    /// Releases the current camera and requests `facing`.
    /// Live → Requesting → Live or Error.
    ///
    /// The old stream is always stopped first. A failed request leaves the
    /// session in Error; the previous camera is not restored.
    pub async fn switch(&self, facing: FacingMode) -> Result<SessionState, CommandError> {
        let previous = {
            let mut inner = self.inner.borrow_mut();
            let phase = std::mem::replace(&mut inner.phase, Phase::Requesting);
            match phase {
                Phase::Live(handle) => {
                    inner.facing = facing;
                    inner.stream_ready = false;
                    handle
                }
                other => {
                    let state = other.state();
                    inner.phase = other;
                    drop(inner);
                    return Err(self.reject(CommandKind::Switch, state));
                }
            }
        };
        self.publish();
        self.request(facing, Some(previous)).await
    }

    /// Discards the still and resumes streaming on the same handle.
    /// Captured → Live.
    pub fn retake(&self) -> Result<SessionState, CommandError> {
        let mut inner = self.inner.borrow_mut();
        let phase = std::mem::replace(&mut inner.phase, Phase::Idle);
        match phase {
            Phase::Captured { handle, .. } => {
                inner.phase = Phase::Live(handle);
            }
            other => {
                let state = other.state();
                inner.phase = other;
                drop(inner);
                return Err(self.reject(CommandKind::Retake, state));
            }
        }
        drop(inner);
        tracing::debug!("Photo discarded for retake");
        self.publish();
        Ok(SessionState::Live)
    }

    /// Hands the still to `sink` under a timestamped filename.
    ///
    /// Stays Captured, or closes the session when `close_after_save` is
    /// configured. A sink failure leaves the still in place.
    pub fn save<K: ArtifactSink + ?Sized>(
        &self,
        sink: &mut K,
    ) -> Result<SavedPhoto, CommandError> {
        let now = chrono::Utc::now().timestamp_millis();
        let prefix = &self.config.filename_prefix;

        let image = match &self.inner.borrow().phase {
            Phase::Captured { image, .. } => Some(image.clone()),
            _ => None,
        };
        let Some(image) = image else {
            return Err(self.reject(CommandKind::Save, self.state()));
        };

        // Sinks may call back into the session, so persist without a borrow.
        let filename = suggested_filename(prefix, image.format(), now);
        let location = match sink.persist(&image, &filename) {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(error = %e, "Saving photo failed");
                return Err(e.into());
            }
        };
        let digest = image.digest();

        if let Some(metrics) = &self.metrics {
            metrics.record_save();
        }
        tracing::info!(filename = %filename, location = %location, "Photo saved");

        if self.config.close_after_save {
            self.shutdown();
        }

        Ok(SavedPhoto {
            filename,
            location,
            digest,
            state: self.state(),
        })
    }

    /// Releases the camera and discards any still or error. → Idle.
    ///
    /// Closing an idle session is a no-op.
    pub fn close(&self) -> Result<SessionState, CommandError> {
        match self.state() {
            SessionState::Idle => Ok(SessionState::Idle),
            SessionState::Requesting => {
                Err(self.reject(CommandKind::Close, SessionState::Requesting))
            }
            _ => {
                self.shutdown();
                tracing::info!("Camera session closed");
                Ok(SessionState::Idle)
            }
        }
    }

    /// Re-requests the current camera after a recoverable failure.
    /// Error → Requesting → Live or Error.
    pub async fn retry(&self) -> Result<SessionState, CommandError> {
        let facing = {
            let mut inner = self.inner.borrow_mut();
            let kind = match &inner.phase {
                Phase::Error(e) => Some(e.kind()),
                _ => None,
            };
            let Some(kind) = kind else {
                let state = inner.phase.state();
                drop(inner);
                return Err(self.reject(CommandKind::Retry, state));
            };
            if !kind.is_recoverable() {
                return Err(CommandError::NotRetryable(kind));
            }
            inner.phase = Phase::Requesting;
            inner.stream_ready = false;
            inner.facing
        };
        tracing::info!(facing = %facing, "Retrying camera request");
        self.publish();
        self.request(facing, None).await
    }

    // =========================================================================
    // Frame source events
    // =========================================================================

    /// The frame source is bound and decoding.
    ///
    /// Returns false if no camera is held, in which case the event is
    /// ignored.
    pub fn stream_ready(&self) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.phase.state().holds_device() {
                tracing::debug!(state = %inner.phase.state(), "Ignoring stream-ready event");
                return false;
            }
            inner.stream_ready = true;
        }
        self.publish();
        true
    }

    /// The frame source could not start decoding the stream.
    ///
    /// Moves a Live or Captured session to Error and releases the camera.
    /// Ignored in other states.
    pub fn playback_failed(&self, detail: impl Into<String>) -> SessionState {
        let state = self.state();
        if !state.holds_device() {
            tracing::debug!(state = %state, "Ignoring playback failure");
            return state;
        }
        self.fail(SessionError::new(ErrorKind::PlaybackFailure, detail));
        SessionState::Error
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn request(
        &self,
        facing: FacingMode,
        previous: Option<HandleOf<D>>,
    ) -> Result<SessionState, CommandError> {
        let pending = PendingRequest {
            session: self,
            armed: true,
        };
        let resolution = self.config.resolution;
        let result = match previous {
            Some(old) => self.manager.switch(old, facing, resolution).await,
            None => self.manager.acquire(facing, resolution).await,
        };
        pending.complete();

        match result {
            Ok(handle) => {
                self.inner.borrow_mut().phase = Phase::Live(handle);
                self.publish();
                Ok(SessionState::Live)
            }
            Err(e) => {
                let err = SessionError::from(e);
                self.fail(err.clone());
                Err(err.into())
            }
        }
    }

    fn fail(&self, err: SessionError) {
        tracing::warn!(kind = %err.kind(), detail = err.detail(), "Camera session failed");
        self.record_error(err.kind());
        let phase = {
            let mut inner = self.inner.borrow_mut();
            inner.stream_ready = false;
            std::mem::replace(&mut inner.phase, Phase::Error(err))
        };
        self.release_phase(phase);
        self.publish();
    }

    fn shutdown(&self) {
        let phase = {
            let mut inner = self.inner.borrow_mut();
            inner.stream_ready = false;
            std::mem::replace(&mut inner.phase, Phase::Idle)
        };
        self.release_phase(phase);
        self.publish();
    }

    fn release_phase(&self, phase: Phase<D::Stream>) {
        match phase {
            Phase::Live(mut handle) | Phase::Captured { mut handle, .. } => {
                self.manager.release(&mut handle);
            }
            _ => {}
        }
    }

    fn reject(&self, command: CommandKind, state: SessionState) -> CommandError {
        if state == SessionState::Requesting {
            tracing::debug!(command = %command, "Rejecting command while camera request is pending");
            self.record_error(ErrorKind::Busy);
            return SessionError::new(
                ErrorKind::Busy,
                format!("{command} rejected: camera request in progress"),
            )
            .into();
        }
        tracing::debug!(command = %command, state = %state, "Rejecting command");
        CommandError::Rejected { command, state }
    }

    fn record_error(&self, kind: ErrorKind) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error(kind);
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        tracing::debug!(state = %snapshot.state, facing = %snapshot.facing, "Session updated");
        self.updates.send_replace(snapshot);
    }
}

impl<D: MediaDevices> Drop for Session<D> {
    fn drop(&mut self) {
        let phase = std::mem::replace(&mut self.inner.get_mut().phase, Phase::Idle);
        if phase.handle().is_some() {
            tracing::info!(state = %phase.state(), "Session dropped while holding camera");
        }
        self.release_phase(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Encoding, Frame, StaticFrameSource, BYTES_PER_PIXEL};
    use crate::device::{DeviceError, DeviceEvent, DeviceLedger, MockDevices};
    use crate::sink::{MemorySink, SinkError};
    use image::{imageops, RgbaImage};
    use std::rc::Rc;
    use tokio::sync::Notify;

    fn png_config() -> SessionConfig {
        SessionConfig {
            encoding: Encoding::png(),
            ..Default::default()
        }
    }

    fn session() -> Session<MockDevices> {
        Session::new(MockDevices::new(), SessionConfig::default()).unwrap()
    }

    fn raster_of(source: &StaticFrameSource) -> RgbaImage {
        source.current_frame().unwrap().into_raster().unwrap()
    }

    #[tokio::test]
    async fn test_open_goes_live() {
        let session = session();
        assert_eq!(session.state(), SessionState::Idle);

        let state = session.open(FacingMode::Front).await.unwrap();
        assert_eq!(state, SessionState::Live);
        assert_eq!(session.devices().ledger().open_streams(), 1);

        let snapshot = session.snapshot();
        assert!(snapshot.mirror_preview);
        assert_eq!(snapshot.stream.map(|s| (s.width, s.height)), Some((1280, 720)));
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn test_open_twice_rejected() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();

        let err = session.open(FacingMode::Back).await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::Rejected {
                command: CommandKind::Open,
                state: SessionState::Live
            }
        ));
        assert_eq!(session.devices().ledger().acquire_count(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_is_not_retryable() {
        let session = session();
        session
            .devices()
            .fail_next(DeviceError::PermissionDenied("dismissed".into()));

        let err = session.open(FacingMode::Front).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PermissionDenied));
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(
            session.last_error().map(|e| e.kind()),
            Some(ErrorKind::PermissionDenied)
        );

        assert!(matches!(
            session.retry().await,
            Err(CommandError::NotRetryable(ErrorKind::PermissionDenied))
        ));
        assert_eq!(session.state(), SessionState::Error);

        assert_eq!(session.close().unwrap(), SessionState::Idle);
        assert!(session.last_error().is_none());
        assert_eq!(session.open(FacingMode::Front).await.unwrap(), SessionState::Live);
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let session = Session::new(MockDevices::unsupported(), SessionConfig::default()).unwrap();
        assert!(!session.is_supported());

        let err = session.open(FacingMode::Front).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotSupported));
        assert!(matches!(
            session.retry().await,
            Err(CommandError::NotRetryable(ErrorKind::NotSupported))
        ));
        assert_eq!(session.devices().ledger().acquire_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_after_device_unavailable() {
        let session = session();
        session
            .devices()
            .fail_next(DeviceError::DeviceUnavailable("in use".into()));

        assert!(session.open(FacingMode::Back).await.is_err());
        assert_eq!(session.retry().await.unwrap(), SessionState::Live);
        assert_eq!(session.facing(), FacingMode::Back);
        assert_eq!(session.devices().ledger().acquire_count(), 2);
    }

    #[tokio::test]
    async fn test_front_capture_mirrored_back_not() {
        let source = StaticFrameSource::test_pattern(640, 480);
        let original = raster_of(&source);

        let front = Session::new(MockDevices::new(), png_config()).unwrap();
        front.open(FacingMode::Front).await.unwrap();
        assert_eq!(front.capture(&source).unwrap(), SessionState::Captured);
        let mirrored = front.captured_image().unwrap().decode().unwrap();
        assert_eq!(mirrored, imageops::flip_horizontal(&original));

        let back = Session::new(MockDevices::new(), png_config()).unwrap();
        back.open(FacingMode::Back).await.unwrap();
        back.capture(&source).unwrap();
        let plain = back.captured_image().unwrap().decode().unwrap();
        assert_eq!(plain, original);
    }

    #[tokio::test]
    async fn test_capture_before_first_frame_stays_live() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();

        let mut video = StaticFrameSource::not_ready();
        let err = session.capture(&video).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::FrameNotReady));
        assert_eq!(session.state(), SessionState::Live);
        assert!(session.captured_image().is_none());
        assert!(session.last_error().is_none());

        video.deliver(Frame::rgba(4, 3, vec![0x80; 4 * 3 * BYTES_PER_PIXEL]));
        assert_eq!(session.capture(&video).unwrap(), SessionState::Captured);
        assert_eq!(session.captured_image().unwrap().width(), 4);
    }

    #[tokio::test]
    async fn test_capture_png_keeps_native_size() {
        let session = Session::new(MockDevices::new(), png_config()).unwrap();
        session.open(FacingMode::Front).await.unwrap();
        session.capture(&StaticFrameSource::noise(640, 480, 1)).unwrap();

        let image = session.captured_image().unwrap();
        assert_eq!(image.decode().unwrap().dimensions(), (640, 480));
    }

    #[tokio::test]
    async fn test_switch_releases_then_acquires_once() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();
        session.devices().ledger().clear_events();

        assert_eq!(session.switch(FacingMode::Back).await.unwrap(), SessionState::Live);
        let events = session.devices().ledger().events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DeviceEvent::Release { .. }));
        assert_eq!(events[1], DeviceEvent::Acquire { facing: FacingMode::Back });
        assert_eq!(session.facing(), FacingMode::Back);
        assert!(!session.snapshot().mirror_preview);
    }

    #[tokio::test]
    async fn test_failed_switch_fails_forward() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();
        session.devices().ledger().clear_events();
        session
            .devices()
            .fail_next(DeviceError::DeviceUnavailable("no back camera".into()));

        let err = session.switch(FacingMode::Back).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DeviceUnavailable));
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.devices().ledger().open_streams(), 0);

        let events = session.devices().ledger().events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DeviceEvent::Release { .. }));
        assert!(matches!(events[1], DeviceEvent::Acquire { .. }));
    }

    #[tokio::test]
    async fn test_switch_from_captured_rejected() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();
        session.capture(&StaticFrameSource::test_pattern(8, 8)).unwrap();

        assert!(matches!(
            session.switch(FacingMode::Back).await,
            Err(CommandError::Rejected { state: SessionState::Captured, .. })
        ));
        assert!(session.captured_image().is_some());
    }

    #[tokio::test]
    async fn test_retake_reuses_handle() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();
        session.capture(&StaticFrameSource::test_pattern(8, 8)).unwrap();

        assert_eq!(session.retake().unwrap(), SessionState::Live);
        assert!(session.captured_image().is_none());
        assert_eq!(session.devices().ledger().acquire_count(), 1);
        assert_eq!(session.devices().ledger().release_count(), 0);
    }

    #[tokio::test]
    async fn test_save_keeps_preview_by_default() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();
        session.capture(&StaticFrameSource::test_pattern(8, 8)).unwrap();

        let mut sink = MemorySink::new();
        let saved = session.save(&mut sink).unwrap();
        assert!(saved.filename.starts_with("selfie-"));
        assert!(saved.filename.ends_with(".jpg"));
        assert_eq!(saved.state, SessionState::Captured);
        assert_eq!(sink.saved().len(), 1);
        assert_eq!(session.devices().ledger().open_streams(), 1);
    }

    #[tokio::test]
    async fn test_save_can_close_session() {
        let config = SessionConfig {
            close_after_save: true,
            filename_prefix: "photo".into(),
            ..png_config()
        };
        let session = Session::new(MockDevices::new(), config).unwrap();
        session.open(FacingMode::Back).await.unwrap();
        session.capture(&StaticFrameSource::test_pattern(8, 8)).unwrap();

        let mut sink = MemorySink::new();
        let saved = session.save(&mut sink).unwrap();
        assert!(saved.filename.starts_with("photo-"));
        assert!(saved.filename.ends_with(".png"));
        assert_eq!(saved.state, SessionState::Idle);
        assert_eq!(session.devices().ledger().open_streams(), 0);
    }

    #[tokio::test]
    async fn test_save_without_photo_rejected() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();
        let mut sink = MemorySink::new();
        assert!(matches!(
            session.save(&mut sink),
            Err(CommandError::Rejected { command: CommandKind::Save, .. })
        ));
    }

    struct FullDisk;

    impl ArtifactSink for FullDisk {
        fn persist(&mut self, _: &ImageArtifact, _: &str) -> Result<String, SinkError> {
            Err(SinkError::Rejected("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_photo() {
        let config = SessionConfig {
            close_after_save: true,
            ..Default::default()
        };
        let session = Session::new(MockDevices::new(), config).unwrap();
        session.open(FacingMode::Front).await.unwrap();
        session.capture(&StaticFrameSource::test_pattern(8, 8)).unwrap();

        assert!(matches!(
            session.save(&mut FullDisk),
            Err(CommandError::Sink(SinkError::Rejected(_)))
        ));
        assert_eq!(session.state(), SessionState::Captured);
        assert!(session.captured_image().is_some());
        assert_eq!(session.devices().ledger().open_streams(), 1);
    }

    /// Closes the session from inside the save, like a download handler would.
    struct ClosingSink<'a> {
        session: &'a Session<MockDevices>,
    }

    impl ArtifactSink for ClosingSink<'_> {
        fn persist(&mut self, _: &ImageArtifact, filename: &str) -> Result<String, SinkError> {
            self.session
                .close()
                .map_err(|e| SinkError::Rejected(e.to_string()))?;
            Ok(filename.to_string())
        }
    }

    #[tokio::test]
    async fn test_sink_may_close_session() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();
        session.capture(&StaticFrameSource::test_pattern(8, 8)).unwrap();

        let saved = session.save(&mut ClosingSink { session: &session }).unwrap();
        assert_eq!(saved.state, SessionState::Idle);
        assert_eq!(session.devices().ledger().open_streams(), 0);
    }

    struct ClosingSource<'a> {
        session: &'a Session<MockDevices>,
        video: StaticFrameSource,
    }

    impl FrameSource for ClosingSource<'_> {
        fn dimensions(&self) -> (u32, u32) {
            self.video.dimensions()
        }

        fn current_frame(&self) -> Option<Frame> {
            let _ = self.session.close();
            self.video.current_frame()
        }
    }

    #[tokio::test]
    async fn test_frame_source_may_close_session() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();

        let source = ClosingSource {
            session: &session,
            video: StaticFrameSource::test_pattern(8, 8),
        };
        assert!(matches!(
            session.capture(&source),
            Err(CommandError::Rejected { state: SessionState::Idle, .. })
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.captured_image().is_none());
        assert_eq!(session.devices().ledger().open_streams(), 0);
    }

    #[tokio::test]
    async fn test_rejected_commands_keep_last_error() {
        let session = session();
        session
            .devices()
            .fail_next(DeviceError::PermissionDenied("dismissed".into()));
        session.open(FacingMode::Front).await.unwrap_err();
        let recorded = session.last_error().unwrap();

        let mut sink = MemorySink::new();
        let source = StaticFrameSource::test_pattern(8, 8);
        assert!(session.capture(&source).is_err());
        assert!(session.retake().is_err());
        assert!(session.save(&mut sink).is_err());
        assert!(session.switch(FacingMode::Back).await.is_err());
        assert!(session.open(FacingMode::Back).await.is_err());
        assert!(session.retry().await.is_err());

        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.last_error(), Some(recorded.clone()));
        assert_eq!(session.snapshot().last_error, Some(recorded));
        assert_eq!(session.facing(), FacingMode::Front);
        assert_eq!(session.devices().ledger().acquire_count(), 1);
    }

    #[tokio::test]
    async fn test_close_from_captured_releases() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();
        session.capture(&StaticFrameSource::test_pattern(8, 8)).unwrap();

        assert_eq!(session.close().unwrap(), SessionState::Idle);
        assert!(session.captured_image().is_none());
        assert_eq!(session.devices().ledger().release_count(), 1);
        assert_eq!(session.close().unwrap(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_drop_releases_device() {
        for capture_first in [false, true] {
            let devices = MockDevices::new();
            let ledger: DeviceLedger = devices.ledger().clone();
            let session = Session::new(devices, SessionConfig::default()).unwrap();
            session.open(FacingMode::Front).await.unwrap();
            if capture_first {
                session.capture(&StaticFrameSource::test_pattern(8, 8)).unwrap();
            }

            drop(session);
            assert_eq!(ledger.release_count(), 1);
            assert_eq!(ledger.open_streams(), 0);
        }
    }

    #[tokio::test]
    async fn test_commands_rejected_while_requesting() {
        let gate = Rc::new(Notify::new());
        let devices = MockDevices::new().with_gate(Rc::clone(&gate));
        let session = Session::new(devices, SessionConfig::default()).unwrap();
        let source = StaticFrameSource::test_pattern(8, 8);

        let (opened, _) = tokio::join!(session.open(FacingMode::Front), async {
            tokio::task::yield_now().await;
            assert_eq!(session.state(), SessionState::Requesting);

            let mut sink = MemorySink::new();
            let results = [
                session.open(FacingMode::Back).await,
                session.capture(&source),
                session.switch(FacingMode::Back).await,
                session.retake(),
                session.save(&mut sink).map(|s| s.state),
                session.close(),
                session.retry().await,
            ];
            for result in results {
                assert_eq!(result.unwrap_err().kind(), Some(ErrorKind::Busy));
            }
            assert_eq!(session.state(), SessionState::Requesting);
            assert_eq!(session.facing(), FacingMode::Front);
            assert!(sink.saved().is_empty());

            gate.notify_one();
        });

        assert_eq!(opened.unwrap(), SessionState::Live);
        assert_eq!(session.devices().ledger().acquire_count(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_request_returns_to_idle() {
        let gate = Rc::new(Notify::new());
        let devices = MockDevices::new().with_gate(Rc::clone(&gate));
        let session = Session::new(devices, SessionConfig::default()).unwrap();

        tokio::select! {
            biased;
            _ = session.open(FacingMode::Front) => panic!("request should still be pending"),
            _ = tokio::task::yield_now() => {}
        }

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.devices().ledger().open_streams(), 0);
    }

    #[tokio::test]
    async fn test_playback_failure_releases_and_allows_retry() {
        let session = session();
        session.open(FacingMode::Front).await.unwrap();
        assert!(session.stream_ready());
        assert!(session.snapshot().stream_ready);

        assert_eq!(session.playback_failed("decoder stalled"), SessionState::Error);
        assert_eq!(session.devices().ledger().open_streams(), 0);
        let err = session.last_error().unwrap();
        assert_eq!(err.kind(), ErrorKind::PlaybackFailure);
        assert_eq!(err.detail(), "decoder stalled");
        assert!(!session.snapshot().stream_ready);

        assert_eq!(session.retry().await.unwrap(), SessionState::Live);
    }

    #[tokio::test]
    async fn test_events_ignored_when_idle() {
        let session = session();
        assert!(!session.stream_ready());
        assert_eq!(session.playback_failed("late"), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let session = session();
        let mut updates = session.subscribe();

        session.open(FacingMode::Front).await.unwrap();
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().state, SessionState::Live);

        session.close().unwrap();
        assert_eq!(updates.borrow_and_update().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_fullscreen_hint() {
        let config = SessionConfig {
            fullscreen_on_open: true,
            ..Default::default()
        };
        let session = Session::new(MockDevices::new(), config).unwrap();
        assert!(!session.snapshot().fullscreen_requested);
        session.open(FacingMode::Front).await.unwrap();
        assert!(session.snapshot().fullscreen_requested);
    }

    #[tokio::test]
    async fn test_metrics_track_handles() {
        let metrics = SessionMetrics::new().unwrap();
        let session =
            Session::with_metrics(MockDevices::new(), SessionConfig::default(), metrics.clone())
                .unwrap();

        session.open(FacingMode::Front).await.unwrap();
        session.switch(FacingMode::Back).await.unwrap();
        assert_eq!(metrics.open_handles(), 1);

        session.close().unwrap();
        assert_eq!(metrics.open_handles(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig {
            encoding: Encoding::jpeg(2.0),
            ..Default::default()
        };
        assert!(Session::new(MockDevices::new(), config).is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Open(FacingMode),
            OpenFails(bool),
            Capture(bool),
            Switch(FacingMode),
            SwitchFails,
            Retake,
            Save,
            Close,
            Retry,
            StreamReady,
            PlaybackFailed,
        }

        fn facing() -> impl Strategy<Value = FacingMode> {
            prop_oneof![Just(FacingMode::Front), Just(FacingMode::Back)]
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                facing().prop_map(Op::Open),
                any::<bool>().prop_map(Op::OpenFails),
                any::<bool>().prop_map(Op::Capture),
                facing().prop_map(Op::Switch),
                Just(Op::SwitchFails),
                Just(Op::Retake),
                Just(Op::Save),
                Just(Op::Close),
                Just(Op::Retry),
                Just(Op::StreamReady),
                Just(Op::PlaybackFailed),
            ]
        }

        fn check(session: &Session<MockDevices>, ledger: &DeviceLedger) {
            let snapshot = session.snapshot();
            let holds = snapshot.state.holds_device();
            assert!(ledger.open_streams() <= 1);
            assert_eq!(ledger.open_streams(), holds as usize, "{snapshot:?}");
            assert_eq!(snapshot.stream.is_some(), holds);
            assert_eq!(snapshot.has_image, snapshot.state == SessionState::Captured);
            assert_eq!(
                snapshot.last_error.is_some(),
                snapshot.state == SessionState::Error
            );
        }

        async fn run(ops: Vec<Op>, close_after_save: bool) {
            let devices = MockDevices::new().with_modes(vec![(8, 6)]);
            let ledger = devices.ledger().clone();
            let config = SessionConfig {
                close_after_save,
                ..Default::default()
            };
            let session = Session::new(devices, config).unwrap();
            let ready = StaticFrameSource::test_pattern(8, 6);
            let not_ready = StaticFrameSource::not_ready();
            let mut sink = MemorySink::new();

            for op in ops {
                let _ = match op {
                    Op::Open(f) => session.open(f).await,
                    Op::OpenFails(denied) => {
                        if session.state() == SessionState::Idle {
                            session.devices().fail_next(if denied {
                                DeviceError::PermissionDenied("no".into())
                            } else {
                                DeviceError::DeviceUnavailable("busy".into())
                            });
                        }
                        session.open(FacingMode::Front).await
                    }
                    Op::Capture(true) => session.capture(&ready),
                    Op::Capture(false) => session.capture(&not_ready),
                    Op::Switch(f) => session.switch(f).await,
                    Op::SwitchFails => {
                        if session.state() == SessionState::Live {
                            session
                                .devices()
                                .fail_next(DeviceError::DeviceUnavailable("gone".into()));
                        }
                        session.switch(FacingMode::Back).await
                    }
                    Op::Retake => session.retake(),
                    Op::Save => session.save(&mut sink).map(|s| s.state),
                    Op::Close => session.close(),
                    Op::Retry => session.retry().await,
                    Op::StreamReady => {
                        session.stream_ready();
                        Ok(session.state())
                    }
                    Op::PlaybackFailed => Ok(session.playback_failed("stalled")),
                };
                check(&session, &ledger);
            }

            drop(session);
            assert_eq!(ledger.open_streams(), 0);
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_device_handle_invariant(
                ops in proptest::collection::vec(op(), 1..30),
                close_after_save in any::<bool>(),
            ) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .unwrap();
                runtime.block_on(run(ops, close_after_save));
            }
        }
    }
}
