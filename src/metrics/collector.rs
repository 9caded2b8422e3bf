//! Metrics collection and registry.

use crate::session::ErrorKind;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus registry for capture-session activity.
///
/// Cloning is cheap and every clone updates the same series.
#[derive(Clone)]
pub struct SessionMetrics {
    registry: Registry,

    // Device metrics
    acquisitions_total: IntCounter,
    releases_total: IntCounter,
    open_handles: IntGauge,

    // Capture metrics
    captures_total: IntCounter,
    saves_total: IntCounter,

    // Failures by kind
    errors_total: IntCounterVec,
}

impl SessionMetrics {
    /// Creates a new registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let acquisitions_total = IntCounter::new(
            "selfie_capture_device_acquisitions_total",
            "Camera streams successfully acquired",
        )?;
        let releases_total = IntCounter::new(
            "selfie_capture_device_releases_total",
            "Camera streams released",
        )?;
        let open_handles = IntGauge::new(
            "selfie_capture_device_open_handles",
            "Camera streams currently held",
        )?;
        let captures_total = IntCounter::new(
            "selfie_capture_captures_total",
            "Stills captured",
        )?;
        let saves_total = IntCounter::new(
            "selfie_capture_saves_total",
            "Stills handed to the artifact sink",
        )?;
        let errors_total = IntCounterVec::new(
            Opts::new("selfie_capture_errors_total", "Session failures by kind"),
            &["kind"],
        )?;

        registry.register(Box::new(acquisitions_total.clone()))?;
        registry.register(Box::new(releases_total.clone()))?;
        registry.register(Box::new(open_handles.clone()))?;
        registry.register(Box::new(captures_total.clone()))?;
        registry.register(Box::new(saves_total.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self {
            registry,
            acquisitions_total,
            releases_total,
            open_handles,
            captures_total,
            saves_total,
            errors_total,
        })
    }

    /// A stream was acquired.
    pub fn record_acquired(&self) {
        self.acquisitions_total.inc();
        self.open_handles.inc();
    }

    /// A stream was released.
    pub fn record_released(&self) {
        self.releases_total.inc();
        self.open_handles.dec();
    }

    /// A still was captured.
    pub fn record_capture(&self) {
        self.captures_total.inc();
    }

    /// A still was persisted.
    pub fn record_save(&self) {
        self.saves_total.inc();
    }

    /// A session failure occurred.
    pub fn record_error(&self, kind: ErrorKind) {
        self.errors_total.with_label_values(&[kind.as_str()]).inc();
    }

    /// Number of handles currently held.
    pub fn open_handles(&self) -> i64 {
        self.open_handles.get()
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
