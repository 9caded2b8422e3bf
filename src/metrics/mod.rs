//! Prometheus metrics for capture sessions.
//!
//! # Metrics Exposed
//!
//! ## Device Metrics
//! - `selfie_capture_device_acquisitions_total` - Streams acquired
//! - `selfie_capture_device_releases_total` - Streams released
//! - `selfie_capture_device_open_handles` - Streams currently held (0 or 1 per session)
//!
//! ## Capture Metrics
//! - `selfie_capture_captures_total` - Stills captured
//! - `selfie_capture_saves_total` - Stills persisted
//!
//! ## Failures
//! - `selfie_capture_errors_total{kind}` - Session failures by error kind
//!
//! # Example
//!
//! ```no_run
//! use selfie_capture::metrics::SessionMetrics;
//!
//! let metrics = SessionMetrics::new().expect("Failed to create registry");
//! metrics.record_acquired();
//! println!("{}", metrics.encode().unwrap());
//! ```

mod collector;

pub use collector::{MetricsError, SessionMetrics};
