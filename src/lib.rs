//! Selfie Capture Library
//!
//! The core of a camera capture widget: acquiring and releasing the video
//! device, taking a mirroring-aware still, and the explicit state machine
//! that ties them together. Rendering is left to the caller.
//!
//! # Architecture
//!
//! ```text
//! presentation ──commands──▶ session ──▶ device   (acquire / switch / release)
//!      ▲                        │   └──▶ capture  (frame → encoded still)
//!      └──────snapshots─────────┘
//! ```
//!
//! # Design Principles
//!
//! - **Single owner**: the device handle lives inside the session's state
//!   and is released on every path out of Live/Captured, including drop
//! - **Mirror iff front-facing**: saved stills match what the preview showed
//! - **No hidden retries**: failures land in the Error state and wait for
//!   the user
//!
//! # Example
//!
//! ```no_run
//! use selfie_capture::{
//!     capture::StaticFrameSource,
//!     device::{FacingMode, MockDevices},
//!     sink::MemorySink,
//!     Session, SessionConfig,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new(MockDevices::new(), SessionConfig::default())?;
//! session.open(FacingMode::Front).await?;
//!
//! let settings = session.stream_settings().unwrap();
//! let video = StaticFrameSource::test_pattern(settings.width, settings.height);
//! session.stream_ready();
//! session.capture(&video)?;
//!
//! let mut sink = MemorySink::new();
//! let saved = session.save(&mut sink)?;
//! println!("saved {}", saved.filename);
//!
//! session.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod config;
pub mod device;
pub mod metrics;
pub mod session;
pub mod sink;

// Re-export commonly used types at crate root
pub use capture::{Encoding, FrameSource, ImageArtifact, ImageFormat};
pub use config::{FileConfig, SessionConfig};
pub use device::{FacingMode, MediaDevices, MockDevices};
pub use metrics::SessionMetrics;
pub use session::{CommandError, ErrorKind, Session, SessionError, SessionSnapshot, SessionState};
pub use sink::{ArtifactSink, FileSink};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
