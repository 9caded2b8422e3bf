//! Session configuration.
//!
//! Everything the presentation layer may want to tune about a capture
//! session lives here, loadable from a TOML file.

use crate::capture::Encoding;
use crate::device::{FacingMode, ResolutionHint};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for one capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Camera used when the caller does not pick one.
    pub default_facing: FacingMode,
    /// Ideal stream resolution. The platform may substitute.
    pub resolution: ResolutionHint,
    /// Encoding of captured stills.
    pub encoding: Encoding,
    /// Return to Idle after a successful save.
    pub close_after_save: bool,
    /// Prefix of suggested filenames (`<prefix>-<epoch-millis>.<ext>`).
    pub filename_prefix: String,
    /// Ask the presentation layer to go fullscreen while streaming.
    pub fullscreen_on_open: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_facing: FacingMode::Front,
            resolution: ResolutionHint::default(),
            encoding: Encoding::default(),
            close_after_save: false,
            filename_prefix: "selfie".to_string(),
            fullscreen_on_open: false,
        }
    }
}

impl SessionConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(ConfigError::InvalidResolution);
        }
        if !self.encoding.is_valid() {
            return Err(ConfigError::InvalidQuality(self.encoding.quality));
        }
        let prefix_ok = !self.filename_prefix.is_empty()
            && self
                .filename_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !prefix_ok {
            return Err(ConfigError::InvalidFilenamePrefix(
                self.filename_prefix.clone(),
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid resolution hint")]
    InvalidResolution,
    #[error("invalid encoding quality {0} (must be in (0, 1])")]
    InvalidQuality(f32),
    #[error("invalid filename prefix {0:?}")]
    InvalidFilenamePrefix(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory saved photos are written to.
    pub directory: PathBuf,
    /// Print session metrics on exit.
    pub metrics: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            metrics: false,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.session.validate()?;
        Ok(config)
    }
}
