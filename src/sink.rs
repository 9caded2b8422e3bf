//! Destinations for saved photos.
//!
//! The session only produces an artifact and a suggested filename. Where
//! the bytes end up is decided by an [`ArtifactSink`].

use crate::capture::{ImageArtifact, ImageFormat};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting an artifact.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sink rejected artifact: {0}")]
    Rejected(String),
}

/// Suggested download name: `<prefix>-<epoch-millis>.<ext>`.
pub fn suggested_filename(prefix: &str, format: ImageFormat, epoch_millis: i64) -> String {
    format!("{prefix}-{epoch_millis}.{}", format.extension())
}

/// Receives saved photos.
pub trait ArtifactSink {
    /// Persists `artifact` under `filename`. Returns where it went.
    fn persist(&mut self, artifact: &ImageArtifact, filename: &str) -> Result<String, SinkError>;
}

/// Writes artifacts into a directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    directory: PathBuf,
}

impl FileSink {
    /// Creates a sink rooted at `directory`. The directory is created on
    /// first write if missing.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Target directory.
    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }
}

impl ArtifactSink for FileSink {
    fn persist(&mut self, artifact: &ImageArtifact, filename: &str) -> Result<String, SinkError> {
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(SinkError::Rejected(format!(
                "{filename:?} is not a plain file name"
            )));
        }

        std::fs::create_dir_all(&self.directory).map_err(|source| SinkError::Write {
            path: self.directory.clone(),
            source,
        })?;

        let path = self.directory.join(filename);
        std::fs::write(&path, artifact.bytes()).map_err(|source| SinkError::Write {
            path: path.clone(),
            source,
        })?;

        tracing::info!(
            path = %path.display(),
            bytes = artifact.bytes().len(),
            digest = %artifact.digest(),
            "Photo saved"
        );
        Ok(path.display().to_string())
    }
}

/// Keeps artifacts in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Vec<(String, ImageArtifact)>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything saved so far, oldest first.
    pub fn saved(&self) -> &[(String, ImageArtifact)] {
        &self.saved
    }
}

impl ArtifactSink for MemorySink {
    fn persist(&mut self, artifact: &ImageArtifact, filename: &str) -> Result<String, SinkError> {
        self.saved.push((filename.to_string(), artifact.clone()));
        Ok(format!("memory:{filename}"))
    }
}
