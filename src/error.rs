//! Error types for the reservation pipeline

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Closed set of failures a pipeline stage can report
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A configuration key is missing, malformed or out of range
    #[error("Configuration error at `{key}`: {reason}")]
    Config { key: String, reason: String },

    /// Reading or writing a file (or fetching a remote object) failed
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Data did not have the shape or content a stage expects
    #[error("Data validation error in {context}: {reason}")]
    DataValidation { context: String, reason: String },

    /// Model fitting, search or evaluation failed
    #[error("Training error: {reason}")]
    Training { reason: String },
}

impl PipelineError {
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn data(context: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::DataValidation {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn training(reason: impl Into<String>) -> Self {
        PipelineError::Training {
            reason: reason.into(),
        }
    }

    /// Short tag used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config { .. } => "config",
            PipelineError::Io { .. } => "io",
            PipelineError::DataValidation { .. } => "data_validation",
            PipelineError::Training { .. } => "training",
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::data("frame", err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::data("json", err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::data("matrix shape", err.to_string())
    }
}
