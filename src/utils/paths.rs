//! Fixed artifact layout shared by the pipeline stages

use crate::config::PathsConfig;
use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};

pub const RAW_FILE: &str = "raw.csv";
pub const TRAIN_FILE: &str = "train.csv";
pub const TEST_FILE: &str = "test.csv";
pub const PROCESSED_TRAIN_FILE: &str = "processed_train.csv";
pub const PROCESSED_TEST_FILE: &str = "processed_test.csv";

/// Resolves every well-known artifact path from one root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
    model_file_name: String,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            model_file_name: PathsConfig::default().model_file_name,
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self {
            root: paths.artifacts_dir.clone(),
            model_file_name: paths.model_file_name.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn raw_file(&self) -> PathBuf {
        self.raw_dir().join(RAW_FILE)
    }

    pub fn train_file(&self) -> PathBuf {
        self.raw_dir().join(TRAIN_FILE)
    }

    pub fn test_file(&self) -> PathBuf {
        self.raw_dir().join(TEST_FILE)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn processed_train_file(&self) -> PathBuf {
        self.processed_dir().join(PROCESSED_TRAIN_FILE)
    }

    pub fn processed_test_file(&self) -> PathBuf {
        self.processed_dir().join(PROCESSED_TEST_FILE)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn model_file(&self) -> PathBuf {
        self.model_dir().join(&self.model_file_name)
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::from_config(&PathsConfig::default())
    }
}

/// `mkdir -p`, reporting the directory on failure
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))
}
